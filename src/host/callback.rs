//! One-shot cancellable host callbacks.
//!
//! [`HostCallback`] arranges for a single thunk to run "as soon as possible"
//! via exactly one of the three host yield primitives, chosen from the
//! requested priority and delay:
//!
//! 1. `delay > 0`: the millisecond timer, regardless of priority
//! 2. background priority with idle support: the idle-time callback
//! 3. the message-port round-trip, when the host has one
//! 4. otherwise: a zero-delay timer
//!
//! The thunk is invoked at most once; `cancel` before delivery suppresses it
//! and is idempotent.

use crate::host::{HostEventLoop, HostThunk, IdleHandle, MessagePort, TimeoutHandle};
use crate::types::Priority;
use core::fmt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct PortSlots {
    pending: HashMap<u64, HostThunk>,
    next_message: u64,
}

/// Long-lived multiplexer over the host's message-port primitive.
///
/// A single paired-port channel carries every port-backed wakeup; each posted
/// message is a numeric handle that the receive side resolves to its thunk.
/// Multiple callbacks can therefore be in flight and cancelled individually:
/// cancellation just drops the thunk, and the eventual delivery finds nothing
/// to run.
pub struct PortDispatcher {
    slots: Arc<Mutex<PortSlots>>,
    port: Box<dyn MessagePort>,
}

impl fmt::Debug for PortDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        f.debug_struct("PortDispatcher")
            .field("pending", &slots.pending.len())
            .field("next_message", &slots.next_message)
            .finish()
    }
}

impl PortDispatcher {
    /// Opens the dispatcher's channel on `host`.
    ///
    /// Returns `None` when the host has no message-port primitive.
    #[must_use]
    pub fn open(host: &dyn HostEventLoop) -> Option<Self> {
        let slots: Arc<Mutex<PortSlots>> = Arc::new(Mutex::new(PortSlots::default()));
        let receive_side = Arc::clone(&slots);
        let port = host.open_port(Box::new(move |message| {
            let thunk = receive_side.lock().pending.remove(&message);
            if let Some(thunk) = thunk {
                thunk();
            }
        }))?;
        Some(Self { slots, port })
    }

    fn post(&self, thunk: HostThunk) -> u64 {
        let message = {
            let mut slots = self.slots.lock();
            let message = slots.next_message;
            slots.next_message += 1;
            slots.pending.insert(message, thunk);
            message
        };
        self.port.post(message);
        message
    }

    /// Number of in-flight port callbacks (test support).
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.slots.lock().pending.len()
    }
}

#[derive(Debug, Clone, Copy)]
enum CallbackSlot {
    Port { message: u64 },
    Timer { handle: TimeoutHandle },
    Idle { handle: IdleHandle },
}

/// A one-shot, cancellable request for the host to run a thunk soon.
pub struct HostCallback {
    host: Arc<dyn HostEventLoop>,
    port_slots: Option<Arc<Mutex<PortSlots>>>,
    slot: CallbackSlot,
    cancelled: bool,
}

impl fmt::Debug for HostCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCallback")
            .field("slot", &self.slot)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}

impl HostCallback {
    /// Schedules `thunk` on the primitive selected for `(priority, delay)`.
    ///
    /// `allow_idle` gates the idle-time primitive; hosts without idle
    /// support and configurations that opt out both fall through to the
    /// port primitive.
    #[must_use]
    pub fn schedule(
        host: &Arc<dyn HostEventLoop>,
        port: Option<&PortDispatcher>,
        priority: Priority,
        delay: Duration,
        allow_idle: bool,
        thunk: HostThunk,
    ) -> Self {
        if delay > Duration::ZERO {
            let handle = host.set_timeout(delay, thunk);
            return Self {
                host: Arc::clone(host),
                port_slots: None,
                slot: CallbackSlot::Timer { handle },
                cancelled: false,
            };
        }

        if priority == Priority::Background && allow_idle && host.idle_supported() {
            if let Some(handle) = host.request_idle(thunk) {
                return Self {
                    host: Arc::clone(host),
                    port_slots: None,
                    slot: CallbackSlot::Idle { handle },
                    cancelled: false,
                };
            }
            // Idle support vanished between the probe and the request; the
            // thunk was consumed only on success, so this path is
            // unreachable with a well-behaved host.
            unreachable!("host advertised idle support but refused the request");
        }

        if let Some(dispatcher) = port {
            let message = dispatcher.post(thunk);
            return Self {
                host: Arc::clone(host),
                port_slots: Some(Arc::clone(&dispatcher.slots)),
                slot: CallbackSlot::Port { message },
                cancelled: false,
            };
        }

        let handle = host.set_timeout(Duration::ZERO, thunk);
        Self {
            host: Arc::clone(host),
            port_slots: None,
            slot: CallbackSlot::Timer { handle },
            cancelled: false,
        }
    }

    /// Returns true if this callback was scheduled on the idle primitive.
    ///
    /// The scheduler uses this to recognize a too-lazy pending wakeup when a
    /// higher-priority submission arrives.
    #[must_use]
    pub fn is_idle_callback(&self) -> bool {
        matches!(self.slot, CallbackSlot::Idle { .. })
    }

    /// Cancels the callback. Idempotent; a no-op after delivery.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        match self.slot {
            CallbackSlot::Port { message } => {
                if let Some(slots) = &self.port_slots {
                    slots.lock().pending.remove(&message);
                }
            }
            CallbackSlot::Timer { handle } => self.host.clear_timeout(handle),
            CallbackSlot::Idle { handle } => self.host.cancel_idle(handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SimulatedHost;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_thunk(counter: &Arc<AtomicUsize>) -> HostThunk {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn zero_delay_uses_the_port() {
        let sim = Arc::new(SimulatedHost::new());
        let host: Arc<dyn HostEventLoop> = Arc::clone(&sim) as Arc<dyn HostEventLoop>;
        let dispatcher = PortDispatcher::open(host.as_ref()).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        let cb = HostCallback::schedule(
            &host,
            Some(&dispatcher),
            Priority::UserVisible,
            Duration::ZERO,
            true,
            counter_thunk(&fired),
        );
        assert!(!cb.is_idle_callback());
        assert_eq!(dispatcher.in_flight(), 1);

        sim.run_ready();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[test]
    fn positive_delay_uses_the_timer_regardless_of_priority() {
        let sim = Arc::new(SimulatedHost::new());
        let host: Arc<dyn HostEventLoop> = Arc::clone(&sim) as Arc<dyn HostEventLoop>;
        let dispatcher = PortDispatcher::open(host.as_ref()).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        let _cb = HostCallback::schedule(
            &host,
            Some(&dispatcher),
            Priority::UserBlocking,
            Duration::from_millis(5),
            true,
            counter_thunk(&fired),
        );
        assert_eq!(dispatcher.in_flight(), 0);

        sim.run_ready();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        sim.run_until_quiescent();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn background_uses_idle_when_available() {
        let sim = Arc::new(SimulatedHost::new());
        let host: Arc<dyn HostEventLoop> = Arc::clone(&sim) as Arc<dyn HostEventLoop>;
        let dispatcher = PortDispatcher::open(host.as_ref()).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        let cb = HostCallback::schedule(
            &host,
            Some(&dispatcher),
            Priority::Background,
            Duration::ZERO,
            true,
            counter_thunk(&fired),
        );
        assert!(cb.is_idle_callback());

        sim.run_until_quiescent();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn background_without_idle_support_falls_back_to_port() {
        let sim = Arc::new(SimulatedHost::without_idle());
        let host: Arc<dyn HostEventLoop> = Arc::clone(&sim) as Arc<dyn HostEventLoop>;
        let dispatcher = PortDispatcher::open(host.as_ref()).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        let cb = HostCallback::schedule(
            &host,
            Some(&dispatcher),
            Priority::Background,
            Duration::ZERO,
            true,
            counter_thunk(&fired),
        );
        assert!(!cb.is_idle_callback());
        assert_eq!(dispatcher.in_flight(), 1);
    }

    #[test]
    fn no_port_falls_back_to_zero_delay_timer() {
        let sim = Arc::new(SimulatedHost::without_ports());
        let host: Arc<dyn HostEventLoop> = Arc::clone(&sim) as Arc<dyn HostEventLoop>;
        assert!(PortDispatcher::open(host.as_ref()).is_none());
        let fired = Arc::new(AtomicUsize::new(0));

        let _cb = HostCallback::schedule(
            &host,
            None,
            Priority::UserVisible,
            Duration::ZERO,
            true,
            counter_thunk(&fired),
        );
        sim.run_until_quiescent();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_suppresses_delivery_and_is_idempotent() {
        let sim = Arc::new(SimulatedHost::new());
        let host: Arc<dyn HostEventLoop> = Arc::clone(&sim) as Arc<dyn HostEventLoop>;
        let dispatcher = PortDispatcher::open(host.as_ref()).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        let mut cb = HostCallback::schedule(
            &host,
            Some(&dispatcher),
            Priority::UserVisible,
            Duration::ZERO,
            true,
            counter_thunk(&fired),
        );
        cb.cancel();
        cb.cancel();

        sim.run_until_quiescent();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancel_suppresses_a_timer_callback() {
        let sim = Arc::new(SimulatedHost::new());
        let host: Arc<dyn HostEventLoop> = Arc::clone(&sim) as Arc<dyn HostEventLoop>;
        let fired = Arc::new(AtomicUsize::new(0));

        let mut cb = HostCallback::schedule(
            &host,
            None,
            Priority::UserVisible,
            Duration::from_millis(3),
            true,
            counter_thunk(&fired),
        );
        cb.cancel();

        sim.run_until_quiescent();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
