//! Deterministic in-process host.
//!
//! [`SimulatedHost`] implements [`HostEventLoop`] over a virtual clock: port
//! deliveries and due timers feed a macrotask queue, idle callbacks run only
//! when that queue is drained and no timer is due, and time moves only when
//! the caller advances it. Tests and examples drive the host explicitly, so
//! every interleaving is reproducible.

use crate::host::{
    HostEventLoop, HostThunk, IdleHandle, MessageHandler, MessagePort, TimeoutHandle, TimerHeap,
};
use crate::types::Time;
use core::fmt;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// A monotone clock whose time moves only when told to.
#[derive(Debug)]
pub struct VirtualClock {
    now: Mutex<Time>,
}

impl VirtualClock {
    /// Creates a clock starting at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(Time::ZERO)
    }

    /// Creates a clock starting at `start`.
    #[must_use]
    pub fn starting_at(start: Time) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Returns the current time.
    #[must_use]
    pub fn now(&self) -> Time {
        *self.now.lock()
    }

    /// Moves the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock();
        *now = now.after(duration);
    }

    /// Moves the clock forward to `target`; never moves it backwards.
    pub fn advance_to(&self, target: Time) {
        let mut now = self.now.lock();
        if target > *now {
            *now = target;
        }
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

enum Macrotask {
    /// A value delivered through a port, resolved to its handler.
    PortDelivery {
        handler: Arc<MessageHandler>,
        message: u64,
    },
    /// A timer that came due.
    TimerFire { thunk: HostThunk },
}

#[derive(Default)]
struct HostState {
    macrotasks: VecDeque<Macrotask>,
    timers: TimerHeap,
    timer_thunks: HashMap<u64, HostThunk>,
    next_timeout: u64,
    idle: VecDeque<(IdleHandle, HostThunk)>,
    next_idle: u64,
}

impl HostState {
    /// Moves every timer due at `now` into the macrotask queue.
    fn promote_due_timers(&mut self, now: Time) {
        for handle in self.timers.pop_expired(now) {
            // A missing thunk means the timeout was cleared; the heap entry
            // is stale and skipped.
            if let Some(thunk) = self.timer_thunks.remove(&handle.0) {
                self.macrotasks.push_back(Macrotask::TimerFire { thunk });
            }
        }
    }
}

/// Deterministic single-threaded host event loop.
///
/// Feature toggles ([`without_ports`](Self::without_ports),
/// [`without_idle`](Self::without_idle)) exist so the host-callback fallback
/// chain can be exercised.
pub struct SimulatedHost {
    clock: Arc<VirtualClock>,
    state: Arc<Mutex<HostState>>,
    ports_supported: bool,
    idle_supported: bool,
}

impl fmt::Debug for SimulatedHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimulatedHost")
            .field("now", &self.clock.now())
            .field("macrotasks", &state.macrotasks.len())
            .field("timers", &state.timers.len())
            .field("idle", &state.idle.len())
            .finish()
    }
}

impl SimulatedHost {
    /// Creates a host with all three yield primitives.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(VirtualClock::new()))
    }

    /// Creates a host sharing an existing clock.
    #[must_use]
    pub fn with_clock(clock: Arc<VirtualClock>) -> Self {
        Self {
            clock,
            state: Arc::new(Mutex::new(HostState::default())),
            ports_supported: true,
            idle_supported: true,
        }
    }

    /// Creates a host without the idle-time primitive.
    #[must_use]
    pub fn without_idle() -> Self {
        Self {
            idle_supported: false,
            ..Self::new()
        }
    }

    /// Creates a host without the message-port primitive.
    #[must_use]
    pub fn without_ports() -> Self {
        Self {
            ports_supported: false,
            ..Self::new()
        }
    }

    /// Returns the host's clock.
    #[must_use]
    pub fn clock(&self) -> Arc<VirtualClock> {
        Arc::clone(&self.clock)
    }

    /// Runs one unit of host work at the current virtual time.
    ///
    /// Preference order: due macrotasks (ports, fired timers), then one idle
    /// callback when nothing else is runnable. Returns false when there was
    /// nothing to run.
    pub fn step(&self) -> bool {
        let work = {
            let mut state = self.state.lock();
            state.promote_due_timers(self.clock.now());
            if let Some(task) = state.macrotasks.pop_front() {
                Some(task)
            } else if state.timers.peek_deadline().is_none_or(|d| d > self.clock.now()) {
                state
                    .idle
                    .pop_front()
                    .map(|(_, thunk)| Macrotask::TimerFire { thunk })
            } else {
                None
            }
        };

        match work {
            Some(Macrotask::PortDelivery { handler, message }) => {
                handler(message);
                true
            }
            Some(Macrotask::TimerFire { thunk }) => {
                thunk();
                true
            }
            None => false,
        }
    }

    /// Runs everything runnable at the current virtual time.
    pub fn run_ready(&self) {
        while self.step() {}
    }

    /// Runs to quiescence, jumping the clock forward through timer deadlines.
    ///
    /// Returns once no macrotask, timer, or idle work remains anywhere on
    /// the timeline.
    pub fn run_until_quiescent(&self) {
        loop {
            self.run_ready();
            let next_deadline = {
                let state = self.state.lock();
                state.timers.peek_deadline()
            };
            match next_deadline {
                Some(deadline) => self.clock.advance_to(deadline),
                None => break,
            }
        }
    }

    /// Advances the clock by `duration` and runs everything that became due.
    pub fn advance(&self, duration: Duration) {
        self.clock.advance(duration);
        self.run_ready();
    }
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

struct SimulatedPort {
    handler: Arc<MessageHandler>,
    state: std::sync::Weak<Mutex<HostState>>,
}

impl MessagePort for SimulatedPort {
    fn post(&self, message: u64) {
        // A port outliving its host delivers into the void, like a closed
        // channel.
        if let Some(state) = self.state.upgrade() {
            state.lock().macrotasks.push_back(Macrotask::PortDelivery {
                handler: Arc::clone(&self.handler),
                message,
            });
        }
    }
}

impl HostEventLoop for SimulatedHost {
    fn open_port(&self, on_message: MessageHandler) -> Option<Box<dyn MessagePort>> {
        if !self.ports_supported {
            return None;
        }
        Some(Box::new(SimulatedPort {
            handler: Arc::new(on_message),
            state: Arc::downgrade(&self.state),
        }))
    }

    fn set_timeout(&self, delay: Duration, thunk: HostThunk) -> TimeoutHandle {
        let mut state = self.state.lock();
        let handle = TimeoutHandle(state.next_timeout);
        state.next_timeout += 1;
        let deadline = self.clock.now().after(delay);
        state.timer_thunks.insert(handle.0, thunk);
        state.timers.insert(handle, deadline);
        handle
    }

    fn clear_timeout(&self, handle: TimeoutHandle) {
        self.state.lock().timer_thunks.remove(&handle.0);
    }

    fn idle_supported(&self) -> bool {
        self.idle_supported
    }

    fn request_idle(&self, thunk: HostThunk) -> Option<IdleHandle> {
        if !self.idle_supported {
            return None;
        }
        let mut state = self.state.lock();
        let handle = IdleHandle(state.next_idle);
        state.next_idle += 1;
        state.idle.push_back((handle, thunk));
        Some(handle)
    }

    fn cancel_idle(&self, handle: IdleHandle) {
        self.state.lock().idle.retain(|(h, _)| *h != handle);
    }

    fn now(&self) -> Time {
        self.clock.now()
    }
}
