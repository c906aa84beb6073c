//! Host event-loop interface.
//!
//! The scheduler runs inside an event-driven single-threaded host and never
//! spins: every wakeup is a one-shot request against one of three host yield
//! primitives, consumed through the narrow [`HostEventLoop`] trait:
//!
//! 1. A message-port round-trip (a fresh macrotask, the fast path)
//! 2. A millisecond timer
//! 3. An optional idle-time callback
//!
//! [`callback`] multiplexes the three primitives behind a uniform one-shot
//! cancellable [`HostCallback`](callback::HostCallback). [`simulated`]
//! provides a deterministic in-process host backed by a virtual clock.

pub mod callback;
pub mod simulated;
pub mod timer;

pub use callback::{HostCallback, PortDispatcher};
pub use simulated::{SimulatedHost, VirtualClock};
pub use timer::TimerHeap;

use crate::types::Time;
use std::time::Duration;

/// A thunk handed to the host for later execution.
pub type HostThunk = Box<dyn FnOnce() + Send>;

/// Handler invoked for every message received on a port.
pub type MessageHandler = Box<dyn Fn(u64) + Send + Sync>;

/// Handle to a pending timeout, for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeoutHandle(pub u64);

/// Handle to a pending idle callback, for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdleHandle(pub u64);

/// The sending end of a paired-port channel.
///
/// Every value posted here is delivered to the port's receive handler in a
/// macrotask of its own.
pub trait MessagePort: Send + Sync {
    /// Posts a value to the receiving end.
    fn post(&self, message: u64);
}

/// The narrow interface the scheduler consumes from its host.
///
/// Implementations must be single-threaded in effect: thunks and message
/// handlers run on the host's one execution thread, one at a time, never
/// reentrantly inside another thunk.
pub trait HostEventLoop: Send + Sync {
    /// Constructs a paired-port channel whose receive handler is
    /// `on_message`.
    ///
    /// Returns `None` when the host has no message-port primitive; callers
    /// fall back to a zero-delay timer.
    fn open_port(&self, on_message: MessageHandler) -> Option<Box<dyn MessagePort>>;

    /// Schedules `thunk` to run after `delay`.
    fn set_timeout(&self, delay: Duration, thunk: HostThunk) -> TimeoutHandle;

    /// Cancels a pending timeout. Unknown or already-fired handles are
    /// ignored.
    fn clear_timeout(&self, handle: TimeoutHandle);

    /// Returns true if the host supports idle-time callbacks.
    fn idle_supported(&self) -> bool {
        false
    }

    /// Schedules `thunk` to run when the host is idle.
    ///
    /// Returns `None` when the host has no idle-time primitive.
    fn request_idle(&self, thunk: HostThunk) -> Option<IdleHandle>;

    /// Cancels a pending idle callback. Unknown or already-fired handles
    /// are ignored.
    fn cancel_idle(&self, handle: IdleHandle);

    /// Returns the current point on the host timeline.
    fn now(&self) -> Time;
}
