//! tasklane - a cooperative, priority-aware task scheduler.
//!
//! tasklane runs deferred callbacks in an event-driven single-threaded host.
//! Work is submitted with one of three priorities (`user-blocking` >
//! `user-visible` > `background`), optionally tagged with a cancellation
//! signal whose priority can change while tasks are queued, and dispatched
//! using exactly one outstanding host wakeup at a time.
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//! use tasklane::{Priority, Scheduler, SimulatedHost, SubmitOptions};
//!
//! let host = Arc::new(SimulatedHost::new());
//! let scheduler = Scheduler::new(host.clone());
//!
//! let background = scheduler.post_task(
//!     || "later",
//!     SubmitOptions::new().with_priority(Priority::Background),
//! );
//! let urgent = scheduler.post_task(
//!     || "first",
//!     SubmitOptions::new().with_priority(Priority::UserBlocking),
//! );
//!
//! host.run_until_quiescent();
//! assert_eq!(urgent.try_result(), Some(Ok("first")));
//! assert_eq!(background.try_result(), Some(Ok("later")));
//! ```
//!
//! # Pieces
//!
//! - [`Scheduler`]: per-priority queue pairs (continuations before fresh
//!   tasks), live priority migration, cooperative cancellation
//! - [`TaskController`] / [`TaskSignal`]: cancellation composed with a
//!   mutable priority and a `prioritychange` event
//! - [`ScheduledPromise`]: settlement routed through the scheduler at the
//!   owning controller's current priority
//! - [`HostEventLoop`]: the narrow host interface; [`SimulatedHost`] is the
//!   deterministic in-process implementation

#![warn(missing_docs, missing_debug_implementations)]

pub mod channel;
pub mod config;
pub mod error;
pub mod global;
pub mod host;
pub mod promise;
pub mod sched;
pub mod signal;
pub mod test_logging;
pub mod test_utils;
pub mod tracing_compat;
pub mod types;
pub mod util;

pub use config::SchedulerConfig;
pub use error::{Error, ErrorCategory, ErrorKind, Result};
pub use host::{HostEventLoop, SimulatedHost, VirtualClock};
pub use promise::{
    default_options, set_default_options, PromiseOptions, PromiseOutcome, PromiseResolvers,
    ScheduledPromise,
};
pub use sched::{
    PanicPayload, ScheduleSignal, Scheduler, SubmitOptions, TaskError, TaskHandle,
};
pub use signal::{
    AbortController, AbortSignal, PriorityChange, TaskController, TaskControllerOptions,
    TaskSignal,
};
pub use types::{CancelKind, CancelReason, Priority, TaskKind, Time};
