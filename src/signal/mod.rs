//! Cancellation and priority signals.
//!
//! [`abort`] is the base cancellation layer: a controller that flips its
//! signal to aborted exactly once and notifies single-shot listeners.
//! [`task_signal`] composes a priority on top of it (rather than mutating
//! the base signal): a [`TaskController`](task_signal::TaskController) owns
//! both halves, and its [`TaskSignal`](task_signal::TaskSignal) adds the
//! mutable priority and the `prioritychange` event the scheduler subscribes
//! to for queue migration.

pub mod abort;
pub mod task_signal;

pub use abort::{AbortController, AbortListenerId, AbortSignal};
pub use task_signal::{
    PriorityChange, PriorityListenerId, SignalIdentity, TaskController, TaskControllerOptions,
    TaskSignal, WeakTaskSignal,
};
