//! Handles for awaiting task results.
//!
//! `TaskHandle<T>` is returned by the submission entry points and settles
//! with the callback's return value, the thrown panic payload, or the
//! signal's abort reason.

use crate::channel::oneshot;
use crate::types::{CancelReason, TaskId};
use core::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A captured panic payload.
///
/// Panics inside task callbacks are isolated; the payload is rendered to a
/// string so it stays cloneable and printable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicPayload(Arc<str>);

impl PanicPayload {
    /// Renders a payload from `std::panic::catch_unwind`.
    #[must_use]
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let rendered = payload
            .downcast::<String>()
            .map(|s| *s)
            .or_else(|payload| payload.downcast::<&'static str>().map(|s| (*s).to_owned()))
            .unwrap_or_else(|_| "opaque panic payload".to_owned());
        Self(Arc::from(rendered))
    }

    /// Creates a payload from a message (test support).
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        Self(Arc::from(message.into()))
    }

    /// Returns the rendered payload.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a task's handle rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The task's signal aborted before the callback ran; carries the
    /// signal's stated reason.
    Cancelled(CancelReason),
    /// The callback panicked; carries the rendered payload.
    Panicked(PanicPayload),
    /// Every input of a promise combinator rejected.
    Aggregate(Arc<[TaskError]>),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled(reason) => write!(f, "task was cancelled: {reason}"),
            Self::Panicked(payload) => write!(f, "task panicked: {payload}"),
            Self::Aggregate(errors) => {
                write!(f, "all {} scheduled promises rejected", errors.len())
            }
        }
    }
}

impl std::error::Error for TaskError {}

/// A handle to a submitted task.
///
/// The handle does not own the task: dropping it neither cancels nor leaks
/// the task, it just forfeits the result. Await it (the handle is a
/// `Future`) or poll [`try_result`](Self::try_result) after driving the
/// host.
#[derive(Debug)]
pub struct TaskHandle<T> {
    task_id: Option<TaskId>,
    receiver: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(task_id: Option<TaskId>, receiver: oneshot::Receiver<Result<T, TaskError>>) -> Self {
        Self { task_id, receiver }
    }

    /// Returns the task id, or `None` for a submission rejected before a
    /// record was created (a pre-aborted signal).
    #[must_use]
    pub fn task_id(&self) -> Option<TaskId> {
        self.task_id
    }

    /// Returns true once the task has settled (or can never settle).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.receiver.is_ready() || self.receiver.is_closed()
    }

    /// Takes the outcome if the task has settled.
    ///
    /// The outcome is delivered at most once; later calls report the task
    /// as cancelled by shutdown.
    pub fn try_result(&self) -> Option<Result<T, TaskError>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::TryRecvError::Empty) => None,
            Err(oneshot::TryRecvError::Closed) => {
                Some(Err(TaskError::Cancelled(CancelReason::shutdown())))
            }
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(oneshot::RecvError::Closed)) => {
                Poll::Ready(Err(TaskError::Cancelled(CancelReason::shutdown())))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
