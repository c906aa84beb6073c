//! Task records and submission options.

use crate::error::{Error, ErrorKind, Result};
use crate::host::HostCallback;
use crate::signal::{AbortListenerId, AbortSignal, SignalIdentity, TaskSignal};
use crate::types::{CancelReason, Priority, SequenceId, TaskId, TaskKind};
use core::fmt;
use std::time::Duration;

/// A cancellation signal accepted by submission options.
///
/// Either a plain [`AbortSignal`] (cancellation only) or a [`TaskSignal`]
/// (cancellation plus a live priority the scheduler tracks).
#[derive(Clone)]
pub enum ScheduleSignal {
    /// Cancellation without a priority.
    Abort(AbortSignal),
    /// Cancellation with a mutable priority.
    Task(TaskSignal),
}

impl fmt::Debug for ScheduleSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort(signal) => f.debug_tuple("Abort").field(signal).finish(),
            Self::Task(signal) => f.debug_tuple("Task").field(signal).finish(),
        }
    }
}

impl ScheduleSignal {
    /// Returns true once the signal's controller has aborted.
    #[must_use]
    pub fn aborted(&self) -> bool {
        match self {
            Self::Abort(signal) => signal.aborted(),
            Self::Task(signal) => signal.aborted(),
        }
    }

    /// Returns the abort reason, if aborted.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        match self {
            Self::Abort(signal) => signal.reason(),
            Self::Task(signal) => signal.reason(),
        }
    }

    /// Returns the signal's priority, if it carries one.
    #[must_use]
    pub fn priority(&self) -> Option<Priority> {
        match self {
            Self::Abort(_) => None,
            Self::Task(signal) => Some(signal.priority()),
        }
    }

    /// Returns the priority-registry identity, if the signal carries a
    /// priority.
    #[must_use]
    pub fn task_identity(&self) -> Option<SignalIdentity> {
        match self {
            Self::Abort(_) => None,
            Self::Task(signal) => Some(signal.identity()),
        }
    }

    pub(crate) fn add_abort_listener(
        &self,
        listener: impl FnOnce(&CancelReason) + Send + 'static,
    ) -> AbortListenerId {
        match self {
            Self::Abort(signal) => signal.add_listener(listener),
            Self::Task(signal) => signal.add_abort_listener(listener),
        }
    }

    pub(crate) fn remove_abort_listener(&self, id: AbortListenerId) -> bool {
        match self {
            Self::Abort(signal) => signal.remove_listener(id),
            Self::Task(signal) => signal.remove_abort_listener(id),
        }
    }
}

impl From<AbortSignal> for ScheduleSignal {
    fn from(signal: AbortSignal) -> Self {
        Self::Abort(signal)
    }
}

impl From<TaskSignal> for ScheduleSignal {
    fn from(signal: TaskSignal) -> Self {
        Self::Task(signal)
    }
}

/// Options for a task submission.
///
/// The scheduler copies the options at submission, so later mutation of the
/// caller's value has no effect on an already-submitted task.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Explicit priority; overrides the signal's priority for this task.
    pub priority: Option<Priority>,
    /// Cancellation (and optionally priority) signal.
    pub signal: Option<ScheduleSignal>,
    /// Minimum delay before the task becomes eligible to run.
    pub delay: Duration,
}

impl SubmitOptions {
    /// Options with no priority, no signal, and no delay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an explicit priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Attaches a signal.
    #[must_use]
    pub fn with_signal(mut self, signal: impl Into<ScheduleSignal>) -> Self {
        self.signal = Some(signal.into());
        self
    }

    /// Sets the minimum delay.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the minimum delay from a millisecond count.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidDelay`] for a negative or non-finite
    /// count.
    pub fn with_delay_ms(mut self, millis: f64) -> Result<Self> {
        if !millis.is_finite() || millis < 0.0 {
            return Err(Error::with_message(
                ErrorKind::InvalidDelay,
                format!("delay must be a non-negative number of milliseconds, got {millis}"),
            ));
        }
        self.delay = Duration::from_secs_f64(millis / 1_000.0);
        Ok(self)
    }
}

/// Per-task bookkeeping owned by the scheduler.
///
/// The queue's link fields live here, on the record itself, so a record can
/// be unlinked in O(1) by identity. A record appears in at most one queue at
/// a time; its `prev`/`next` only ever reference records in the same queue.
pub(crate) struct TaskRecord {
    /// Runs the callback and settles the handle. Consumed at dispatch.
    pub(crate) run: Option<Box<dyn FnOnce() + Send>>,
    /// Rejects the handle. Consumed on abort.
    pub(crate) reject: Option<Box<dyn FnOnce(crate::sched::TaskError) + Send>>,
    pub(crate) kind: TaskKind,
    pub(crate) explicit_priority: Option<Priority>,
    pub(crate) signal: Option<ScheduleSignal>,
    pub(crate) delay: Duration,
    /// Pending host callback backing this task's delay timer.
    pub(crate) delay_callback: Option<HostCallback>,
    /// Abort listener to detach on completion.
    pub(crate) abort_listener: Option<AbortListenerId>,
    /// Assigned at queue insertion; the FIFO tiebreak and migration key.
    pub(crate) sequence: SequenceId,
    pub(crate) prev: Option<TaskId>,
    pub(crate) next: Option<TaskId>,
    /// True while linked into a queue.
    pub(crate) queued: bool,
}

impl fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("kind", &self.kind)
            .field("explicit_priority", &self.explicit_priority)
            .field("delay", &self.delay)
            .field("sequence", &self.sequence)
            .field("queued", &self.queued)
            .finish()
    }
}

impl TaskRecord {
    pub(crate) fn new(
        kind: TaskKind,
        options: SubmitOptions,
        run: Box<dyn FnOnce() + Send>,
        reject: Box<dyn FnOnce(crate::sched::TaskError) + Send>,
    ) -> Self {
        Self {
            run: Some(run),
            reject: Some(reject),
            kind,
            explicit_priority: options.priority,
            signal: options.signal,
            delay: options.delay,
            delay_callback: None,
            abort_listener: None,
            sequence: SequenceId::UNASSIGNED,
            prev: None,
            next: None,
            queued: false,
        }
    }

    /// A minimal record for queue tests.
    #[cfg(test)]
    pub(crate) fn stub(kind: TaskKind) -> Self {
        Self::new(
            kind,
            SubmitOptions::new(),
            Box::new(|| {}),
            Box::new(|_| {}),
        )
    }

    /// Effective priority per the resolution order: explicit option first,
    /// then the signal's priority, then the scheduler default.
    pub(crate) fn resolve_priority(&self, default: Priority) -> Priority {
        self.explicit_priority
            .or_else(|| self.signal.as_ref().and_then(ScheduleSignal::priority))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::TaskController;

    #[test]
    fn delay_ms_rejects_negative_and_non_finite() {
        for bad in [-1.0, f64::NAN, f64::INFINITY, -0.5] {
            let err = SubmitOptions::new().with_delay_ms(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidDelay);
        }
        let options = SubmitOptions::new().with_delay_ms(20.0).unwrap();
        assert_eq!(options.delay, Duration::from_millis(20));
    }

    #[test]
    fn priority_resolution_order() {
        let controller = TaskController::with_priority(Priority::Background);

        // Explicit priority wins over the signal.
        let record = TaskRecord::new(
            TaskKind::Fresh,
            SubmitOptions::new()
                .with_priority(Priority::UserBlocking)
                .with_signal(controller.signal()),
            Box::new(|| {}),
            Box::new(|_| {}),
        );
        assert_eq!(
            record.resolve_priority(Priority::UserVisible),
            Priority::UserBlocking
        );

        // Signal priority beats the default.
        let record = TaskRecord::new(
            TaskKind::Fresh,
            SubmitOptions::new().with_signal(controller.signal()),
            Box::new(|| {}),
            Box::new(|_| {}),
        );
        assert_eq!(
            record.resolve_priority(Priority::UserVisible),
            Priority::Background
        );

        // A bare abort signal contributes no priority.
        let abort = crate::signal::AbortController::new();
        let record = TaskRecord::new(
            TaskKind::Fresh,
            SubmitOptions::new().with_signal(abort.signal()),
            Box::new(|| {}),
            Box::new(|_| {}),
        );
        assert_eq!(
            record.resolve_priority(Priority::UserVisible),
            Priority::UserVisible
        );
    }

    #[test]
    fn signal_priority_is_read_at_resolution_time() {
        let controller = TaskController::with_priority(Priority::UserVisible);
        let record = TaskRecord::new(
            TaskKind::Fresh,
            SubmitOptions::new().with_signal(controller.signal()),
            Box::new(|| {}),
            Box::new(|_| {}),
        );

        controller.set_priority(Priority::UserBlocking).unwrap();
        assert_eq!(
            record.resolve_priority(Priority::UserVisible),
            Priority::UserBlocking
        );
    }
}
