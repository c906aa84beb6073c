//! Cancellation reason types.

use core::fmt;
use std::sync::Arc;

/// The kind of a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CancelKind {
    /// An explicit abort through a controller.
    Abort,
    /// The scheduler was dropped with the task still queued.
    Shutdown,
}

/// Why a task was cancelled.
///
/// The reason is attached to the abort signal and surfaces verbatim as the
/// rejection of every task that was submitted with that signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReason {
    kind: CancelKind,
    detail: Option<Arc<str>>,
}

impl CancelReason {
    /// Creates an abort reason with a caller-supplied detail message.
    #[must_use]
    pub fn user(detail: impl Into<String>) -> Self {
        Self {
            kind: CancelKind::Abort,
            detail: Some(Arc::from(detail.into())),
        }
    }

    /// The reason used when a controller aborts without stating one.
    #[must_use]
    pub const fn aborted() -> Self {
        Self {
            kind: CancelKind::Abort,
            detail: None,
        }
    }

    /// The reason used for tasks stranded by a dropped scheduler.
    #[must_use]
    pub const fn shutdown() -> Self {
        Self {
            kind: CancelKind::Shutdown,
            detail: None,
        }
    }

    /// Returns the kind of this reason.
    #[must_use]
    pub const fn kind(&self) -> CancelKind {
        self.kind
    }

    /// Returns the detail message, if one was stated.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, &self.detail) {
            (CancelKind::Abort, Some(detail)) => write!(f, "aborted: {detail}"),
            (CancelKind::Abort, None) => f.write_str("aborted"),
            (CancelKind::Shutdown, _) => f.write_str("scheduler shut down"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_reason_carries_detail() {
        let reason = CancelReason::user("stop");
        assert_eq!(reason.kind(), CancelKind::Abort);
        assert_eq!(reason.detail(), Some("stop"));
        assert_eq!(reason.to_string(), "aborted: stop");
    }

    #[test]
    fn default_abort_has_no_detail() {
        let reason = CancelReason::aborted();
        assert_eq!(reason.detail(), None);
        assert_eq!(reason.to_string(), "aborted");
    }

    #[test]
    fn reasons_compare_by_content() {
        assert_eq!(CancelReason::user("x"), CancelReason::user("x"));
        assert_ne!(CancelReason::user("x"), CancelReason::aborted());
        assert_ne!(CancelReason::aborted(), CancelReason::shutdown());
    }
}
