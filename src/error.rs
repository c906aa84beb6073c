//! Error types and error handling strategy for tasklane.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Type violations and disallowed operations are returned synchronously
//!   from the call that detected them, never smuggled into a task rejection
//! - Cancellation and callback panics surface only through a task's handle
//! - The dispatch loop itself never fails; a panicking callback is isolated
//!   to its own task

use core::fmt;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Type violations ===
    /// A priority tag outside the three known tags.
    InvalidPriority,
    /// A delay that is negative or not a finite number of milliseconds.
    InvalidDelay,
    /// An options value that is not usable as submission options.
    InvalidOptions,

    // === Disallowed operations ===
    /// `set_priority` called from within a priority-change listener.
    ReentrantPriorityChange,

    // === Installation ===
    /// No process-wide scheduler has been installed.
    NotInstalled,

    // === Internal ===
    /// Internal invariant violation (a bug in this crate).
    Internal,
}

/// Coarse classification of an [`ErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The caller passed a value of the wrong shape.
    TypeViolation,
    /// The operation is not allowed in the current state.
    DisallowedOperation,
    /// The crate itself is at fault.
    Internal,
}

impl ErrorKind {
    /// Returns the category for this kind.
    #[must_use]
    pub const fn category(self) -> ErrorCategory {
        match self {
            Self::InvalidPriority | Self::InvalidDelay | Self::InvalidOptions => {
                ErrorCategory::TypeViolation
            }
            Self::ReentrantPriorityChange | Self::NotInstalled => {
                ErrorCategory::DisallowedOperation
            }
            Self::Internal => ErrorCategory::Internal,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidPriority => "invalid priority tag",
            Self::InvalidDelay => "invalid delay",
            Self::InvalidOptions => "invalid submission options",
            Self::ReentrantPriorityChange => {
                "set_priority is not allowed from a prioritychange listener"
            }
            Self::NotInstalled => "no scheduler installed",
            Self::Internal => "internal scheduler error",
        }
    }
}

/// An error raised synchronously by a scheduler operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: Option<Arc<str>>,
}

impl Error {
    /// Creates an error with no extra context.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Creates an error with a context message.
    #[must_use]
    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: Some(Arc::from(message.into())),
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the category of the error kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns the context message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {message}", self.kind.as_str()),
            None => f.write_str(self.kind.as_str()),
        }
    }
}

impl std::error::Error for Error {}

/// Result alias for scheduler operations.
pub type Result<T> = std::result::Result<T, Error>;
