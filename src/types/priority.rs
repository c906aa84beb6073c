//! Priority tags and task kinds.

use crate::error::{Error, ErrorKind};
use core::fmt;
use std::str::FromStr;

/// The three scheduling priorities, in descending dispatch precedence.
///
/// Higher priorities always run before lower ones; as long as a higher
/// priority has queued work, lower priorities are starved. That is the
/// contract, not an accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[repr(u8)]
pub enum Priority {
    /// Work the user is blocked on (highest).
    UserBlocking = 0,
    /// Work with user-visible effects (the default).
    UserVisible = 1,
    /// Deferrable work (lowest).
    Background = 2,
}

impl Priority {
    /// Number of priority levels.
    pub const COUNT: usize = 3;

    /// All priorities in descending dispatch precedence.
    pub const ALL: [Self; Self::COUNT] = [Self::UserBlocking, Self::UserVisible, Self::Background];

    /// Returns the canonical tag string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserBlocking => "user-blocking",
            Self::UserVisible => "user-visible",
            Self::Background => "background",
        }
    }

    /// Returns the queue-table index for this priority.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Parses a priority tag, rejecting anything but the three known tags.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidPriority`] for an unknown tag.
    pub fn parse(tag: &str) -> Result<Self, Error> {
        match tag {
            "user-blocking" => Ok(Self::UserBlocking),
            "user-visible" => Ok(Self::UserVisible),
            "background" => Ok(Self::Background),
            other => Err(Error::with_message(
                ErrorKind::InvalidPriority,
                format!("unknown priority tag: {other:?}"),
            )),
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::UserVisible
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Whether a task is a continuation or a fresh task.
///
/// Continuations are submitted through the yield entry point and dispatch
/// before fresh tasks of the same priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskKind {
    /// A yield continuation.
    Continuation = 0,
    /// A freshly posted task.
    Fresh = 1,
}

impl TaskKind {
    /// Number of task kinds.
    pub const COUNT: usize = 2;

    /// Both kinds in dispatch order (continuations first).
    pub const ALL: [Self; Self::COUNT] = [Self::Continuation, Self::Fresh];

    /// Returns the queue-table index for this kind.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}
