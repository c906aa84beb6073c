//! Identifier and time types.

use crate::util::SlotKey;
use core::fmt;
use std::time::Duration;

/// Identifier for a submitted task.
///
/// Task ids are generation-tagged slot keys, so a stale id can never
/// resolve to a record that reused the same slot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) SlotKey);

impl TaskId {
    /// Creates a task id from a record's slot key.
    #[inline]
    #[must_use]
    pub(crate) const fn from_key(key: SlotKey) -> Self {
        Self(key)
    }

    /// Returns the record's slot key.
    #[inline]
    #[must_use]
    pub(crate) const fn key(self) -> SlotKey {
        self.0
    }

    /// Creates a task id for tests without going through an arena.
    #[cfg(any(test, feature = "test-internals"))]
    #[must_use]
    pub fn new_for_test(slot: u32, generation: u32) -> Self {
        Self(SlotKey::new(slot, generation))
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({}:{})", self.0.slot(), self.0.generation())
    }
}

/// Globally unique, strictly increasing insertion order of a task.
///
/// A sequence id is assigned when a task record is pushed into a queue and is
/// the FIFO tie-break within a queue as well as the merge key during priority
/// migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceId(u64);

impl SequenceId {
    /// The sequence id assigned before any queue insertion happened.
    pub const UNASSIGNED: Self = Self(0);

    /// Returns the raw counter value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// Allocator for [`SequenceId`]s.
///
/// Sequence ids start at 1 so that `SequenceId::UNASSIGNED` is never handed
/// out.
#[derive(Debug)]
pub struct SequenceAllocator {
    next: u64,
}

impl SequenceAllocator {
    /// Creates a new allocator.
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 1 }
    }

    /// Returns the next sequence id, advancing the counter.
    #[inline]
    pub fn next(&mut self) -> SequenceId {
        let seq = SequenceId(self.next);
        self.next += 1;
        seq
    }
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// A point on the host timeline, in nanoseconds.
///
/// `Time` is monotone and host-defined; the simulated host backs it with a
/// virtual clock, production hosts with whatever monotonic source they have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Time(u64);

impl Time {
    /// The zero point of the timeline.
    pub const ZERO: Self = Self(0);

    /// Creates a time from nanoseconds.
    #[inline]
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a time from milliseconds.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis * 1_000_000)
    }

    /// Returns the time as nanoseconds.
    #[inline]
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Returns the time `duration` after `self`, saturating at the end of
    /// the timeline.
    #[inline]
    #[must_use]
    pub fn after(self, duration: Duration) -> Self {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }

    /// Returns the duration elapsed since `earlier`, or zero if `earlier`
    /// is in the future.
    #[inline]
    #[must_use]
    pub fn duration_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}
