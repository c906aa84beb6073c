//! Intrusive doubly-linked task queue.
//!
//! The queue owns no storage: records live in the scheduler's arena and the
//! prev/next links live on the records themselves, so push, pop, and remove
//! are O(1) with no per-insertion allocation.
//!
//! Invariants after every operation:
//!
//! - head is `None` iff tail is `None`
//! - walking `next` from head reaches tail, walking `prev` from tail
//!   reaches head
//! - sequence ids along the list are strictly increasing
//!
//! Handing these operations a task id the arena does not know is a
//! programming error and panics.

use crate::sched::task::TaskRecord;
use crate::types::{SequenceId, TaskId};
use crate::types::id::SequenceAllocator;
use crate::util::SlotArena;

/// An ordered queue of task records, linked through the records.
#[derive(Debug, Default)]
pub(crate) struct TaskQueue {
    head: Option<TaskId>,
    tail: Option<TaskId>,
    len: usize,
}

fn record_mut(tasks: &mut SlotArena<TaskRecord>, id: TaskId) -> &mut TaskRecord {
    tasks
        .get_mut(id.key())
        .expect("task queue operation on unknown record")
}

fn record(tasks: &SlotArena<TaskRecord>, id: TaskId) -> &TaskRecord {
    tasks
        .get(id.key())
        .expect("task queue operation on unknown record")
}

impl TaskQueue {
    /// Creates an empty queue.
    #[must_use]
    pub(crate) const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Returns the number of queued records.
    #[must_use]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no records are queued.
    #[must_use]
    pub(crate) const fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Returns the head without removing it.
    #[cfg(test)]
    #[must_use]
    pub(crate) const fn peek(&self) -> Option<TaskId> {
        self.head
    }

    /// Appends `id` at the tail and assigns it the next sequence id.
    ///
    /// # Panics
    ///
    /// Panics if the record is unknown or already linked into a queue.
    pub(crate) fn push(
        &mut self,
        tasks: &mut SlotArena<TaskRecord>,
        id: TaskId,
        sequence: &mut SequenceAllocator,
    ) {
        let tail = self.tail;
        {
            let record = record_mut(tasks, id);
            assert!(!record.queued, "record is already linked into a queue");
            record.sequence = sequence.next();
            record.prev = tail;
            record.next = None;
            record.queued = true;
        }
        match tail {
            Some(tail_id) => record_mut(tasks, tail_id).next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
        self.debug_check(tasks);
    }

    /// Removes and returns the head record, or `None` if empty.
    pub(crate) fn take_next(&mut self, tasks: &mut SlotArena<TaskRecord>) -> Option<TaskId> {
        let id = self.head?;
        self.unlink(tasks, id);
        Some(id)
    }

    /// Unlinks `id` from this queue in O(1).
    ///
    /// Returns false if the record is not queued. The caller is responsible
    /// for only passing records that belong to this queue.
    pub(crate) fn remove(&mut self, tasks: &mut SlotArena<TaskRecord>, id: TaskId) -> bool {
        if !record(tasks, id).queued {
            return false;
        }
        self.unlink(tasks, id);
        true
    }

    fn unlink(&mut self, tasks: &mut SlotArena<TaskRecord>, id: TaskId) {
        let (prev, next) = {
            let record = record_mut(tasks, id);
            let links = (record.prev, record.next);
            record.prev = None;
            record.next = None;
            record.queued = false;
            links
        };
        match prev {
            Some(prev_id) => record_mut(tasks, prev_id).next = next,
            None => self.head = next,
        }
        match next {
            Some(next_id) => record_mut(tasks, next_id).prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
        self.debug_check(tasks);
    }

    /// Links `id` immediately before `before`, or at the tail for `None`.
    ///
    /// Unlike [`push`](Self::push) this keeps the record's existing sequence
    /// id; it is the insertion half of [`merge_from`](Self::merge_from).
    fn link_before(
        &mut self,
        tasks: &mut SlotArena<TaskRecord>,
        before: Option<TaskId>,
        id: TaskId,
    ) {
        match before {
            None => {
                // Tail insertion.
                let tail = self.tail;
                {
                    let record = record_mut(tasks, id);
                    record.prev = tail;
                    record.next = None;
                    record.queued = true;
                }
                match tail {
                    Some(tail_id) => record_mut(tasks, tail_id).next = Some(id),
                    None => self.head = Some(id),
                }
                self.tail = Some(id);
            }
            Some(before_id) => {
                let prev = record(tasks, before_id).prev;
                {
                    let record = record_mut(tasks, id);
                    record.prev = prev;
                    record.next = Some(before_id);
                    record.queued = true;
                }
                record_mut(tasks, before_id).prev = Some(id);
                match prev {
                    Some(prev_id) => record_mut(tasks, prev_id).next = Some(id),
                    None => self.head = Some(id),
                }
            }
        }
        self.len += 1;
    }

    /// Transfers every record of `source` selected by `predicate` into this
    /// queue, preserving sequence-id order among the records already here.
    ///
    /// Selected records are discovered in source order, which is sequence-id
    /// order, so their insertion positions are monotonically non-decreasing:
    /// the destination cursor only ever moves forward.
    pub(crate) fn merge_from(
        &mut self,
        tasks: &mut SlotArena<TaskRecord>,
        source: &mut TaskQueue,
        predicate: impl Fn(&TaskRecord) -> bool,
    ) {
        let mut cursor = self.head;
        let mut current = source.head;

        while let Some(id) = current {
            let (next, selected, sequence) = {
                let candidate = record(tasks, id);
                (candidate.next, predicate(candidate), candidate.sequence)
            };
            if selected {
                source.unlink(tasks, id);
                while let Some(cursor_id) = cursor {
                    let at = record(tasks, cursor_id);
                    if at.sequence > sequence {
                        break;
                    }
                    cursor = at.next;
                }
                self.link_before(tasks, cursor, id);
            }
            current = next;
        }
        self.debug_check(tasks);
        source.debug_check(tasks);
    }

    /// Walks the queue front to back (test support).
    #[cfg(test)]
    pub(crate) fn iter<'a>(
        &'a self,
        tasks: &'a SlotArena<TaskRecord>,
    ) -> impl Iterator<Item = TaskId> + 'a {
        let mut current = self.head;
        std::iter::from_fn(move || {
            let id = current?;
            current = record(tasks, id).next;
            Some(id)
        })
    }

    /// Validates the doubly-linked invariants. Debug builds only.
    fn debug_check(&self, tasks: &SlotArena<TaskRecord>) {
        if !cfg!(debug_assertions) {
            return;
        }
        debug_assert_eq!(self.head.is_none(), self.tail.is_none());
        let mut count = 0;
        let mut prev: Option<TaskId> = None;
        let mut last_sequence = SequenceId::UNASSIGNED;
        let mut current = self.head;
        while let Some(id) = current {
            let node = record(tasks, id);
            debug_assert!(node.queued);
            debug_assert_eq!(node.prev, prev);
            debug_assert!(node.sequence > last_sequence);
            last_sequence = node.sequence;
            prev = Some(id);
            current = node.next;
            count += 1;
        }
        debug_assert_eq!(prev, self.tail);
        debug_assert_eq!(count, self.len);
    }
}
