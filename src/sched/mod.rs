//! The priority scheduler.
//!
//! The scheduler mediates between an unbounded stream of submitted work and
//! a small set of host yield primitives, driving forward progress with
//! exactly one outstanding host wakeup at a time.
//!
//! State is one table of per-priority queue pairs. Each priority owns two
//! intrusive queues, continuations (yield) ahead of fresh tasks (post), and
//! dispatch scans priorities from highest to lowest. Within a queue, tasks
//! run in sequence-id order; a signal's live priority change migrates its
//! tasks between queues while preserving that order among the tasks already
//! in the destination.
//!
//! The pending host callback is an exclusive slot: only the dispatch path
//! clears it and only the arming path sets it. Wakeup thunks carry a token
//! so a wakeup the host delivers after cancellation is recognized as stale
//! and dropped.

pub mod handle;
pub mod queue;
pub mod task;

pub use handle::{PanicPayload, TaskError, TaskHandle};
pub use task::{ScheduleSignal, SubmitOptions};

use crate::channel::oneshot;
use crate::config::SchedulerConfig;
use crate::host::{HostCallback, HostEventLoop, HostThunk, PortDispatcher};
use crate::sched::queue::TaskQueue;
use crate::sched::task::TaskRecord;
use crate::signal::{PriorityListenerId, SignalIdentity, TaskSignal, WeakTaskSignal};
use crate::tracing_compat::trace;
use crate::types::id::SequenceAllocator;
use crate::types::{CancelReason, Priority, TaskId, TaskKind};
use crate::util::SlotArena;
use core::fmt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

struct PendingWakeup {
    callback: HostCallback,
    token: u64,
}

struct RegistryEntry {
    identity: SignalIdentity,
    signal: WeakTaskSignal,
    last_priority: Priority,
    #[allow(dead_code)]
    listener: PriorityListenerId,
}

struct SchedulerState {
    tasks: SlotArena<TaskRecord>,
    /// `queues[priority][kind]`; kind 0 holds continuations, kind 1 fresh
    /// tasks.
    queues: [[TaskQueue; TaskKind::COUNT]; Priority::COUNT],
    sequence: SequenceAllocator,
    pending: Option<PendingWakeup>,
    next_wakeup_token: u64,
    /// Signals subscribed for `prioritychange`, held weakly: dropping every
    /// external signal handle drops the entry at the next prune.
    registry: Vec<RegistryEntry>,
}

impl SchedulerState {
    fn new(capacity: usize) -> Self {
        Self {
            tasks: SlotArena::with_capacity(capacity),
            queues: Default::default(),
            sequence: SequenceAllocator::new(),
            pending: None,
            next_wakeup_token: 0,
            registry: Vec::new(),
        }
    }

    fn highest_non_empty_priority(&self) -> Option<Priority> {
        Priority::ALL.into_iter().find(|priority| {
            TaskKind::ALL
                .iter()
                .any(|kind| !self.queues[priority.index()][kind.index()].is_empty())
        })
    }
}

struct SchedulerInner {
    host: Arc<dyn HostEventLoop>,
    port: Option<PortDispatcher>,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
}

/// What dispatch extracted for one task, run outside the state lock.
struct DispatchWork {
    run: Option<Box<dyn FnOnce() + Send>>,
    signal: Option<ScheduleSignal>,
    abort_listener: Option<crate::signal::AbortListenerId>,
}

/// Cooperative, priority-aware task scheduler.
///
/// Cheap to clone; clones share one scheduler. Submissions return a
/// [`TaskHandle`] that settles with the callback's return value, its panic
/// payload, or the signal's abort reason.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Scheduler")
            .field("queued", &state.tasks.len())
            .field("pending_wakeup", &state.pending.is_some())
            .field("tracked_signals", &state.registry.len())
            .finish()
    }
}

impl Scheduler {
    /// Creates a scheduler on `host` with the default configuration.
    #[must_use]
    pub fn new(host: Arc<dyn HostEventLoop>) -> Self {
        Self::with_config(host, SchedulerConfig::default())
    }

    /// Creates a scheduler on `host` with an explicit configuration.
    #[must_use]
    pub fn with_config(host: Arc<dyn HostEventLoop>, config: SchedulerConfig) -> Self {
        let port = PortDispatcher::open(host.as_ref());
        let state = Mutex::new(SchedulerState::new(config.task_capacity.max(1)));
        Self {
            inner: Arc::new(SchedulerInner {
                host,
                port,
                config,
                state,
            }),
        }
    }

    /// Submits `callback` as a fresh task.
    ///
    /// The returned handle fulfils with the callback's return value, or
    /// rejects with the panic payload or the signal's abort reason. A signal
    /// that is already aborted rejects immediately without creating a task.
    pub fn post_task<T, F>(&self, callback: F, options: SubmitOptions) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.submit_entry(TaskKind::Fresh, callback, options)
    }

    /// Submits a continuation that settles as soon as it is dispatched.
    ///
    /// Continuations run before fresh tasks of the same priority; awaiting
    /// the handle yields the current task's slice back to the scheduler.
    pub fn yield_now(&self) -> TaskHandle<()> {
        self.yield_with(SubmitOptions::new())
    }

    /// Submits a continuation with explicit options.
    pub fn yield_with(&self, options: SubmitOptions) -> TaskHandle<()> {
        self.submit_entry(TaskKind::Continuation, || (), options)
    }

    /// Number of tasks currently queued or waiting on a delay.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.inner.state.lock().tasks.len()
    }

    /// True while a host wakeup is armed.
    #[must_use]
    pub fn has_pending_wakeup(&self) -> bool {
        self.inner.state.lock().pending.is_some()
    }

    /// Number of signals tracked for priority changes, after pruning dead
    /// entries.
    #[must_use]
    pub fn tracked_signal_count(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.registry.retain(|entry| entry.signal.upgrade().is_some());
        state.registry.len()
    }

    fn submit_entry<T, F>(&self, kind: TaskKind, callback: F, options: SubmitOptions) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        // A signal aborted before submission rejects without enqueueing.
        if let Some(signal) = &options.signal {
            if signal.aborted() {
                let (tx, rx) = oneshot::channel();
                let reason = signal.reason().unwrap_or_else(CancelReason::aborted);
                let _ = tx.send(Err(TaskError::Cancelled(reason)));
                return TaskHandle::new(None, rx);
            }
        }

        let (tx, rx) = oneshot::channel();
        // Exactly one of run/reject fires; they share the sender through a
        // take-once slot.
        let sender = Arc::new(Mutex::new(Some(tx)));
        let run_sender = Arc::clone(&sender);
        let run: Box<dyn FnOnce() + Send> = Box::new(move || {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(callback))
                .map_err(|payload| TaskError::Panicked(PanicPayload::from_panic(payload)));
            if let Some(tx) = run_sender.lock().take() {
                let _ = tx.send(outcome);
            }
        });
        let reject: Box<dyn FnOnce(TaskError) + Send> = Box::new(move |error| {
            if let Some(tx) = sender.lock().take() {
                let _ = tx.send(Err(error));
            }
        });

        let id = self.submit(kind, options, run, reject);
        TaskHandle::new(Some(id), rx)
    }

    pub(crate) fn submit(
        &self,
        kind: TaskKind,
        options: SubmitOptions,
        run: Box<dyn FnOnce() + Send>,
        reject: Box<dyn FnOnce(TaskError) + Send>,
    ) -> TaskId {
        let inner = &self.inner;
        let signal = options.signal.clone();
        let delay = options.delay;

        let id = {
            let mut state = inner.state.lock();
            TaskId::from_key(state.tasks.insert(TaskRecord::new(kind, options, run, reject)))
        };
        trace!(?id, ?kind, ?delay, "task submitted");

        // The abort listener is registered outside the state lock: a signal
        // aborting on another thread fires listeners on that thread, and a
        // signal that aborted in the meantime fires this one synchronously
        // right here.
        if let Some(signal) = &signal {
            let weak = Arc::downgrade(inner);
            let listener = signal.add_abort_listener(move |reason| {
                if let Some(inner) = weak.upgrade() {
                    Scheduler::on_task_aborted(&inner, id, reason.clone());
                }
            });
            let mut state = inner.state.lock();
            match state.tasks.get_mut(id.key()) {
                Some(record) => record.abort_listener = Some(listener),
                // The listener already fired and consumed the record.
                None => return id,
            }
        }

        if delay > Duration::ZERO {
            // Not enqueued yet; the timer re-enters the scheduler when the
            // delay elapses. Delayed submissions always use the timer
            // primitive, whatever their priority.
            let weak = Arc::downgrade(inner);
            let thunk: HostThunk = Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Scheduler::on_delay_expired(&inner, id);
                }
            });
            let callback = HostCallback::schedule(
                &inner.host,
                inner.port.as_ref(),
                Priority::UserVisible,
                delay,
                false,
                thunk,
            );
            let mut state = inner.state.lock();
            match state.tasks.get_mut(id.key()) {
                Some(record) => record.delay_callback = Some(callback),
                None => {
                    // Aborted while the timer was being created.
                    let mut callback = callback;
                    callback.cancel();
                }
            }
        } else {
            let mut state = inner.state.lock();
            if state.tasks.contains(id.key()) {
                Self::enqueue_task(inner, &mut state, id);
                Self::schedule_wakeup_if_needed(inner, &mut state);
            }
        }
        id
    }

    /// Places a ready task into the queue for its effective priority.
    ///
    /// Priority resolves at enqueue time, not submission time, so a delayed
    /// task observes its signal's current priority when it becomes ready.
    fn enqueue_task(inner: &Arc<SchedulerInner>, state: &mut SchedulerState, id: TaskId) {
        let (priority, kind, task_signal) = {
            let record = state
                .tasks
                .get(id.key())
                .expect("enqueue of unknown record");
            let task_signal = match &record.signal {
                Some(ScheduleSignal::Task(signal)) => Some(signal.clone()),
                _ => None,
            };
            (
                record.resolve_priority(inner.config.default_priority),
                record.kind,
                task_signal,
            )
        };

        if let Some(signal) = task_signal {
            Self::subscribe_signal(inner, state, &signal);
        }

        let SchedulerState {
            queues,
            tasks,
            sequence,
            ..
        } = state;
        queues[priority.index()][kind.index()].push(tasks, id, sequence);
        trace!(?id, %priority, ?kind, "task enqueued");
    }

    /// Subscribes to a signal's `prioritychange` on first sight.
    fn subscribe_signal(inner: &Arc<SchedulerInner>, state: &mut SchedulerState, signal: &TaskSignal) {
        let identity = signal.identity();
        if state.registry.iter().any(|entry| entry.identity == identity) {
            return;
        }
        let weak = Arc::downgrade(inner);
        let listener = signal.on_priority_change(move |change| {
            if let Some(inner) = weak.upgrade() {
                Scheduler::on_priority_change(&inner, identity, change.previous);
            }
        });
        state.registry.push(RegistryEntry {
            identity,
            signal: signal.downgrade(),
            last_priority: signal.priority(),
            listener,
        });
    }

    /// Migrates the signal's tasks from the old priority's queues to the
    /// new one's, kind by kind, preserving sequence order.
    fn on_priority_change(inner: &Arc<SchedulerInner>, identity: SignalIdentity, previous: Priority) {
        let mut state = inner.state.lock();
        // Signals are held weakly; prune entries whose last external handle
        // is gone.
        state.registry.retain(|entry| entry.signal.upgrade().is_some());

        let Some(entry) = state
            .registry
            .iter_mut()
            .find(|entry| entry.identity == identity)
        else {
            return;
        };
        let Some(signal) = entry.signal.upgrade() else {
            return;
        };
        let new = signal.priority();
        debug_assert_eq!(entry.last_priority, previous);
        entry.last_priority = new;
        if previous == new {
            return;
        }
        trace!(%previous, %new, "migrating signal tasks");

        for kind in TaskKind::ALL {
            let SchedulerState { queues, tasks, .. } = &mut *state;
            let (dest, source) = queue_pair_mut(queues, new, previous, kind);
            dest.merge_from(tasks, source, |record| {
                record
                    .signal
                    .as_ref()
                    .and_then(ScheduleSignal::task_identity)
                    == Some(identity)
            });
        }

        // Migration can raise the highest non-empty priority past what the
        // pending wakeup was armed for.
        Self::schedule_wakeup_if_needed(inner, &mut state);
    }

    /// Arms a host wakeup when queued work exists and none is armed, and
    /// replaces a pending idle wakeup that non-background work has outrun.
    fn schedule_wakeup_if_needed(inner: &Arc<SchedulerInner>, state: &mut SchedulerState) {
        let Some(priority) = state.highest_non_empty_priority() else {
            return;
        };

        let too_lazy = match &mut state.pending {
            Some(pending)
                if pending.callback.is_idle_callback() && priority != Priority::Background =>
            {
                pending.callback.cancel();
                true
            }
            _ => false,
        };
        if too_lazy {
            state.pending = None;
        }

        if state.pending.is_none() {
            let token = state.next_wakeup_token;
            state.next_wakeup_token += 1;
            let weak = Arc::downgrade(inner);
            let thunk: HostThunk = Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Scheduler::on_host_tick(&inner, token);
                }
            });
            let callback = HostCallback::schedule(
                &inner.host,
                inner.port.as_ref(),
                priority,
                Duration::ZERO,
                inner.config.use_idle_callback,
                thunk,
            );
            state.pending = Some(PendingWakeup { callback, token });
        }
    }

    /// Host wakeup entry point: clear the pending slot, run one task,
    /// re-arm if work remains.
    fn on_host_tick(inner: &Arc<SchedulerInner>, token: u64) {
        {
            let mut state = inner.state.lock();
            match &state.pending {
                Some(pending) if pending.token == token => state.pending = None,
                // A wakeup the host delivered after cancellation.
                _ => return,
            }
        }
        Self::dispatch_once(inner);
    }

    /// Delay-timer entry point: enqueue the now-ready task, drop whatever
    /// wakeup was armed, and dispatch immediately so the expired task is
    /// not starved behind a lazier tick.
    fn on_delay_expired(inner: &Arc<SchedulerInner>, id: TaskId) {
        let stale = {
            let mut state = inner.state.lock();
            let Some(record) = state.tasks.get_mut(id.key()) else {
                return;
            };
            record.delay_callback = None;
            Self::enqueue_task(inner, &mut state, id);
            state.pending.take()
        };
        if let Some(mut pending) = stale {
            pending.callback.cancel();
        }
        Self::dispatch_once(inner);
    }

    /// Runs the oldest task of the highest non-empty priority, then re-arms.
    fn dispatch_once(inner: &Arc<SchedulerInner>) {
        let work = {
            let mut state = inner.state.lock();
            Self::take_next_runnable(&mut state)
        };

        if let Some(work) = work {
            if let (Some(signal), Some(listener)) = (&work.signal, work.abort_listener) {
                signal.remove_abort_listener(listener);
            }
            if let Some(run) = work.run {
                // User code runs outside the state lock; submissions and
                // priority changes from within the callback are ordinary
                // reentrant calls.
                run();
            }
        }

        let mut state = inner.state.lock();
        Self::schedule_wakeup_if_needed(inner, &mut state);
    }

    /// Pops the globally oldest highest-priority non-aborted record.
    ///
    /// Aborted tasks are not pre-pruned from queues; they are discarded
    /// here when they reach a head, their rejection having been handled by
    /// the abort listener.
    fn take_next_runnable(state: &mut SchedulerState) -> Option<DispatchWork> {
        loop {
            let mut found = None;
            'scan: for priority in Priority::ALL {
                for kind in TaskKind::ALL {
                    let SchedulerState { queues, tasks, .. } = &mut *state;
                    if let Some(id) = queues[priority.index()][kind.index()].take_next(tasks) {
                        found = Some(id);
                        break 'scan;
                    }
                }
            }
            let id = found?;
            let record = state
                .tasks
                .remove(id.key())
                .expect("queued record exists in the arena");
            if record.signal.as_ref().is_some_and(ScheduleSignal::aborted) {
                trace!(?id, "discarding aborted task at dispatch");
                continue;
            }
            return Some(DispatchWork {
                run: record.run,
                signal: record.signal,
                abort_listener: record.abort_listener,
            });
        }
    }

    /// Abort-listener entry point. The task's handle rejects with the
    /// signal's reason; a queued record stays queued and is skipped at
    /// dispatch, while a record still waiting on its delay is dropped
    /// outright.
    fn on_task_aborted(inner: &Arc<SchedulerInner>, id: TaskId, reason: CancelReason) {
        let (reject, delay_callback) = {
            let mut state = inner.state.lock();
            let (reject, delay_callback, queued) = {
                let Some(record) = state.tasks.get_mut(id.key()) else {
                    return;
                };
                record.abort_listener = None;
                (
                    record.reject.take(),
                    record.delay_callback.take(),
                    record.queued,
                )
            };
            if !queued {
                state.tasks.remove(id.key());
            }
            (reject, delay_callback)
        };
        if let Some(mut callback) = delay_callback {
            callback.cancel();
        }
        if let Some(reject) = reject {
            reject(TaskError::Cancelled(reason));
        }
    }
}

/// Mutably borrows two different priorities' queues of the same kind.
fn queue_pair_mut(
    queues: &mut [[TaskQueue; TaskKind::COUNT]; Priority::COUNT],
    dest: Priority,
    source: Priority,
    kind: TaskKind,
) -> (&mut TaskQueue, &mut TaskQueue) {
    let (d, s) = (dest.index(), source.index());
    debug_assert_ne!(d, s);
    if d < s {
        let (low, high) = queues.split_at_mut(s);
        (&mut low[d][kind.index()], &mut high[0][kind.index()])
    } else {
        let (low, high) = queues.split_at_mut(d);
        (&mut high[0][kind.index()], &mut low[s][kind.index()])
    }
}
