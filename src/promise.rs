//! Promise-style settlement routed through the scheduler.
//!
//! A [`ScheduledPromise`] owns a [`TaskController`] and keeps its settlement
//! cell private. Calling the resolvers does not settle the promise
//! synchronously: the settlement is submitted to the scheduler as a task
//! carrying the controller's signal, so settlement observers run at the
//! controller's *current* priority, and a priority change before dispatch
//! reprioritizes the settlement itself.
//!
//! `then`/`catch`/`finally` produce new promises sharing the same
//! controller, so one `set_priority` call reprioritizes an entire chain.
//! The static helpers ([`resolved`](ScheduledPromise::resolved),
//! [`rejected`](ScheduledPromise::rejected), [`all`](ScheduledPromise::all),
//! [`all_settled`](ScheduledPromise::all_settled),
//! [`any`](ScheduledPromise::any), [`race`](ScheduledPromise::race),
//! [`try_with`](ScheduledPromise::try_with),
//! [`with_resolvers`](ScheduledPromise::with_resolvers)) each return a
//! promise with a fresh controller.

use crate::sched::{PanicPayload, ScheduleSignal, Scheduler, SubmitOptions, TaskError};
use crate::signal::TaskController;
use crate::types::{Priority, TaskKind};
use core::fmt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Settlement outcome of a promise.
pub type PromiseOutcome<T> = Result<T, TaskError>;

/// Options for controllers created by the promise constructors.
#[derive(Debug, Clone, Copy)]
pub struct PromiseOptions {
    /// Priority of the fresh controller.
    pub priority: Priority,
}

impl Default for PromiseOptions {
    fn default() -> Self {
        Self {
            priority: Priority::Background,
        }
    }
}

static DEFAULT_OPTIONS: Mutex<PromiseOptions> = Mutex::new(PromiseOptions {
    priority: Priority::Background,
});

/// Returns the process-wide default controller options.
///
/// The initial record is `{ priority: background }`.
#[must_use]
pub fn default_options() -> PromiseOptions {
    *DEFAULT_OPTIONS.lock()
}

/// Replaces the process-wide default controller options.
pub fn set_default_options(options: PromiseOptions) {
    *DEFAULT_OPTIONS.lock() = options;
}

type Reaction<T> = Box<dyn FnOnce(&PromiseOutcome<T>) + Send>;

enum CellState<T> {
    Pending {
        reactions: Vec<Reaction<T>>,
        wakers: Vec<Waker>,
    },
    Settled(Arc<PromiseOutcome<T>>),
}

struct PromiseCell<T> {
    state: Mutex<CellState<T>>,
}

impl<T> PromiseCell<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(CellState::Pending {
                reactions: Vec::new(),
                wakers: Vec::new(),
            }),
        }
    }
}

/// Settles a cell at most once and drains its observers outside the lock.
fn settle_cell<T>(cell: &Arc<PromiseCell<T>>, outcome: PromiseOutcome<T>) {
    let outcome = Arc::new(outcome);
    let (reactions, wakers) = {
        let mut state = cell.state.lock();
        match &mut *state {
            CellState::Settled(_) => return,
            CellState::Pending { reactions, wakers } => {
                let reactions = std::mem::take(reactions);
                let wakers = std::mem::take(wakers);
                *state = CellState::Settled(Arc::clone(&outcome));
                (reactions, wakers)
            }
        }
    };
    for reaction in reactions {
        reaction(&outcome);
    }
    for waker in wakers {
        waker.wake();
    }
}

/// Submits a settlement-producing job as a task under `controller`'s signal.
///
/// The job's panic rejects the cell; an abort of the controller before
/// dispatch rejects the cell with the abort reason.
fn submit_settlement<U: Send + Sync + 'static>(
    scheduler: &Scheduler,
    controller: &Arc<TaskController>,
    cell: &Arc<PromiseCell<U>>,
    job: impl FnOnce() -> PromiseOutcome<U> + Send + 'static,
) {
    let run_cell = Arc::clone(cell);
    let run: Box<dyn FnOnce() + Send> = Box::new(move || {
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(job))
            .unwrap_or_else(|payload| Err(TaskError::Panicked(PanicPayload::from_panic(payload))));
        settle_cell(&run_cell, outcome);
    });
    let reject_cell = Arc::clone(cell);
    let reject: Box<dyn FnOnce(TaskError) + Send> = Box::new(move |error| {
        settle_cell(&reject_cell, Err(error));
    });
    scheduler.submit(
        TaskKind::Fresh,
        SubmitOptions::new().with_signal(ScheduleSignal::Task(controller.signal())),
        run,
        reject,
    );
}

/// The resolve/reject pair handed to a promise executor.
///
/// The first call wins; both route the settlement through the scheduler.
pub struct PromiseResolvers<T> {
    scheduler: Scheduler,
    controller: Arc<TaskController>,
    cell: Arc<PromiseCell<T>>,
    used: Arc<AtomicBool>,
}

impl<T> Clone for PromiseResolvers<T> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            controller: Arc::clone(&self.controller),
            cell: Arc::clone(&self.cell),
            used: Arc::clone(&self.used),
        }
    }
}

impl<T> fmt::Debug for PromiseResolvers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseResolvers")
            .field("used", &self.used.load(Ordering::SeqCst))
            .finish()
    }
}

impl<T: Send + Sync + 'static> PromiseResolvers<T> {
    /// Fulfils the promise with `value`.
    pub fn resolve(&self, value: T) {
        self.settle(Ok(value));
    }

    /// Rejects the promise with `error`.
    pub fn reject(&self, error: TaskError) {
        self.settle(Err(error));
    }

    fn settle(&self, outcome: PromiseOutcome<T>) {
        if self.used.swap(true, Ordering::SeqCst) {
            return;
        }
        submit_settlement(&self.scheduler, &self.controller, &self.cell, move || {
            outcome
        });
    }
}

/// A promise whose settlement and continuations dispatch through the
/// scheduler at its controller's current priority.
pub struct ScheduledPromise<T> {
    scheduler: Scheduler,
    controller: Arc<TaskController>,
    cell: Arc<PromiseCell<T>>,
}

impl<T> Clone for ScheduledPromise<T> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            controller: Arc::clone(&self.controller),
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for ScheduledPromise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledPromise")
            .field("settled", &self.is_settled())
            .field("priority", &self.controller.signal().priority())
            .finish()
    }
}

impl<T: Send + Sync + 'static> ScheduledPromise<T> {
    /// Creates a promise with a fresh controller at the process-wide default
    /// priority and runs `executor` with its resolvers.
    pub fn new(scheduler: &Scheduler, executor: impl FnOnce(PromiseResolvers<T>)) -> Self {
        let controller = Arc::new(TaskController::with_priority(default_options().priority));
        Self::with_controller(scheduler, controller, executor)
    }

    /// Creates a promise whose fresh controller starts at `priority`.
    pub fn with_priority(
        scheduler: &Scheduler,
        priority: Priority,
        executor: impl FnOnce(PromiseResolvers<T>),
    ) -> Self {
        Self::with_controller(
            scheduler,
            Arc::new(TaskController::with_priority(priority)),
            executor,
        )
    }

    /// Creates a promise owned by an existing controller.
    pub fn with_controller(
        scheduler: &Scheduler,
        controller: Arc<TaskController>,
        executor: impl FnOnce(PromiseResolvers<T>),
    ) -> Self {
        let (promise, resolvers) = Self::make(scheduler, controller);
        executor(resolvers);
        promise
    }

    /// Creates an unsettled promise and its resolvers.
    pub fn with_resolvers(scheduler: &Scheduler) -> (Self, PromiseResolvers<T>) {
        let controller = Arc::new(TaskController::with_priority(default_options().priority));
        Self::make(scheduler, controller)
    }

    fn make(
        scheduler: &Scheduler,
        controller: Arc<TaskController>,
    ) -> (Self, PromiseResolvers<T>) {
        let promise = Self {
            scheduler: scheduler.clone(),
            controller,
            cell: Arc::new(PromiseCell::new()),
        };
        let resolvers = PromiseResolvers {
            scheduler: promise.scheduler.clone(),
            controller: Arc::clone(&promise.controller),
            cell: Arc::clone(&promise.cell),
            used: Arc::new(AtomicBool::new(false)),
        };
        (promise, resolvers)
    }

    /// A promise already resolved with `value` (settlement still dispatches
    /// through the scheduler).
    pub fn resolved(scheduler: &Scheduler, value: T) -> Self {
        Self::new(scheduler, |resolvers| resolvers.resolve(value))
    }

    /// A promise already rejected with `error`.
    pub fn rejected(scheduler: &Scheduler, error: TaskError) -> Self {
        Self::new(scheduler, |resolvers| resolvers.reject(error))
    }

    /// Runs `f` synchronously and settles with its return value or panic.
    pub fn try_with(scheduler: &Scheduler, f: impl FnOnce() -> T) -> Self {
        Self::new(scheduler, |resolvers| {
            match std::panic::catch_unwind(AssertUnwindSafe(f)) {
                Ok(value) => resolvers.resolve(value),
                Err(payload) => {
                    resolvers.reject(TaskError::Panicked(PanicPayload::from_panic(payload)));
                }
            }
        })
    }

    /// The controller shared by this promise and its whole chain.
    #[must_use]
    pub fn controller(&self) -> &Arc<TaskController> {
        &self.controller
    }

    /// Returns true once the settlement task has dispatched.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(&*self.cell.state.lock(), CellState::Settled(_))
    }

    /// Registers a raw settlement observer (internal; runs inside the
    /// settlement task).
    fn observe(&self, reaction: Reaction<T>) {
        let outcome = {
            let mut state = self.cell.state.lock();
            match &mut *state {
                CellState::Pending { reactions, .. } => {
                    reactions.push(reaction);
                    return;
                }
                CellState::Settled(outcome) => Arc::clone(outcome),
            }
        };
        reaction(&outcome);
    }
}

impl<T: Clone + Send + Sync + 'static> ScheduledPromise<T> {
    /// Returns the outcome once settled.
    #[must_use]
    pub fn try_outcome(&self) -> Option<PromiseOutcome<T>> {
        match &*self.cell.state.lock() {
            CellState::Settled(outcome) => Some((**outcome).clone()),
            CellState::Pending { .. } => None,
        }
    }

    /// Chains a fulfilment continuation sharing this promise's controller.
    ///
    /// The continuation runs as a scheduler task at the controller's
    /// priority; rejections pass through untouched.
    pub fn then<U: Send + Sync + 'static>(
        &self,
        f: impl FnOnce(T) -> U + Send + 'static,
    ) -> ScheduledPromise<U> {
        let child = ScheduledPromise {
            scheduler: self.scheduler.clone(),
            controller: Arc::clone(&self.controller),
            cell: Arc::new(PromiseCell::new()),
        };
        let scheduler = self.scheduler.clone();
        let controller = Arc::clone(&self.controller);
        let child_cell = Arc::clone(&child.cell);
        self.observe(Box::new(move |outcome| match outcome {
            Ok(value) => {
                let value = value.clone();
                submit_settlement(&scheduler, &controller, &child_cell, move || Ok(f(value)));
            }
            Err(error) => {
                let error = error.clone();
                submit_settlement(&scheduler, &controller, &child_cell, move || Err(error));
            }
        }));
        child
    }

    /// Chains a rejection handler sharing this promise's controller.
    ///
    /// Fulfilments pass through; a rejection is mapped back to a value by
    /// `f`.
    pub fn catch(&self, f: impl FnOnce(TaskError) -> T + Send + 'static) -> ScheduledPromise<T> {
        let child = ScheduledPromise {
            scheduler: self.scheduler.clone(),
            controller: Arc::clone(&self.controller),
            cell: Arc::new(PromiseCell::new()),
        };
        let scheduler = self.scheduler.clone();
        let controller = Arc::clone(&self.controller);
        let child_cell = Arc::clone(&child.cell);
        self.observe(Box::new(move |outcome| {
            let outcome = outcome.clone();
            submit_settlement(&scheduler, &controller, &child_cell, move || match outcome {
                Ok(value) => Ok(value),
                Err(error) => Ok(f(error)),
            });
        }));
        child
    }

    /// Chains a cleanup continuation that observes nothing and passes the
    /// outcome through unchanged.
    pub fn finally(&self, f: impl FnOnce() + Send + 'static) -> ScheduledPromise<T> {
        let child = ScheduledPromise {
            scheduler: self.scheduler.clone(),
            controller: Arc::clone(&self.controller),
            cell: Arc::new(PromiseCell::new()),
        };
        let scheduler = self.scheduler.clone();
        let controller = Arc::clone(&self.controller);
        let child_cell = Arc::clone(&child.cell);
        self.observe(Box::new(move |outcome| {
            let outcome = outcome.clone();
            submit_settlement(&scheduler, &controller, &child_cell, move || {
                f();
                outcome
            });
        }));
        child
    }

    /// Fulfils with every value once all inputs fulfil; rejects with the
    /// first rejection.
    pub fn all(scheduler: &Scheduler, promises: Vec<Self>) -> ScheduledPromise<Vec<T>> {
        let (combined, resolvers) = ScheduledPromise::with_resolvers(scheduler);
        let total = promises.len();
        if total == 0 {
            resolvers.resolve(Vec::new());
            return combined;
        }
        let results: Arc<Mutex<Vec<Option<T>>>> =
            Arc::new(Mutex::new((0..total).map(|_| None).collect()));
        let remaining = Arc::new(AtomicUsize::new(total));
        for (index, promise) in promises.iter().enumerate() {
            let results = Arc::clone(&results);
            let remaining = Arc::clone(&remaining);
            let resolvers = resolvers.clone();
            promise.observe(Box::new(move |outcome| match outcome {
                Ok(value) => {
                    results.lock()[index] = Some(value.clone());
                    if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                        let values = results
                            .lock()
                            .iter_mut()
                            .map(|slot| slot.take().expect("every input fulfilled"))
                            .collect();
                        resolvers.resolve(values);
                    }
                }
                Err(error) => resolvers.reject(error.clone()),
            }));
        }
        combined
    }

    /// Fulfils with every input's outcome once all inputs settle.
    pub fn all_settled(
        scheduler: &Scheduler,
        promises: Vec<Self>,
    ) -> ScheduledPromise<Vec<PromiseOutcome<T>>> {
        let (combined, resolvers) = ScheduledPromise::with_resolvers(scheduler);
        let total = promises.len();
        if total == 0 {
            resolvers.resolve(Vec::new());
            return combined;
        }
        let outcomes: Arc<Mutex<Vec<Option<PromiseOutcome<T>>>>> =
            Arc::new(Mutex::new((0..total).map(|_| None).collect()));
        let remaining = Arc::new(AtomicUsize::new(total));
        for (index, promise) in promises.iter().enumerate() {
            let outcomes = Arc::clone(&outcomes);
            let remaining = Arc::clone(&remaining);
            let resolvers = resolvers.clone();
            promise.observe(Box::new(move |outcome| {
                outcomes.lock()[index] = Some(outcome.clone());
                if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                    let settled = outcomes
                        .lock()
                        .iter_mut()
                        .map(|slot| slot.take().expect("every input settled"))
                        .collect();
                    resolvers.resolve(settled);
                }
            }));
        }
        combined
    }

    /// Fulfils with the first fulfilment; rejects with the aggregate of all
    /// rejections if every input rejects.
    pub fn any(scheduler: &Scheduler, promises: Vec<Self>) -> Self {
        let (combined, resolvers) = ScheduledPromise::with_resolvers(scheduler);
        let total = promises.len();
        if total == 0 {
            resolvers.reject(TaskError::Aggregate(Arc::from(Vec::<TaskError>::new())));
            return combined;
        }
        let errors: Arc<Mutex<Vec<Option<TaskError>>>> =
            Arc::new(Mutex::new((0..total).map(|_| None).collect()));
        let remaining = Arc::new(AtomicUsize::new(total));
        for (index, promise) in promises.iter().enumerate() {
            let errors = Arc::clone(&errors);
            let remaining = Arc::clone(&remaining);
            let resolvers = resolvers.clone();
            promise.observe(Box::new(move |outcome| match outcome {
                Ok(value) => resolvers.resolve(value.clone()),
                Err(error) => {
                    errors.lock()[index] = Some(error.clone());
                    if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                        let all: Vec<TaskError> = errors
                            .lock()
                            .iter_mut()
                            .map(|slot| slot.take().expect("every input rejected"))
                            .collect();
                        resolvers.reject(TaskError::Aggregate(Arc::from(all)));
                    }
                }
            }));
        }
        combined
    }

    /// Settles with the first input to settle, fulfilment or rejection.
    pub fn race(scheduler: &Scheduler, promises: Vec<Self>) -> Self {
        let (combined, resolvers) = ScheduledPromise::with_resolvers(scheduler);
        for promise in &promises {
            let resolvers = resolvers.clone();
            promise.observe(Box::new(move |outcome| match outcome {
                Ok(value) => resolvers.resolve(value.clone()),
                Err(error) => resolvers.reject(error.clone()),
            }));
        }
        combined
    }
}

impl<T: Clone + Send + 'static> Future for ScheduledPromise<T> {
    type Output = PromiseOutcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.cell.state.lock();
        match &mut *state {
            CellState::Settled(outcome) => Poll::Ready((**outcome).clone()),
            CellState::Pending { wakers, .. } => {
                wakers.push(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
