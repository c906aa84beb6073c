//! Priority-carrying task controller and signal.
//!
//! A [`TaskController`] composes a base [`AbortController`] with a shared
//! priority cell. Its [`TaskSignal`] forwards the cancellation surface and
//! adds `priority()` plus the `prioritychange` event, whose payload records
//! the previous priority.
//!
//! `set_priority` is non-reentrant per controller: calling it from inside a
//! `prioritychange` listener fails with a disallowed-operation error instead
//! of recursing.

use crate::error::{Error, ErrorKind, Result};
use crate::signal::abort::{AbortController, AbortListenerId, AbortSignal};
use crate::types::{CancelReason, Priority};
use core::fmt;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::{Arc, Weak};

/// Identifier of a registered `prioritychange` listener, for detaching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PriorityListenerId(u64);

/// Payload of a `prioritychange` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityChange {
    /// The priority the signal had before the change.
    pub previous: Priority,
}

type PriorityListener = Arc<Mutex<dyn FnMut(&PriorityChange) + Send>>;

struct PriorityState {
    priority: Priority,
    /// True while `prioritychange` listeners are running.
    dispatching: bool,
    listeners: Vec<(PriorityListenerId, PriorityListener)>,
    next_listener: u64,
}

pub(crate) struct PriorityCore {
    state: Mutex<PriorityState>,
}

/// Stable identity of a task signal, usable as a registry key.
///
/// Two signal handles compare equal here iff they observe the same
/// controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalIdentity(usize);

/// Options accepted by [`TaskController::with_options`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskControllerOptions {
    /// Initial priority of the controller's signal.
    pub priority: Priority,
}

/// The observing half of a [`TaskController`].
///
/// Clones are cheap handles onto the same state.
#[derive(Clone)]
pub struct TaskSignal {
    abort: AbortSignal,
    core: Arc<PriorityCore>,
}

impl fmt::Debug for TaskSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSignal")
            .field("priority", &self.priority())
            .field("aborted", &self.aborted())
            .finish()
    }
}

impl TaskSignal {
    /// Returns the signal's current priority.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.core.state.lock().priority
    }

    /// Returns true once the controller has aborted.
    #[must_use]
    pub fn aborted(&self) -> bool {
        self.abort.aborted()
    }

    /// Returns the abort reason, if the controller has aborted.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        self.abort.reason()
    }

    /// The plain cancellation view of this signal.
    #[must_use]
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    /// Registers a single-shot abort listener. See
    /// [`AbortSignal::add_listener`].
    pub fn add_abort_listener(
        &self,
        listener: impl FnOnce(&CancelReason) + Send + 'static,
    ) -> AbortListenerId {
        self.abort.add_listener(listener)
    }

    /// Detaches an abort listener.
    pub fn remove_abort_listener(&self, id: AbortListenerId) -> bool {
        self.abort.remove_listener(id)
    }

    /// Registers a persistent `prioritychange` listener.
    pub fn on_priority_change(
        &self,
        listener: impl FnMut(&PriorityChange) + Send + 'static,
    ) -> PriorityListenerId {
        let mut state = self.core.state.lock();
        let id = PriorityListenerId(state.next_listener);
        state.next_listener += 1;
        state.listeners.push((id, Arc::new(Mutex::new(listener))));
        id
    }

    /// Detaches a `prioritychange` listener.
    ///
    /// Detaching from inside a dispatch affects the next dispatch, not the
    /// one in flight.
    pub fn remove_priority_listener(&self, id: PriorityListenerId) -> bool {
        let mut state = self.core.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(listener_id, _)| *listener_id != id);
        state.listeners.len() != before
    }

    /// Returns the registry key for this signal.
    #[must_use]
    pub fn identity(&self) -> SignalIdentity {
        SignalIdentity(Arc::as_ptr(&self.core) as usize)
    }

    /// Downgrades to a weak handle that does not keep the signal alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakTaskSignal {
        WeakTaskSignal {
            abort: Arc::downgrade(self.abort.core()),
            core: Arc::downgrade(&self.core),
        }
    }
}

/// Weak handle to a [`TaskSignal`].
#[derive(Clone)]
pub struct WeakTaskSignal {
    abort: Weak<crate::signal::abort::AbortCore>,
    core: Weak<PriorityCore>,
}

impl WeakTaskSignal {
    /// Upgrades back to a strong handle if the signal is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<TaskSignal> {
        let abort = self.abort.upgrade()?;
        let core = self.core.upgrade()?;
        Some(TaskSignal {
            abort: AbortSignal::from_core(abort),
            core,
        })
    }
}

impl fmt::Debug for WeakTaskSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakTaskSignal")
            .field("alive", &(self.core.strong_count() > 0))
            .finish()
    }
}

/// Controller owning a cancellation signal with a mutable priority.
pub struct TaskController {
    base: AbortController,
    core: Arc<PriorityCore>,
}

impl fmt::Debug for TaskController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskController")
            .field("priority", &self.signal().priority())
            .field("aborted", &self.signal().aborted())
            .finish()
    }
}

impl TaskController {
    /// Creates a controller at the default priority (`user-visible`).
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(TaskControllerOptions::default())
    }

    /// Creates a controller at `priority`.
    #[must_use]
    pub fn with_priority(priority: Priority) -> Self {
        Self::with_options(TaskControllerOptions { priority })
    }

    /// Creates a controller from options.
    #[must_use]
    pub fn with_options(options: TaskControllerOptions) -> Self {
        Self {
            base: AbortController::new(),
            core: Arc::new(PriorityCore {
                state: Mutex::new(PriorityState {
                    priority: options.priority,
                    dispatching: false,
                    listeners: Vec::new(),
                    next_listener: 0,
                }),
            }),
        }
    }

    /// Returns a handle to the controller's signal.
    #[must_use]
    pub fn signal(&self) -> TaskSignal {
        TaskSignal {
            abort: self.base.signal(),
            core: Arc::clone(&self.core),
        }
    }

    /// Changes the signal's priority, dispatching `prioritychange`.
    ///
    /// A call with the current priority dispatches nothing. Listeners run on
    /// the calling thread, outside the signal lock, in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ReentrantPriorityChange`] when called from
    /// within a `prioritychange` listener of this controller.
    pub fn set_priority(&self, priority: Priority) -> Result<()> {
        let (change, listeners) = {
            let mut state = self.core.state.lock();
            if state.dispatching {
                return Err(Error::new(ErrorKind::ReentrantPriorityChange));
            }
            if state.priority == priority {
                return Ok(());
            }
            let change = PriorityChange {
                previous: state.priority,
            };
            state.priority = priority;
            state.dispatching = true;
            let listeners: SmallVec<[PriorityListener; 4]> = state
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();
            (change, listeners)
        };

        // The dispatching flag stays set while listeners run; a guard clears
        // it even if a listener panics.
        struct DispatchGuard<'a>(&'a TaskController);
        impl Drop for DispatchGuard<'_> {
            fn drop(&mut self) {
                self.0.core.state.lock().dispatching = false;
            }
        }
        let _guard = DispatchGuard(self);

        for listener in listeners {
            (&mut *listener.lock())(&change);
        }
        Ok(())
    }

    /// Aborts the signal. Later calls are no-ops.
    pub fn abort(&self, reason: CancelReason) {
        self.base.abort(reason);
    }
}

impl Default for TaskController {
    fn default() -> Self {
        Self::new()
    }
}
