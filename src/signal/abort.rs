//! Base cancellation controller and signal.

use crate::types::CancelReason;
use core::fmt;
use parking_lot::Mutex;
use std::sync::Arc;

/// Identifier of a registered abort listener, for detaching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AbortListenerId(u64);

type AbortListener = Box<dyn FnOnce(&CancelReason) + Send>;

struct AbortState {
    reason: Option<CancelReason>,
    listeners: Vec<(AbortListenerId, AbortListener)>,
    next_listener: u64,
}

pub(crate) struct AbortCore {
    state: Mutex<AbortState>,
}

/// The observing half of an [`AbortController`].
///
/// Signals are cheap handles; clones observe the same abort state.
#[derive(Clone)]
pub struct AbortSignal {
    core: Arc<AbortCore>,
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.aborted())
            .finish()
    }
}

impl AbortSignal {
    /// Returns true once the controller has aborted.
    #[must_use]
    pub fn aborted(&self) -> bool {
        self.core.state.lock().reason.is_some()
    }

    /// Returns the abort reason, if the controller has aborted.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        self.core.state.lock().reason.clone()
    }

    /// Registers a single-shot listener fired on abort.
    ///
    /// If the signal is already aborted the listener runs immediately, on
    /// the calling thread, and the returned id is inert.
    pub fn add_listener(
        &self,
        listener: impl FnOnce(&CancelReason) + Send + 'static,
    ) -> AbortListenerId {
        let reason = {
            let mut state = self.core.state.lock();
            match &state.reason {
                Some(reason) => reason.clone(),
                None => {
                    let id = AbortListenerId(state.next_listener);
                    state.next_listener += 1;
                    state.listeners.push((id, Box::new(listener)));
                    return id;
                }
            }
        };
        listener(&reason);
        AbortListenerId(u64::MAX)
    }

    /// Detaches a listener registered with [`add_listener`](Self::add_listener).
    ///
    /// Returns true if the listener was still attached.
    pub fn remove_listener(&self, id: AbortListenerId) -> bool {
        let mut state = self.core.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(listener_id, _)| *listener_id != id);
        state.listeners.len() != before
    }

    pub(crate) fn from_core(core: Arc<AbortCore>) -> Self {
        Self { core }
    }

    pub(crate) fn core(&self) -> &Arc<AbortCore> {
        &self.core
    }
}

/// Controller that aborts its signal at most once.
pub struct AbortController {
    core: Arc<AbortCore>,
}

impl fmt::Debug for AbortController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortController")
            .field("aborted", &self.signal().aborted())
            .finish()
    }
}

impl AbortController {
    /// Creates a controller with a fresh, unaborted signal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: Arc::new(AbortCore {
                state: Mutex::new(AbortState {
                    reason: None,
                    listeners: Vec::new(),
                    next_listener: 0,
                }),
            }),
        }
    }

    /// Returns a handle to the controller's signal.
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            core: Arc::clone(&self.core),
        }
    }

    /// Aborts the signal with `reason`; later calls are no-ops.
    ///
    /// Listeners fire in registration order, outside the signal lock, on the
    /// calling thread.
    pub fn abort(&self, reason: CancelReason) {
        let listeners = {
            let mut state = self.core.state.lock();
            if state.reason.is_some() {
                return;
            }
            state.reason = Some(reason.clone());
            std::mem::take(&mut state.listeners)
        };
        for (_, listener) in listeners {
            listener(&reason);
        }
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}
