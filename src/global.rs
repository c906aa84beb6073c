//! Process-wide scheduler installation.
//!
//! The installation analog of feature detection: [`install`] registers a
//! scheduler as the process global unless one is already present, in which
//! case the existing instance stays and `install` reports it. The free
//! functions route submissions to whichever scheduler won.

use crate::error::{Error, ErrorKind, Result};
use crate::sched::{Scheduler, SubmitOptions, TaskHandle};
use std::sync::OnceLock;

static GLOBAL: OnceLock<Scheduler> = OnceLock::new();

/// Installs `scheduler` as the process-wide instance.
///
/// Returns true if this call installed it, false if a scheduler was already
/// present (the existing one is kept).
pub fn install(scheduler: Scheduler) -> bool {
    GLOBAL.set(scheduler).is_ok()
}

/// Returns true if a process-wide scheduler is installed.
#[must_use]
pub fn is_installed() -> bool {
    GLOBAL.get().is_some()
}

/// Returns the process-wide scheduler, if installed.
#[must_use]
pub fn try_current() -> Option<Scheduler> {
    GLOBAL.get().cloned()
}

/// Returns the process-wide scheduler.
///
/// # Errors
///
/// Returns [`ErrorKind::NotInstalled`] if [`install`] has not run.
pub fn current() -> Result<Scheduler> {
    try_current().ok_or_else(|| Error::new(ErrorKind::NotInstalled))
}

/// Submits a fresh task to the process-wide scheduler.
///
/// # Errors
///
/// Returns [`ErrorKind::NotInstalled`] if no scheduler is installed.
pub fn post_task<T, F>(callback: F, options: SubmitOptions) -> Result<TaskHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(current()?.post_task(callback, options))
}

/// Submits a continuation to the process-wide scheduler.
///
/// # Errors
///
/// Returns [`ErrorKind::NotInstalled`] if no scheduler is installed.
pub fn yield_now() -> Result<TaskHandle<()>> {
    Ok(current()?.yield_now())
}
