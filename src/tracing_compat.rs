//! Compatibility shim over the `tracing` crate.
//!
//! Library code logs through `crate::tracing_compat::{trace, debug, warn,
//! error}`. With the `tracing-integration` feature enabled these forward to
//! the real `tracing` macros; without it they compile to nothing, keeping the
//! default build free of the dependency.

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, error, trace, warn};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    /// No-op stand-in for `tracing::trace!`.
    #[macro_export]
    macro_rules! __tasklane_trace {
        ($($arg:tt)*) => {{}};
    }
    /// No-op stand-in for `tracing::debug!`.
    #[macro_export]
    macro_rules! __tasklane_debug {
        ($($arg:tt)*) => {{}};
    }
    /// No-op stand-in for `tracing::warn!`.
    #[macro_export]
    macro_rules! __tasklane_warn {
        ($($arg:tt)*) => {{}};
    }
    /// No-op stand-in for `tracing::error!`.
    #[macro_export]
    macro_rules! __tasklane_error {
        ($($arg:tt)*) => {{}};
    }
}

#[cfg(not(feature = "tracing-integration"))]
pub use crate::{
    __tasklane_debug as debug, __tasklane_error as error, __tasklane_trace as trace,
    __tasklane_warn as warn,
};
