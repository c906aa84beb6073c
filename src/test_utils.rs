//! Shared helpers for tests.

use std::sync::Once;

/// Initializes test logging exactly once per process.
///
/// Safe to call from every test; later calls are no-ops.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = crate::test_logging::global();
    });
}
