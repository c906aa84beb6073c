//! Test logging infrastructure.
//!
//! Tests log through a process-wide [`TestLogger`] so that a failing
//! assertion can dump everything that happened before it. The
//! [`test_phase!`](crate::test_phase), [`test_section!`](crate::test_section),
//! [`test_complete!`](crate::test_complete) and
//! [`assert_with_log!`](crate::assert_with_log) macros are the intended
//! entry points.

use std::fmt::Write as _;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

/// Logging verbosity level for tests.
///
/// Levels are ordered from least to most verbose:
/// `Error < Warn < Info < Debug < Trace`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TestLogLevel {
    /// Only errors and failures.
    Error,
    /// Warnings and above.
    Warn,
    /// General test progress.
    #[default]
    Info,
    /// Detailed scheduler operations.
    Debug,
    /// All events.
    Trace,
}

impl TestLogLevel {
    /// Returns the level from the `TEST_LOG_LEVEL` environment variable.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var("TEST_LOG_LEVEL")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }
}

impl std::str::FromStr for TestLogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

/// A captured test event.
#[derive(Debug, Clone)]
struct TestEvent {
    at: Instant,
    level: TestLogLevel,
    category: &'static str,
    message: String,
}

/// Captures test events and renders a report on demand.
#[derive(Debug)]
pub struct TestLogger {
    level: TestLogLevel,
    start: Instant,
    events: Mutex<Vec<TestEvent>>,
}

impl TestLogger {
    /// Creates a logger that keeps events at or below `level`.
    #[must_use]
    pub fn new(level: TestLogLevel) -> Self {
        Self {
            level,
            start: Instant::now(),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Records an event if its level is enabled.
    pub fn log(&self, level: TestLogLevel, category: &'static str, message: String) {
        if level > self.level {
            return;
        }
        self.events.lock().expect("lock poisoned").push(TestEvent {
            at: Instant::now(),
            level,
            category,
            message,
        });
    }

    /// Returns the number of captured events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.lock().expect("lock poisoned").len()
    }

    /// Clears all captured events.
    pub fn clear(&self) {
        self.events.lock().expect("lock poisoned").clear();
    }

    /// Renders all captured events with timestamps relative to logger start.
    #[must_use]
    pub fn report(&self) -> String {
        let events = self.events.lock().expect("lock poisoned");
        let mut out = String::new();
        let _ = writeln!(out, "=== test log ({} events) ===", events.len());
        for event in events.iter() {
            let elapsed = event.at.duration_since(self.start);
            let _ = writeln!(
                out,
                "[{:>10.3}ms] {:?} {}: {}",
                elapsed.as_secs_f64() * 1e3,
                event.level,
                event.category,
                event.message
            );
        }
        out
    }
}

/// Returns the process-wide test logger.
pub fn global() -> &'static TestLogger {
    static GLOBAL: OnceLock<TestLogger> = OnceLock::new();
    GLOBAL.get_or_init(|| TestLogger::new(TestLogLevel::from_env()))
}

/// Marks the start of a test phase.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        $crate::test_logging::global().log(
            $crate::test_logging::TestLogLevel::Info,
            "phase",
            format!("==> {}", $name),
        );
    };
}

/// Marks a section inside a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        $crate::test_logging::global().log(
            $crate::test_logging::TestLogLevel::Info,
            "section",
            format!("--> {}", $name),
        );
    };
}

/// Marks a test as complete.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        $crate::test_logging::global().log(
            $crate::test_logging::TestLogLevel::Info,
            "complete",
            format!("<== {}", $name),
        );
    };
}

/// Asserts a condition, dumping the test log with expected/actual on failure.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $label:expr, $expected:expr, $actual:expr) => {
        if !$cond {
            eprintln!("{}", $crate::test_logging::global().report());
            panic!(
                "assertion failed: {}\n expected: {:?}\n   actual: {:?}",
                $label, $expected, $actual
            );
        }
    };
}
