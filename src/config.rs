//! Scheduler configuration.
//!
//! Configuration is layered: defaults, then environment overrides under the
//! `TASKLANE_` prefix, then explicit builder calls. Parsing is intentionally
//! minimal and deterministic.

use crate::error::{Error, ErrorKind, Result};
use crate::types::Priority;

/// Configuration for a [`Scheduler`](crate::sched::Scheduler).
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Priority used when neither the options nor the signal state one.
    pub default_priority: Priority,
    /// Initial capacity of the task record arena.
    pub task_capacity: usize,
    /// Whether background wakeups may use the host's idle-time primitive.
    ///
    /// When false, background work is armed through the port primitive like
    /// everything else.
    pub use_idle_callback: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_priority: Priority::UserVisible,
            task_capacity: 64,
            use_idle_callback: true,
        }
    }
}

impl SchedulerConfig {
    /// Returns a builder seeded with the defaults.
    #[must_use]
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder {
            config: Self::default(),
        }
    }

    /// Returns the defaults with environment overrides applied.
    ///
    /// Recognized variables:
    ///
    /// - `TASKLANE_DEFAULT_PRIORITY`: one of the three priority tags
    /// - `TASKLANE_TASK_CAPACITY`: initial arena capacity
    /// - `TASKLANE_USE_IDLE_CALLBACK`: `0`/`false` to disable
    ///
    /// # Errors
    ///
    /// Returns an error if a set variable fails to parse.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(tag) = std::env::var("TASKLANE_DEFAULT_PRIORITY") {
            config.default_priority = Priority::parse(&tag)?;
        }
        if let Ok(raw) = std::env::var("TASKLANE_TASK_CAPACITY") {
            config.task_capacity = raw.parse().map_err(|_| {
                Error::with_message(
                    ErrorKind::InvalidOptions,
                    format!("TASKLANE_TASK_CAPACITY is not a count: {raw:?}"),
                )
            })?;
        }
        if let Ok(raw) = std::env::var("TASKLANE_USE_IDLE_CALLBACK") {
            config.use_idle_callback = !matches!(raw.as_str(), "0" | "false" | "off");
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for basic sanity.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidOptions`] for an unusable configuration.
    pub fn validate(&self) -> Result<()> {
        if self.task_capacity == 0 {
            return Err(Error::with_message(
                ErrorKind::InvalidOptions,
                "task_capacity must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Builder for [`SchedulerConfig`].
#[derive(Debug)]
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    /// Sets the fallback priority for submissions that state none.
    #[must_use]
    pub fn default_priority(mut self, priority: Priority) -> Self {
        self.config.default_priority = priority;
        self
    }

    /// Sets the initial task arena capacity.
    #[must_use]
    pub fn task_capacity(mut self, capacity: usize) -> Self {
        self.config.task_capacity = capacity;
        self
    }

    /// Enables or disables use of the idle-time primitive.
    #[must_use]
    pub fn use_idle_callback(mut self, enabled: bool) -> Self {
        self.config.use_idle_callback = enabled;
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidOptions`] for an unusable configuration.
    pub fn build(self) -> Result<SchedulerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
