//! Task loop and coroutine configuration
//!
//! All types deserialize from TOML with every field optional:
//!
//! ```toml
//! [scheduler]
//! name = "main"
//! queue_depth = 20
//! burst_limit = 10
//!
//! [coroutines]
//! step_budget_ms = 10
//!
//! [tasks.sensors]
//! queue_depth = 40
//! max_wait_ms = 1000
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RivuletError, RivuletResult};

/// Configuration of one task event loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Task name, also used as the thread name by `spawn_task`
    pub name: String,
    /// Capacity of the notification queue
    pub queue_depth: usize,
    /// Queue items dispatched per wait cycle before timers are re-checked
    pub burst_limit: usize,
    /// Look-ahead horizon; the loop never blocks longer than this
    pub max_wait_ms: u64,
    /// Dispatches slower than this are reported as timing violations
    pub iteration_budget_ms: u64,
    /// Bounded wait for `AsyncFlow` locks created through the scheduler
    pub lock_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl SchedulerConfig {
    /// Standard configuration for most tasks
    pub fn standard() -> Self {
        Self {
            name: "main".to_string(),
            queue_depth: 20,
            burst_limit: 10,
            max_wait_ms: 5000,
            iteration_budget_ms: 10,
            lock_timeout_ms: 10,
        }
    }

    /// Short bursts and short waits for control loops that must service
    /// timers promptly
    pub fn low_latency() -> Self {
        Self {
            name: "control".to_string(),
            queue_depth: 32,
            burst_limit: 4,
            max_wait_ms: 100,
            iteration_budget_ms: 2,
            lock_timeout_ms: 1,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn with_burst_limit(mut self, limit: usize) -> Self {
        self.burst_limit = limit;
        self
    }

    pub fn with_max_wait_ms(mut self, ms: u64) -> Self {
        self.max_wait_ms = ms;
        self
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Reject settings the loop cannot run with
    pub fn validate(&self) -> RivuletResult<()> {
        if self.queue_depth == 0 {
            return Err(RivuletError::invalid_capacity(
                format!("notification queue of '{}'", self.name),
                0,
            ));
        }
        if self.burst_limit == 0 {
            return Err(RivuletError::config(format!(
                "Scheduler '{}': burst_limit must be at least 1",
                self.name
            )));
        }
        if self.max_wait_ms == 0 {
            return Err(RivuletError::config(format!(
                "Scheduler '{}': max_wait_ms must be at least 1",
                self.name
            )));
        }
        Ok(())
    }

    pub fn from_toml_str(text: &str) -> RivuletResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> RivuletResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        log::info!("Loaded scheduler configuration from {}", path.display());
        Self::from_toml_str(&text)
    }
}

/// Configuration of a coroutine registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoroutineConfig {
    /// A single coroutine step slower than this is a timing violation
    pub step_budget_ms: u64,
}

impl Default for CoroutineConfig {
    fn default() -> Self {
        Self { step_budget_ms: 10 }
    }
}

/// Whole-program runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Main task loop
    pub scheduler: SchedulerConfig,
    pub coroutines: CoroutineConfig,
    /// Per-task overrides keyed by task name
    pub tasks: HashMap<String, SchedulerConfig>,
}

impl RuntimeConfig {
    pub fn from_toml_str(text: &str) -> RivuletResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> RivuletResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        log::info!("Loaded runtime configuration from {}", path.display());
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> RivuletResult<()> {
        self.scheduler.validate()?;
        for (name, task) in &self.tasks {
            task.validate()
                .map_err(|e| RivuletError::config(format!("task '{}': {}", name, e)))?;
        }
        Ok(())
    }

    /// Configuration for the named task
    ///
    /// Falls back to the main scheduler settings when the task has no
    /// section of its own. The result always carries `name`.
    pub fn task(&self, name: &str) -> SchedulerConfig {
        self.tasks
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.scheduler.clone())
            .with_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_standard() {
        let config = SchedulerConfig::default();
        assert_eq!(config.queue_depth, 20);
        assert_eq!(config.burst_limit, 10);
        assert_eq!(config.max_wait_ms, 5000);
        assert_eq!(config.iteration_budget_ms, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_low_latency_is_valid() {
        let config = SchedulerConfig::low_latency();
        assert!(config.validate().is_ok());
        assert!(config.burst_limit < SchedulerConfig::standard().burst_limit);
    }

    #[test]
    fn test_validate_rejects_zero_queue() {
        let err = SchedulerConfig::standard()
            .with_queue_depth(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, RivuletError::InvalidCapacity { capacity: 0, .. }));
    }

    #[test]
    fn test_validate_rejects_zero_burst() {
        let err = SchedulerConfig::standard()
            .with_burst_limit(0)
            .validate()
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = SchedulerConfig::from_toml_str("name = \"sensors\"\nburst_limit = 3").unwrap();
        assert_eq!(config.name, "sensors");
        assert_eq!(config.burst_limit, 3);
        assert_eq!(config.queue_depth, 20);
    }

    #[test]
    fn test_task_lookup_falls_back() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            [scheduler]
            max_wait_ms = 250

            [tasks.sensors]
            queue_depth = 40
            "#,
        )
        .unwrap();

        let sensors = config.task("sensors");
        assert_eq!(sensors.name, "sensors");
        assert_eq!(sensors.queue_depth, 40);

        let mqtt = config.task("mqtt");
        assert_eq!(mqtt.name, "mqtt");
        assert_eq!(mqtt.max_wait_ms, 250);
    }
}
