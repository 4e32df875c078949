//! Runtime configuration
//!
//! Every knob has a serde default, so a YAML file only needs the fields it
//! changes.
//!
//! Author: Moroya Sakamoto

use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scheduler::MAX_TASKS;
use crate::timer::SysTimer;

/// File looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "alice-handoff.yml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Number of burst workers
    #[serde(default = "default_task_count")]
    pub task_count: u32,

    /// Variant offset added to the per-task iteration count
    #[serde(default = "default_variant_index")]
    pub variant_index: u32,

    /// Status lines buffered before a flush
    #[serde(default = "default_burst")]
    pub burst: usize,

    /// Delay of worker 0 between iterations, in ticks
    #[serde(default = "default_base_delay")]
    pub base_delay: u64,

    /// Extra delay per worker index, in ticks
    #[serde(default = "default_step")]
    pub step: u64,

    /// Checksum seed of worker 0
    #[serde(default = "default_seed_base")]
    pub seed_base: u32,

    /// Handoff queue slots
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Bytes per queue item
    #[serde(default = "default_item_size")]
    pub item_size: usize,

    /// Producer send timeout, in ticks
    #[serde(default = "default_send_timeout")]
    pub send_timeout: u64,

    /// Consumer receive timeout, in ticks
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout: u64,

    /// Producer pause after each send, in ticks
    #[serde(default = "default_producer_period")]
    pub producer_period: u64,

    /// Consumer pause after each receive attempt, in ticks
    #[serde(default = "default_consumer_period")]
    pub consumer_period: u64,

    /// Length of one tick in microseconds
    #[serde(default = "default_tick_us")]
    pub tick_us: u64,

    /// Stack size hint for spawned tasks, in bytes
    #[serde(default = "default_stack_size")]
    pub stack_size: usize,

    /// Stop the producer after this many messages (runs forever if unset)
    #[serde(default)]
    pub message_limit: Option<u32>,

    /// Stop the consumer after this many consecutive receive timeouts
    #[serde(default)]
    pub consumer_idle_limit: Option<u32>,
}

fn default_task_count() -> u32 {
    4
}

fn default_variant_index() -> u32 {
    4
}

fn default_burst() -> usize {
    4
}

fn default_base_delay() -> u64 {
    130
}

fn default_step() -> u64 {
    7
}

fn default_seed_base() -> u32 {
    0xAA
}

fn default_queue_capacity() -> usize {
    5
}

fn default_item_size() -> usize {
    16
}

fn default_send_timeout() -> u64 {
    100
}

fn default_receive_timeout() -> u64 {
    1000
}

fn default_producer_period() -> u64 {
    200
}

fn default_consumer_period() -> u64 {
    150
}

fn default_tick_us() -> u64 {
    1000
}

fn default_stack_size() -> usize {
    256 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            task_count: default_task_count(),
            variant_index: default_variant_index(),
            burst: default_burst(),
            base_delay: default_base_delay(),
            step: default_step(),
            seed_base: default_seed_base(),
            queue_capacity: default_queue_capacity(),
            item_size: default_item_size(),
            send_timeout: default_send_timeout(),
            receive_timeout: default_receive_timeout(),
            producer_period: default_producer_period(),
            consumer_period: default_consumer_period(),
            tick_us: default_tick_us(),
            stack_size: default_stack_size(),
            message_limit: None,
            consumer_idle_limit: None,
        }
    }
}

impl Config {
    /// Load config from file, or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            return Self::from_file(config_path);
        }

        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::from_file(&local);
        }

        debug!("Config::load: no config file, using defaults");
        Ok(Config::default())
    }

    /// Parse and validate a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Config::from_file: path={}", path.display());
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no task could run with
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.task_count == 0, "task_count must be at least 1"),
            (self.burst == 0, "burst must be at least 1"),
            (self.queue_capacity == 0, "queue_capacity must be at least 1"),
            (self.item_size == 0, "item_size must be at least 1"),
            (self.tick_us == 0, "tick_us must be at least 1"),
        ];
        if let Some((_, msg)) = checks.iter().find(|(bad, _)| *bad) {
            return Err(Error::InvalidConfig(msg.to_string()));
        }
        if self.task_count as usize > MAX_TASKS {
            return Err(Error::InvalidConfig(format!(
                "task_count {} exceeds the task table ({} tasks)",
                self.task_count, MAX_TASKS
            )));
        }
        if self.checked_iterations().is_none() {
            return Err(Error::InvalidConfig(format!(
                "variant_index {} overflows the iteration count",
                self.variant_index
            )));
        }
        Ok(())
    }

    /// Iterations each burst worker runs
    ///
    /// Saturates at `u32::MAX`; `validate` rejects configs that would.
    pub fn iterations(&self) -> u32 {
        self.checked_iterations().unwrap_or(u32::MAX)
    }

    fn checked_iterations(&self) -> Option<u32> {
        self.task_count.checked_mul(10)?.checked_add(self.variant_index)
    }

    /// Tick source at the configured rate
    pub fn timer(&self) -> SysTimer {
        SysTimer::from_micros(self.tick_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.task_count, 4);
        assert_eq!(config.burst, 4);
        assert_eq!(config.queue_capacity, 5);
        assert_eq!(config.item_size, 16);
        assert_eq!(config.send_timeout, 100);
        assert_eq!(config.receive_timeout, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_iterations() {
        assert_eq!(Config::default().iterations(), 44);
        let config = Config {
            task_count: 2,
            variant_index: 1,
            ..Default::default()
        };
        assert_eq!(config.iterations(), 21);
    }

    #[test]
    fn test_task_count_bounded_by_task_table() {
        let at_limit = Config {
            task_count: MAX_TASKS as u32,
            ..Default::default()
        };
        assert!(at_limit.validate().is_ok());

        let huge = Config {
            task_count: 500_000_000,
            ..Default::default()
        };
        assert!(matches!(huge.validate(), Err(Error::InvalidConfig(_))));
        assert_eq!(huge.iterations(), u32::MAX);
    }

    #[test]
    fn test_variant_index_overflow_rejected() {
        let config = Config {
            variant_index: u32::MAX,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        assert_eq!(config.iterations(), u32::MAX);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "burst: 8\nsend_timeout: 0\nmessage_limit: 10").unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.burst, 8);
        assert_eq!(config.send_timeout, 0);
        assert_eq!(config.message_limit, Some(10));
        assert_eq!(config.queue_capacity, 5);
    }

    #[test]
    fn test_invalid_yaml_values_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "queue_capacity: 0").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let missing = PathBuf::from("/nonexistent/alice-handoff.yml");
        assert!(matches!(Config::load(Some(&missing)), Err(Error::Io(_))));
    }

    #[test]
    fn test_timer_uses_tick_rate() {
        let config = Config {
            tick_us: 250,
            ..Default::default()
        };
        assert_eq!(config.timer().tick(), std::time::Duration::from_micros(250));
    }
}
