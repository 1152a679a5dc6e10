//! Scheduler and driver configuration, optionally loaded from TOML.
//!
//! A file looks like:
//!
//! ```toml
//! [scheduler]
//! workers = 3
//! poll_interval_us = 500
//!
//! [driver]
//! max_cycles = 100
//! halt_on_failure = true
//! ```
//!
//! Every key is optional; missing keys take the defaults of
//! [`SchedulerConfig`] and [`DriverOptions`].

use serde::Deserialize;
use std::{fs, num::NonZeroUsize, path::Path, time::Duration};
use thiserror::Error;

/// Worker count used when nothing else is configured.
pub const DEFAULT_WORKERS: NonZeroUsize = NonZeroUsize::new(3).expect("non-zero literal");
/// How long an idle worker waits on its own queue before trying to steal.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(500);

/// Error produced while loading or validating configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A scheduler needs at least one worker.
    #[error("worker count must be at least 1")]
    ZeroWorkers,
    /// A zero poll interval would turn idle workers into a busy loop.
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,
    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration file is not valid TOML for this schema.
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Sizing and timing of a [`Scheduler`](crate::scheduler::Scheduler).
///
/// Fixed for the scheduler's lifetime: one ready queue and one worker thread
/// are created per worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of worker threads and ready queues.
    pub workers: NonZeroUsize,
    /// Idle-poll timeout. Bounds both how quickly an idle worker turns to
    /// stealing and how quickly every loop notices a cleared run flag.
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl SchedulerConfig {
    /// Build a config, rejecting zero values.
    ///
    /// # Errors
    /// If `workers` or `poll_interval` is zero.
    pub fn new(workers: usize, poll_interval: Duration) -> Result<Self, ConfigError> {
        let workers = NonZeroUsize::new(workers).ok_or(ConfigError::ZeroWorkers)?;
        if poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(Self {
            workers,
            poll_interval,
        })
    }
}

/// Behaviour of the [`CycleDriver`](crate::driver::CycleDriver).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriverOptions {
    /// Stop after this many cycles. `None` runs until the run flag clears.
    pub max_cycles: Option<u64>,
    /// Stop after the first cycle in which a task failed.
    pub halt_on_failure: bool,
}

/// Validated contents of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfigFile {
    /// `[scheduler]` table.
    pub scheduler: SchedulerConfig,
    /// `[driver]` table.
    pub driver: DriverOptions,
}

/// File layout as deserialized, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    /// `[scheduler]` table.
    #[serde(default)]
    pub scheduler: RawSchedulerConfig,
    /// `[driver]` table.
    #[serde(default)]
    pub driver: RawDriverOptions,
}

/// `[scheduler]` table as deserialized.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSchedulerConfig {
    /// Number of workers.
    pub workers: Option<usize>,
    /// Idle-poll timeout in microseconds.
    pub poll_interval_us: Option<u64>,
}

/// `[driver]` table as deserialized.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawDriverOptions {
    /// Cycle limit.
    pub max_cycles: Option<u64>,
    /// Whether a failed cycle stops the driver.
    #[serde(default)]
    pub halt_on_failure: bool,
}

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ConfigError;

    fn try_from(raw: RawConfigFile) -> Result<Self, Self::Error> {
        let RawConfigFile { scheduler, driver } = raw;
        let scheduler = SchedulerConfig::new(
            scheduler.workers.unwrap_or(DEFAULT_WORKERS.get()),
            scheduler
                .poll_interval_us
                .map_or(DEFAULT_POLL_INTERVAL, Duration::from_micros),
        )?;
        Ok(Self {
            scheduler,
            driver: DriverOptions {
                max_cycles: driver.max_cycles,
                halt_on_failure: driver.halt_on_failure,
            },
        })
    }
}

impl ConfigFile {
    /// Parse and validate TOML text.
    ///
    /// # Errors
    /// On malformed TOML, unknown keys or invalid values.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfigFile = toml::from_str(contents)?;
        Self::try_from(raw)
    }

    /// Read, parse and validate a TOML file.
    ///
    /// # Errors
    /// If the file cannot be read, or see [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = ConfigFile::from_toml_str("").unwrap();
        assert_eq!(cfg, ConfigFile::default());
        assert_eq!(cfg.scheduler.workers.get(), 3);
        assert_eq!(cfg.scheduler.poll_interval, Duration::from_micros(500));
    }

    #[test]
    fn full_file_is_parsed() {
        let cfg = ConfigFile::from_toml_str(
            r"
            [scheduler]
            workers = 8
            poll_interval_us = 250

            [driver]
            max_cycles = 12
            halt_on_failure = true
            ",
        )
        .unwrap();
        assert_eq!(cfg.scheduler.workers.get(), 8);
        assert_eq!(cfg.scheduler.poll_interval, Duration::from_micros(250));
        assert_eq!(cfg.driver.max_cycles, Some(12));
        assert!(cfg.driver.halt_on_failure);
    }

    #[test]
    fn zero_values_are_rejected() {
        assert!(matches!(
            ConfigFile::from_toml_str("[scheduler]\nworkers = 0"),
            Err(ConfigError::ZeroWorkers)
        ));
        assert!(matches!(
            ConfigFile::from_toml_str("[scheduler]\npoll_interval_us = 0"),
            Err(ConfigError::ZeroPollInterval)
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            ConfigFile::from_toml_str("[scheduler]\nthreads = 4"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn load_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]\nworkers = 2").unwrap();
        let cfg = ConfigFile::load(file.path()).unwrap();
        assert_eq!(cfg.scheduler.workers.get(), 2);
        assert!(matches!(
            ConfigFile::load(file.path().with_extension("missing")),
            Err(ConfigError::Io(_))
        ));
    }
}
