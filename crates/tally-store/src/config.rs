// ABOUTME: Configuration loading and validation for tally.
// ABOUTME: Reads TALLY_* environment variables with defaults for the data directory and background work.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is not a valid number: {value}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("TALLY_CHANNEL_CAPACITY must be greater than zero")]
    ZeroCapacity,
}

/// Store configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct TallyConfig {
    pub home: PathBuf,
    pub db_file: String,
    /// None disables the background purger.
    pub purge_interval: Option<Duration>,
    pub channel_capacity: usize,
}

impl TallyConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - TALLY_HOME: data directory (default: ~/.tally)
    /// - TALLY_DB_FILE: database file name inside the data directory (default: tally.db)
    /// - TALLY_PURGE_INTERVAL_SECS: seconds between log purges, 0 disables (default: 3600)
    /// - TALLY_CHANNEL_CAPACITY: engine mailbox and change feed capacity (default: 256)
    pub fn from_env() -> Result<Self, ConfigError> {
        let home = std::env::var("TALLY_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/tmp"))
                    .join(".tally")
            });

        let db_file = std::env::var("TALLY_DB_FILE")
            .ok()
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| "tally.db".to_string());

        let purge_secs = parse_number("TALLY_PURGE_INTERVAL_SECS", 3600)?;
        let purge_interval = (purge_secs > 0).then(|| Duration::from_secs(purge_secs));

        let channel_capacity = parse_number("TALLY_CHANNEL_CAPACITY", 256)? as usize;
        if channel_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        Ok(Self {
            home,
            db_file,
            purge_interval,
            channel_capacity,
        })
    }

    /// Defaults rooted at `home`, for tests and embedding.
    pub fn with_home(home: PathBuf) -> Self {
        Self {
            home,
            db_file: "tally.db".to_string(),
            purge_interval: Some(Duration::from_secs(3600)),
            channel_capacity: 256,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.home.join(&self.db_file)
    }
}

fn parse_number(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment mutation is process-wide, so every case runs in one test.
    #[test]
    fn config_reads_environment() {
        // SAFETY: test-only code, the only test in this crate touching TALLY_* variables
        unsafe {
            std::env::remove_var("TALLY_HOME");
            std::env::remove_var("TALLY_DB_FILE");
            std::env::remove_var("TALLY_PURGE_INTERVAL_SECS");
            std::env::remove_var("TALLY_CHANNEL_CAPACITY");
        }

        let config = TallyConfig::from_env().unwrap();
        assert!(config.home.to_string_lossy().contains(".tally"));
        assert_eq!(config.db_file, "tally.db");
        assert_eq!(config.purge_interval, Some(Duration::from_secs(3600)));
        assert_eq!(config.channel_capacity, 256);

        // SAFETY: see above
        unsafe {
            std::env::set_var("TALLY_HOME", "/data/tally");
            std::env::set_var("TALLY_PURGE_INTERVAL_SECS", "0");
        }
        let config = TallyConfig::from_env().unwrap();
        assert_eq!(config.db_path(), PathBuf::from("/data/tally/tally.db"));
        assert!(config.purge_interval.is_none());

        // SAFETY: see above
        unsafe {
            std::env::set_var("TALLY_CHANNEL_CAPACITY", "lots");
        }
        let err = TallyConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("TALLY_CHANNEL_CAPACITY"), "{err}");

        // SAFETY: see above
        unsafe {
            std::env::set_var("TALLY_CHANNEL_CAPACITY", "0");
        }
        let err = TallyConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::ZeroCapacity));

        // SAFETY: see above
        unsafe {
            std::env::remove_var("TALLY_HOME");
            std::env::remove_var("TALLY_PURGE_INTERVAL_SECS");
            std::env::remove_var("TALLY_CHANNEL_CAPACITY");
        }
    }
}
