//! Configuration for time-series generation.

use std::path::PathBuf;
use std::time::Duration;

use nc_dataset::ArtifactFormat;
use serde::{Deserialize, Serialize};

/// Configuration for the orchestrator and its caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TseriesConfig {
    /// Directory of spatially reduced series.
    pub cache_dir: PathBuf,

    /// Directory of single-cell series.
    pub latlon_cache_dir: PathBuf,

    /// Format of newly written artifacts.
    pub format: ArtifactFormat,

    /// Seconds between checks while another invocation holds a genlock.
    pub poll_interval_secs: u64,

    /// Upper bound on the worker count of locally created pools.
    pub max_workers: Option<usize>,

    /// Generate ensemble members concurrently.
    pub parallel_ensembles: bool,
}

impl Default for TseriesConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("tseries"),
            latlon_cache_dir: PathBuf::from("latlon_sel"),
            format: ArtifactFormat::preferred(),
            poll_interval_secs: 5,
            max_workers: None,
            parallel_ensembles: false,
        }
    }
}

impl TseriesConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("TSERIES_CACHE_DIR") {
            config.cache_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("TSERIES_LATLON_CACHE_DIR") {
            config.latlon_cache_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("TSERIES_FORMAT") {
            if let Ok(format) = val.parse() {
                config.format = format;
            }
        }

        if let Ok(val) = std::env::var("TSERIES_POLL_INTERVAL_SECS") {
            if let Ok(secs) = val.parse() {
                config.poll_interval_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("TSERIES_MAX_WORKERS") {
            if let Ok(n) = val.parse() {
                config.max_workers = Some(n);
            }
        }

        if let Ok(val) = std::env::var("TSERIES_PARALLEL_ENSEMBLES") {
            config.parallel_ensembles = val.to_lowercase() == "true" || val == "1";
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_secs == 0 {
            return Err("poll_interval_secs must be > 0".to_string());
        }

        if self.max_workers == Some(0) {
            return Err("max_workers must be > 0".to_string());
        }

        if self.cache_dir == self.latlon_cache_dir {
            return Err("cache_dir and latlon_cache_dir must differ".to_string());
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = TseriesConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = TseriesConfig {
            max_workers: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shared_dirs() {
        let config = TseriesConfig {
            latlon_cache_dir: PathBuf::from("tseries"),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("must differ"));
    }
}
