//! On-disk artifact cache with a cooperative generation lock.
//!
//! An artifact lives at a deterministic path derived from its [`CacheKey`].
//! While it is being produced a sibling `<path>.genlock` exists. The
//! generator's dataset is written to the lock path and renamed onto the
//! artifact path, so the lock disappears exactly when the artifact is
//! complete. Other invocations that find a lock poll until it is gone.

use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cesm_common::{Component, Frequency, TseriesResult};
use nc_dataset::{write_dataset, ArtifactFormat, Dataset, FillValue};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const GENLOCK_SUFFIX: &str = ".genlock";

/// Global attributes that may not be written to an artifact.
const FORBIDDEN_ATTRS: [&str; 1] = ["_NCProperties"];

/// Identity of a cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheKey {
    /// Spatially reduced series of one member.
    Tseries {
        varname: String,
        component: Component,
        experiment: String,
        ensemble: u32,
        freq: Frequency,
    },
    /// Series at one grid cell of one member; `cell` holds `(dim, index)`.
    Point {
        varname: String,
        cell: Vec<(String, usize)>,
        component: Component,
        experiment: String,
        ensemble: u32,
    },
}

impl CacheKey {
    pub fn tseries(
        varname: impl Into<String>,
        component: Component,
        experiment: impl Into<String>,
        ensemble: u32,
        freq: Frequency,
    ) -> Self {
        CacheKey::Tseries {
            varname: varname.into(),
            component,
            experiment: experiment.into(),
            ensemble,
            freq,
        }
    }

    pub fn file_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Tseries {
                varname,
                component,
                experiment,
                ensemble,
                freq,
            } => write!(f, "{}_{}_{}_{:02}_{}.nc", varname, component, experiment, ensemble, freq),
            CacheKey::Point {
                varname,
                cell,
                component,
                experiment,
                ensemble,
            } => {
                let cell = cell
                    .iter()
                    .map(|(d, i)| format!("{}_{}", d, i))
                    .collect::<Vec<_>>()
                    .join("_");
                write!(f, "{}_{}_{}_{}_{:02}.nc", varname, cell, component, experiment, ensemble)
            }
        }
    }
}

/// Observable state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    Absent,
    Locked,
    Present,
}

/// `CLOBBER` is read once per request; `True`, `true` and `1` enable it.
pub fn clobber_from_env() -> bool {
    std::env::var("CLOBBER")
        .map(|v| matches!(v.as_str(), "True" | "true" | "1"))
        .unwrap_or(false)
}

pub fn genlock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(GENLOCK_SUFFIX);
    PathBuf::from(name)
}

/// Set explicit fill encoding where none was chosen and drop forbidden attrs.
pub fn prepare_for_write(ds: &mut Dataset) {
    for (_, var) in ds.iter_mut() {
        if var.encoding.fill_value == FillValue::Unset {
            var.encoding.fill_value = FillValue::Disabled;
        }
    }
    for attr in FORBIDDEN_ATTRS {
        ds.attrs.remove(attr);
    }
}

/// Directory of cached artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    dir: PathBuf,
    format: ArtifactFormat,
    poll_interval: Duration,
}

impl ArtifactCache {
    pub fn new(dir: impl Into<PathBuf>, format: ArtifactFormat, poll_interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            format,
            poll_interval,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> ArtifactFormat {
        self.format
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    pub fn state(&self, key: &CacheKey) -> ArtifactState {
        let path = self.path_for(key);
        if genlock_path(&path).exists() {
            ArtifactState::Locked
        } else if path.exists() {
            ArtifactState::Present
        } else {
            ArtifactState::Absent
        }
    }

    /// Path of the artifact for `key`, generating it first when needed.
    ///
    /// Generation happens when `clobber` is set or when neither the artifact
    /// nor its lock exists. Generator and write errors remove the lock and
    /// are returned unchanged. Otherwise the call waits, without timeout,
    /// for any lock held by another invocation to disappear.
    pub fn get_or_generate<F>(&self, key: &CacheKey, clobber: bool, generate: F) -> TseriesResult<PathBuf>
    where
        F: FnOnce() -> TseriesResult<Dataset>,
    {
        let path = self.path_for(key);
        let lock = genlock_path(&path);

        if clobber || (!path.exists() && !lock.exists()) {
            std::fs::create_dir_all(&self.dir)?;
            OpenOptions::new().write(true).create(true).truncate(true).open(&lock)?;
            info!(path = %path.display(), clobber, "Generating artifact");

            let written = generate().and_then(|mut ds| {
                prepare_for_write(&mut ds);
                write_dataset(&ds, &lock, self.format)?;
                std::fs::rename(&lock, &path)?;
                Ok(())
            });
            if let Err(e) = written {
                if let Err(rm) = std::fs::remove_file(&lock) {
                    warn!(lock = %lock.display(), error = %rm, "Failed to remove genlock");
                }
                return Err(e);
            }
            info!(path = %path.display(), "Artifact written");
        }

        while lock.exists() {
            info!(lock = %lock.display(), "genlock file exists, waiting");
            std::thread::sleep(self.poll_interval);
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cesm_common::TseriesError;
    use nc_dataset::{open_dataset, Variable};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn cache(dir: &Path) -> ArtifactCache {
        ArtifactCache::new(dir, ArtifactFormat::Json, Duration::from_millis(10))
    }

    fn key() -> CacheKey {
        CacheKey::tseries("FG_CO2", Component::Ocn, "esm-hist", 1, Frequency::Mon)
    }

    fn small() -> TseriesResult<Dataset> {
        let mut ds = Dataset::new().with_var("x", Variable::from_values("time", vec![1.0, 2.0]))?;
        ds.set_attr("_NCProperties", "version=2");
        Ok(ds)
    }

    #[test]
    fn test_file_names() {
        assert_eq!(key().file_name(), "FG_CO2_ocn_esm-hist_01_mon.nc");
        let point = CacheKey::Point {
            varname: "CO2".into(),
            cell: vec![("lat".into(), 12), ("lon".into(), 3)],
            component: Component::Atm,
            experiment: "esm-hist".into(),
            ensemble: 3,
        };
        assert_eq!(point.file_name(), "CO2_lat_12_lon_3_atm_esm-hist_03.nc");
    }

    #[test]
    fn test_generate_once_then_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let calls = AtomicUsize::new(0);
        let gen = || {
            calls.fetch_add(1, Ordering::SeqCst);
            small()
        };
        assert_eq!(cache.state(&key()), ArtifactState::Absent);
        let p1 = cache.get_or_generate(&key(), false, gen).unwrap();
        let p2 = cache.get_or_generate(&key(), false, gen).unwrap();
        assert_eq!(p1, p2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.state(&key()), ArtifactState::Present);

        let ds = open_dataset(&p1).unwrap();
        assert!(ds.attrs.get("_NCProperties").is_none());
        assert_eq!(ds.var("x").unwrap().encoding.fill_value, FillValue::Disabled);

        cache.get_or_generate(&key(), true, gen).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failure_removes_lock_and_allows_retry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let err = cache
            .get_or_generate(&key(), false, || Err(TseriesError::MissingVariable("FG_CO2".into())))
            .unwrap_err();
        assert!(matches!(err, TseriesError::MissingVariable(_)));
        assert_eq!(cache.state(&key()), ArtifactState::Absent);
        assert!(cache.get_or_generate(&key(), false, small).is_ok());
    }

    #[test]
    fn test_waits_for_foreign_lock() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(cache(dir.path()));
        let path = cache.path_for(&key());
        let lock = genlock_path(&path);
        std::fs::write(&lock, b"").unwrap();
        assert_eq!(cache.state(&key()), ArtifactState::Locked);

        let other = Arc::clone(&cache);
        let waiter = std::thread::spawn(move || other.get_or_generate(&key(), false, || panic!("must not generate")));
        std::thread::sleep(Duration::from_millis(50));
        write_dataset(&small().unwrap(), &path, ArtifactFormat::Json).unwrap();
        std::fs::remove_file(&lock).unwrap();
        assert_eq!(waiter.join().unwrap().unwrap(), path);
    }
}
