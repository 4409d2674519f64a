//! End-to-end generation against a synthetic ocean archive.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cesm_common::{Component, Frequency, TseriesError};
use nc_dataset::{open_dataset, write_dataset, ArtifactFormat, Dataset};
use storage::{genlock_path, Catalog, VarSpecs};
use test_utils::generators::fg_co2_value;
use test_utils::{assert_approx_eq, assert_rel_eq, fixtures, write_ocn_archive, OcnArchive, OcnArchiveSpec};
use tseries::{Orchestrator, TseriesConfig, TseriesRequest, ENSEMBLE_DIM};

struct Setup {
    _dir: tempfile::TempDir,
    root: PathBuf,
    orch: Orchestrator,
}

fn setup() -> Setup {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let archive = write_ocn_archive(&root.join("archive"), &OcnArchiveSpec::default()).unwrap();
    let orch = orchestrator(&archive, &root);
    Setup { _dir: dir, root, orch }
}

/// Orchestrator over `archive` caching under `cache_root`.
fn orchestrator(archive: &OcnArchive, cache_root: &Path) -> Orchestrator {
    let config = TseriesConfig {
        cache_dir: cache_root.join("tseries"),
        latlon_cache_dir: cache_root.join("latlon_sel"),
        format: ArtifactFormat::Json,
        poll_interval_secs: 1,
        max_workers: Some(2),
        ..Default::default()
    };
    Orchestrator::new(
        Arc::new(Catalog::from_file(&archive.catalog_path).unwrap()),
        VarSpecs::from_file(&archive.var_specs_path).unwrap(),
        config,
    )
}

fn request(varnames: &[&str], freq: Frequency, clobber: bool) -> TseriesRequest {
    TseriesRequest::new(varnames.iter().copied(), Component::Ocn, "esm-hist")
        .with_freq(freq)
        .with_clobber(clobber)
}

fn cache_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn test_annual_flux_cached_matches_clobbered() {
    let archive_dir = tempfile::tempdir().unwrap();
    let archive = write_ocn_archive(archive_dir.path(), &OcnArchiveSpec::default()).unwrap();
    let cached_root = tempfile::tempdir().unwrap();
    let clobbered_root = tempfile::tempdir().unwrap();

    let cached = orchestrator(&archive, cached_root.path());
    let ds = cached.get_vars(&request(&["FG_CO2"], Frequency::Ann, false), None).unwrap();
    let fg = ds.var("FG_CO2").unwrap();
    assert_eq!(fg.units(), Some("PgC/yr"));
    assert_eq!(fg.dims.last().map(String::as_str), Some(ENSEMBLE_DIM));
    assert_eq!(fg.dim_size("time"), Some(4));
    // served from the cache on the second call
    let again = cached.get_vars(&request(&["FG_CO2"], Frequency::Ann, false), None).unwrap();
    assert!(again.identical_except(&ds, &[]));

    let clobbered = orchestrator(&archive, clobbered_root.path());
    let regenerated = clobbered.get_vars(&request(&["FG_CO2"], Frequency::Ann, true), None).unwrap();
    assert!(regenerated.identical_except(&ds, &["history"]));

    let cached_dir = cached_root.path().join("tseries");
    let clobbered_dir = clobbered_root.path().join("tseries");
    let expected = vec![
        "FG_CO2_ocn_esm-hist_01_ann.nc",
        "FG_CO2_ocn_esm-hist_01_mon.nc",
        "FG_CO2_ocn_esm-hist_02_ann.nc",
        "FG_CO2_ocn_esm-hist_02_mon.nc",
    ];
    assert_eq!(cache_files(&cached_dir), expected);
    assert_eq!(cache_files(&clobbered_dir), expected);
    for name in &expected {
        let a = open_dataset(&cached_dir.join(name)).unwrap();
        let b = open_dataset(&clobbered_dir.join(name)).unwrap();
        assert!(a.identical_except(&b, &["history"]), "{} differs", name);
    }
}

#[test]
fn test_second_request_reuses_artifacts() {
    let s = setup();
    let cache_dir = s.root.join("tseries");
    let req = request(&["FG_CO2"], Frequency::Mon, false);
    let first = s.orch.get_vars(&req, None).unwrap();

    let path = cache_dir.join("FG_CO2_ocn_esm-hist_01_mon.nc");
    let stamp = std::fs::metadata(&path).unwrap().modified().unwrap();
    let second = s.orch.get_vars(&req, None).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), stamp);
    assert!(first.identical_except(&second, &[]));
    assert!(cache_files(&cache_dir).iter().all(|n| !n.ends_with(".genlock")));
}

#[test]
fn test_global_average_matches_fixture() {
    let s = setup();
    let ds = s.orch.get_vars(&request(&["SST_MEAN"], Frequency::Mon, false), None).unwrap();
    let sst = ds.var("SST_MEAN").unwrap();
    assert_eq!(sst.dims, vec!["time", "region", "ensemble"]);
    assert_eq!(
        ds.var(ENSEMBLE_DIM).unwrap().values().unwrap().as_slice().unwrap(),
        &[1.0, 2.0]
    );

    let grid = fixtures::ocn_grid(1, 6, 8);
    let area = grid.var("TAREA").unwrap().values().unwrap();
    let kmt = grid.var("KMT").unwrap().values().unwrap();
    for (e, ensemble) in [1u32, 2].iter().enumerate() {
        for month in [0usize, 17, 47] {
            let (mut num, mut den) = (0.0, 0.0);
            for y in 0..6 {
                for x in 0..8 {
                    if kmt[[y, x]] > 0.0 {
                        num += 1.0e4 * fg_co2_value(*ensemble, month, y, x, false) * area[[y, x]];
                        den += area[[y, x]];
                    }
                }
            }
            assert_rel_eq!(sst.values().unwrap()[[month, 0, e]], num / den, 1e-6);
        }
    }

    let wsum = ds.var("weight_sum_SST_MEAN").unwrap();
    let ocean_area: f64 = area.iter().zip(kmt.iter()).filter(|(_, k)| **k > 0.0).map(|(a, _)| a).sum();
    assert_rel_eq!(wsum.values().unwrap()[[0]], ocean_area, 1e-9);
}

#[test]
fn test_annual_means_of_monthly_artifact() {
    let s = setup();
    let ds = s.orch.get_vars(&request(&["SST_MEAN"], Frequency::Ann, false), None).unwrap();
    let time = ds.var("time").unwrap().values().unwrap();
    let bounds = ds.var("time_bound").unwrap().values().unwrap();
    assert_eq!(time.len(), 4);
    for t in 0..4 {
        assert_approx_eq!(bounds[[t, 1]] - bounds[[t, 0]], 365.0, 1e-9);
        assert_approx_eq!(time[[t]], 0.5 * (bounds[[t, 0]] + bounds[[t, 1]]), 1e-9);
    }
    let history = ds.attr_str("history").unwrap();
    assert!(history.contains("compute_ann_mean"));
    assert!(history.contains("tseries::generator::generate"));
}

#[test]
fn test_two_variables_merge() {
    let s = setup();
    let pool = Arc::new(rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap());
    let ds = s
        .orch
        .get_vars(&request(&["FG_CO2", "SST_MEAN"], Frequency::Mon, false), Some(pool))
        .unwrap();
    for name in ["FG_CO2", "SST_MEAN", "weight_sum_FG_CO2", "weight_sum_SST_MEAN", "region", "time"] {
        assert!(ds.contains(name), "{} missing", name);
    }
}

#[test]
fn test_unknown_experiment_reports_query() {
    let s = setup();
    let req = TseriesRequest::new(["FG_CO2"], Component::Ocn, "piControl");
    match s.orch.get_vars(&req, None) {
        Err(TseriesError::NoMatchingFiles {
            variable,
            stream,
            experiment,
            ..
        }) => {
            assert_eq!(variable, "FG_CO2");
            assert_eq!(stream, "pop.h");
            assert_eq!(experiment, "piControl");
        }
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_waits_for_foreign_lock() {
    let s = setup();
    let req = request(&["SST_MEAN"], Frequency::Mon, false);
    s.orch.get_vars(&req, None).unwrap();

    // another invocation re-generating member 1
    let path = s.root.join("tseries").join("SST_MEAN_ocn_esm-hist_01_mon.nc");
    let lock = genlock_path(&path);
    let artifact = open_dataset(&path).unwrap();
    write_dataset(&artifact, &lock, ArtifactFormat::Json).unwrap();
    let releaser = {
        let (lock, path) = (lock.clone(), path.clone());
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            std::fs::rename(&lock, &path).unwrap();
        })
    };

    let ds = s.orch.get_vars(&req, None).unwrap();
    releaser.join().unwrap();
    assert!(!lock.exists());
    assert!(ds.contains("SST_MEAN"));
}
