//! Subcommand implementations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use cesm_common::Frequency;
use grid_processor::compute_mon_anomaly;
use nc_dataset::{write_dataset, Dataset, TIME};
use storage::{Catalog, VarSpecs};
use tracing::info;
use tseries::{Orchestrator, PointRequest, TseriesConfig, TseriesRequest};

/// Inputs shared by the generating subcommands.
#[derive(Debug, Default)]
pub struct Sources {
    pub catalog: Option<PathBuf>,
    pub var_specs: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
}

impl Sources {
    fn orchestrator(&self) -> Result<Orchestrator> {
        let mut config = TseriesConfig::from_env();
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = dir.clone();
        }
        config.validate().map_err(|e| anyhow!("invalid configuration: {}", e))?;

        let catalog_path = self
            .catalog
            .as_deref()
            .ok_or_else(|| anyhow!("--catalog or TSERIES_CATALOG is required"))?;
        let specs_path = self
            .var_specs
            .as_deref()
            .ok_or_else(|| anyhow!("--var-specs or TSERIES_VAR_SPECS is required"))?;
        let catalog = Catalog::from_file(catalog_path)
            .with_context(|| format!("loading catalog {}", catalog_path.display()))?;
        let specs = VarSpecs::from_file(specs_path)
            .with_context(|| format!("loading var specs {}", specs_path.display()))?;

        info!(
            cache_dir = %config.cache_dir.display(),
            format = %config.format,
            max_workers = ?config.max_workers,
            "Loaded configuration"
        );
        Ok(Orchestrator::new(Arc::new(catalog), specs, config))
    }
}

fn finish(ds: &Dataset, output: Option<&Path>, orch: &Orchestrator) -> Result<()> {
    match output {
        Some(path) => {
            write_dataset(ds, path, orch.config().format)?;
            info!(path = %path.display(), "Wrote dataset");
        }
        None => {
            let vars: Vec<&str> = ds.names().collect();
            info!(variables = ?vars, dims = ?ds.dims(), "Dataset ready");
        }
    }
    Ok(())
}

pub fn run_tseries(sources: &Sources, req: &TseriesRequest, anomaly: bool, output: Option<&Path>) -> Result<()> {
    if anomaly && req.freq != Frequency::Mon {
        return Err(anyhow!("--anomaly requires --freq mon"));
    }
    let orch = sources.orchestrator()?;
    let mut ds = orch.get_vars(req, None)?;
    if anomaly {
        ds = compute_mon_anomaly(&ds, TIME)?;
    }
    finish(&ds, output, &orch)
}

pub fn run_latlon(sources: &Sources, req: &PointRequest, output: Option<&Path>) -> Result<()> {
    let orch = sources.orchestrator()?;
    let ds = orch.latlon_sel_get_var(req)?;
    finish(&ds, output, &orch)
}

/// Parse `name=case1,case2` experiment arguments.
fn parse_experiments(args: &[String]) -> Result<BTreeMap<String, Vec<String>>> {
    let mut out = BTreeMap::new();
    for arg in args {
        let (name, cases) = arg
            .split_once('=')
            .ok_or_else(|| anyhow!("expected EXPERIMENT=CASE[,CASE...], got '{}'", arg))?;
        let cases: Vec<String> = cases
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect();
        if name.is_empty() || cases.is_empty() {
            return Err(anyhow!("expected EXPERIMENT=CASE[,CASE...], got '{}'", arg));
        }
        out.insert(name.to_string(), cases);
    }
    Ok(out)
}

pub fn run_scan(root: &Path, experiments: &[String], output: &Path) -> Result<()> {
    let experiments = parse_experiments(experiments)?;
    let catalog = Catalog::scan(root, &experiments)?;
    std::fs::write(output, catalog.to_yaml()?).with_context(|| format!("writing {}", output.display()))?;
    info!(path = %output.display(), entries = catalog.entries.len(), "Wrote catalog");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cesm_common::Component;
    use test_utils::{write_ocn_archive, OcnArchiveSpec};

    #[test]
    fn test_parse_experiments() {
        let parsed = parse_experiments(&["esm-hist=a.001, a.002".to_string(), "ssp585=b.001".to_string()]).unwrap();
        assert_eq!(parsed["esm-hist"], vec!["a.001", "a.002"]);
        assert_eq!(parsed["ssp585"], vec!["b.001"]);
        assert!(parse_experiments(&["esm-hist".to_string()]).is_err());
        assert!(parse_experiments(&["esm-hist=".to_string()]).is_err());
    }

    #[test]
    fn test_scan_then_generate() {
        let dir = tempfile::tempdir().unwrap();
        let archive_root = dir.path().join("archive");
        let spec = OcnArchiveSpec::default();
        let archive = write_ocn_archive(&archive_root, &spec).unwrap();

        let catalog_path = dir.path().join("scanned.yaml");
        let experiment = format!("esm-hist={}", spec.cases.join(","));
        run_scan(&archive_root, &[experiment], &catalog_path).unwrap();

        let sources = Sources {
            catalog: Some(catalog_path),
            var_specs: Some(archive.var_specs_path),
            cache_dir: Some(dir.path().join("cache")),
        };
        let out = dir.path().join("anomaly.nc");
        let req = TseriesRequest::new(["FG_CO2"], Component::Ocn, "esm-hist").with_clobber(false);
        run_tseries(&sources, &req, true, Some(&out)).unwrap();
        assert!(out.exists());
        assert!(dir.path().join("cache").join("FG_CO2_ocn_esm-hist_02_mon.nc").exists());
    }
}
