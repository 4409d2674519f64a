//! Request-level driver: catalog lookup, per-member caching and assembly.

use std::path::PathBuf;
use std::sync::Arc;

use cesm_common::{Component, Frequency, TseriesError, TseriesResult};
use grid_processor::{compute_ann_mean, REGION_DIM};
use nc_dataset::{open_dataset, Dataset, Variable, TIME};
use rayon::prelude::*;
use rayon::ThreadPool;
use storage::{clobber_from_env, ensembles, ArtifactCache, CacheKey, CatalogEntry, CatalogQuery, ResolvedVarSpec, VarSpecs};
use tracing::info;

use crate::config::TseriesConfig;
use crate::generator::{generate, GenerateRequest};
use crate::pool::PoolSource;

pub const ENSEMBLE_DIM: &str = "ensemble";

/// A request for one or more reduced variables.
#[derive(Debug, Clone, PartialEq)]
pub struct TseriesRequest {
    pub varnames: Vec<String>,
    pub component: Component,
    pub experiment: String,
    /// Defaults to the component's stream from the var specs.
    pub stream: Option<String>,
    pub freq: Frequency,
    /// Defaults to the `CLOBBER` environment variable.
    pub clobber: Option<bool>,
}

impl TseriesRequest {
    pub fn new<S: Into<String>>(varnames: impl IntoIterator<Item = S>, component: Component, experiment: impl Into<String>) -> Self {
        Self {
            varnames: varnames.into_iter().map(Into::into).collect(),
            component,
            experiment: experiment.into(),
            stream: None,
            freq: Frequency::Mon,
            clobber: None,
        }
    }

    pub fn with_freq(mut self, freq: Frequency) -> Self {
        self.freq = freq;
        self
    }

    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    pub fn with_clobber(mut self, clobber: bool) -> Self {
        self.clobber = Some(clobber);
        self
    }
}

/// Settings shared by every member of one request.
pub(crate) struct RequestContext<'a> {
    pub component: Component,
    pub experiment: &'a str,
    pub stream: String,
    pub clobber: bool,
    pub pool: PoolSource,
}

/// Entry point for cached time-series generation.
pub struct Orchestrator {
    pub(crate) catalog: Arc<dyn CatalogQuery>,
    pub(crate) specs: VarSpecs,
    config: TseriesConfig,
    tseries_cache: ArtifactCache,
    pub(crate) latlon_cache: ArtifactCache,
}

impl Orchestrator {
    pub fn new(catalog: Arc<dyn CatalogQuery>, specs: VarSpecs, config: TseriesConfig) -> Self {
        let tseries_cache = ArtifactCache::new(&config.cache_dir, config.format, config.poll_interval());
        let latlon_cache = ArtifactCache::new(&config.latlon_cache_dir, config.format, config.poll_interval());
        Self {
            catalog,
            specs,
            config,
            tseries_cache,
            latlon_cache,
        }
    }

    pub fn config(&self) -> &TseriesConfig {
        &self.config
    }

    pub fn specs(&self) -> &VarSpecs {
        &self.specs
    }

    pub(crate) fn context<'a>(
        &self,
        component: Component,
        experiment: &'a str,
        stream: Option<&str>,
        clobber: Option<bool>,
        pool: Option<Arc<ThreadPool>>,
    ) -> TseriesResult<RequestContext<'a>> {
        let stream = match stream {
            Some(s) => s.to_string(),
            None => self.specs.default_stream(component)?.to_string(),
        };
        Ok(RequestContext {
            component,
            experiment,
            stream,
            clobber: clobber.unwrap_or_else(clobber_from_env),
            pool: match pool {
                Some(p) => PoolSource::shared(p),
                None => PoolSource::local(self.config.max_workers),
            },
        })
    }

    /// Reduced series of every requested variable, merged into one dataset.
    ///
    /// With `pool` the numeric work runs on the caller's pool; otherwise a
    /// pool is created for each generation and dropped when it ends.
    pub fn get_vars(&self, req: &TseriesRequest, pool: Option<Arc<ThreadPool>>) -> TseriesResult<Dataset> {
        let ctx = self.context(req.component, &req.experiment, req.stream.as_deref(), req.clobber, pool)?;
        let resolved = req
            .varnames
            .iter()
            .map(|v| self.specs.resolved_name(v, req.component))
            .collect::<TseriesResult<Vec<_>>>()?;
        let entries = self
            .catalog
            .find_in_index(&resolved, ctx.component, &ctx.stream, ctx.experiment)?;

        let parts = req
            .varnames
            .iter()
            .map(|v| self.get_var(v, req.freq, &ctx, &entries))
            .collect::<TseriesResult<Vec<_>>>()?;
        let (first, rest) = parts
            .split_first()
            .ok_or_else(|| TseriesError::Config("no variables requested".to_string()))?;
        let rest: Vec<&Dataset> = rest.iter().collect();
        first.merge(&rest)
    }

    /// Artifact paths of every member of `varname`, generating as needed.
    pub fn tseries_paths(&self, varname: &str, req: &TseriesRequest) -> TseriesResult<Vec<(u32, PathBuf)>> {
        let ctx = self.context(req.component, &req.experiment, req.stream.as_deref(), req.clobber, None)?;
        let resolved = self.specs.resolved_name(varname, req.component)?;
        let entries = self
            .catalog
            .find_in_index(&[resolved], ctx.component, &ctx.stream, ctx.experiment)?;
        self.member_paths(varname, req.freq, &ctx, &entries)
    }

    fn get_var(
        &self,
        varname: &str,
        freq: Frequency,
        ctx: &RequestContext<'_>,
        entries: &[CatalogEntry],
    ) -> TseriesResult<Dataset> {
        let paths = self.member_paths(varname, freq, ctx, entries)?;
        let members: Vec<u32> = paths.iter().map(|(m, _)| *m).collect();
        let datasets = paths
            .iter()
            .map(|(_, p)| open_dataset(p))
            .collect::<TseriesResult<Vec<_>>>()?;
        combine_members(datasets, &members, varname)
    }

    fn member_paths(
        &self,
        varname: &str,
        freq: Frequency,
        ctx: &RequestContext<'_>,
        entries: &[CatalogEntry],
    ) -> TseriesResult<Vec<(u32, PathBuf)>> {
        let spec = self.specs.resolve(varname, ctx.component)?;
        let entries: Vec<CatalogEntry> = entries
            .iter()
            .filter(|e| e.variable == spec.resolved_name)
            .cloned()
            .collect();
        if entries.is_empty() {
            return Err(TseriesError::NoMatchingFiles {
                variable: varname.to_string(),
                component: ctx.component.to_string(),
                stream: ctx.stream.clone(),
                experiment: ctx.experiment.to_string(),
            });
        }

        let members = ensembles(&entries);
        let one = |ensemble: u32| {
            self.member_path(&spec, ensemble, freq, ctx, &entries)
                .map(|p| (ensemble, p))
        };
        if self.config.parallel_ensembles && members.len() > 1 {
            members.par_iter().map(|&m| one(m)).collect()
        } else {
            members.iter().map(|&m| one(m)).collect()
        }
    }

    /// Cached artifact of one member; `ann` is derived from the `mon`
    /// artifact, which is ensured first.
    fn member_path(
        &self,
        spec: &ResolvedVarSpec,
        ensemble: u32,
        freq: Frequency,
        ctx: &RequestContext<'_>,
        entries: &[CatalogEntry],
    ) -> TseriesResult<PathBuf> {
        let key = CacheKey::tseries(&spec.name, ctx.component, ctx.experiment, ensemble, freq);
        self.tseries_cache.get_or_generate(&key, ctx.clobber, || match freq {
            Frequency::Mon => {
                let req = GenerateRequest {
                    spec,
                    component: ctx.component,
                    stream: &ctx.stream,
                    experiment: ctx.experiment,
                    ensemble,
                };
                generate(&req, entries, &ctx.pool)
            }
            Frequency::Ann => {
                let mon = self.member_path(spec, ensemble, Frequency::Mon, ctx, entries)?;
                info!(path = %mon.display(), "Computing annual means");
                compute_ann_mean(&open_dataset(&mon)?, TIME)
            }
        })
    }
}

/// Dimension order with `region` then `ensemble` moved to the end.
fn canonical_order(dims: &[String]) -> Vec<String> {
    let mut order: Vec<String> = dims
        .iter()
        .filter(|d| *d != REGION_DIM && *d != ENSEMBLE_DIM)
        .cloned()
        .collect();
    for trailing in [REGION_DIM, ENSEMBLE_DIM] {
        if dims.iter().any(|d| d == trailing) {
            order.push(trailing.to_string());
        }
    }
    order
}

/// Stack `varname` of each member dataset along `ensemble`.
///
/// Everything else comes from the first member. A single member is
/// returned unchanged.
pub(crate) fn combine_members(mut datasets: Vec<Dataset>, members: &[u32], varname: &str) -> TseriesResult<Dataset> {
    if datasets.len() == 1 {
        return Ok(datasets.remove(0));
    }
    let vars = datasets
        .iter()
        .map(|ds| ds.var(varname))
        .collect::<TseriesResult<Vec<_>>>()?;
    let stacked = Variable::stack(&vars, ENSEMBLE_DIM)?;
    let stacked = stacked.transpose(&canonical_order(&stacked.dims))?;

    let mut out = datasets.swap_remove(0);
    out.remove(varname);
    out.insert(varname, stacked)?;
    out.insert(
        ENSEMBLE_DIM,
        Variable::from_values(ENSEMBLE_DIM, members.iter().map(|&m| m as f64).collect()),
    )?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order() {
        let dims: Vec<String> = ["ensemble", "time", "z_t", "region"].iter().map(|s| s.to_string()).collect();
        assert_eq!(canonical_order(&dims), vec!["time", "z_t", "region", "ensemble"]);
    }

    #[test]
    fn test_combine_members_stacks_trailing() {
        let member = |v: f64| {
            Dataset::new()
                .with_var("time", Variable::from_values("time", vec![0.5, 1.5, 2.5]))
                .unwrap()
                .with_var(
                    "FG_CO2",
                    Variable::from_vec(&["time", "region"], &[3, 2], vec![v; 6]).unwrap(),
                )
                .unwrap()
        };
        let ds = combine_members(vec![member(1.0), member(2.0)], &[1, 2], "FG_CO2").unwrap();
        let fg = ds.var("FG_CO2").unwrap();
        assert_eq!(fg.dims, vec!["time", "region", "ensemble"]);
        assert_eq!(fg.shape(), vec![3, 2, 2]);
        assert_eq!(fg.values().unwrap()[[2, 1, 1]], 2.0);
        assert_eq!(ds.var(ENSEMBLE_DIM).unwrap().values().unwrap().as_slice().unwrap(), &[1.0, 2.0]);

        let single = combine_members(vec![member(3.0)], &[4], "FG_CO2").unwrap();
        assert!(!single.contains(ENSEMBLE_DIM));
    }
}
