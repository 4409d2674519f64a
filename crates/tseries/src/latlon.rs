//! Series at the grid cell nearest a latitude/longitude.

use std::path::PathBuf;

use cesm_common::time::prepend_history;
use cesm_common::{Component, TseriesError, TseriesResult};
use grid_processor::{copy_var_names, drop_var_names, find_cell, CellIndex};
use nc_dataset::time_coord::bounds_name;
use nc_dataset::{open_dataset, time_set_mid, Dataset, MidpointMode, TIME};
use storage::{ensembles, member_files, CacheKey, ResolvedVarSpec};
use tracing::info;

use crate::generator::join_paths;
use crate::orchestrator::{combine_members, Orchestrator};

const CREATOR: &str = "tseries::latlon::latlon_sel_get_var";

/// A request for one variable at one location.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRequest {
    pub varname: String,
    pub lat: f64,
    /// Degrees east; any range, wrapped for comparison.
    pub lon: f64,
    pub component: Component,
    pub experiment: String,
    pub stream: Option<String>,
    pub clobber: Option<bool>,
}

impl Orchestrator {
    /// Series of `req.varname` at the nearest cell, one per member, stacked
    /// along `ensemble` when there are several.
    pub fn latlon_sel_get_var(&self, req: &PointRequest) -> TseriesResult<Dataset> {
        let ctx = self.context(req.component, &req.experiment, req.stream.as_deref(), req.clobber, None)?;
        let spec = self.specs.resolve(&req.varname, req.component)?;
        let entries = self.catalog.find_in_index(
            std::slice::from_ref(&spec.resolved_name),
            ctx.component,
            &ctx.stream,
            ctx.experiment,
        )?;
        if entries.is_empty() {
            return Err(TseriesError::NoMatchingFiles {
                variable: req.varname.clone(),
                component: ctx.component.to_string(),
                stream: ctx.stream.clone(),
                experiment: ctx.experiment.to_string(),
            });
        }

        let members = ensembles(&entries);
        let mut datasets = Vec::with_capacity(members.len());
        for &ensemble in &members {
            let files = member_files(&entries, ensemble);
            let ds0 = open_dataset(&files[0])?;
            let cell = find_cell(&ds0, req.component, req.lat, req.lon)?;
            info!(
                varname = %req.varname,
                lat = req.lat,
                lon = req.lon,
                cell = %cell.file_tag(),
                ensemble,
                "Selected grid cell"
            );
            let key = CacheKey::Point {
                varname: req.varname.clone(),
                cell: cell.indices.clone(),
                component: req.component,
                experiment: req.experiment.clone(),
                ensemble,
            };
            let path = self
                .latlon_cache
                .get_or_generate(&key, ctx.clobber, || select_point(&spec, req.component, &cell, &ds0, &files))?;
            datasets.push(open_dataset(&path)?);
        }
        combine_members(datasets, &members, &req.varname)
    }
}

/// Concatenate the selection of `cell` from every file of one member.
fn select_point(
    spec: &ResolvedVarSpec,
    component: Component,
    cell: &CellIndex,
    ds0: &Dataset,
    files: &[PathBuf],
) -> TseriesResult<Dataset> {
    let resolved = spec.resolved_name.as_str();
    let drops = drop_var_names(component, ds0, resolved);
    let mut var_list = vec![TIME.to_string(), resolved.to_string()];
    if let Some(bounds) = bounds_name(ds0, TIME) {
        var_list.push(bounds);
    }
    let copy_vars: Vec<&str> = copy_var_names(component)
        .iter()
        .copied()
        .filter(|name| ds0.contains(name))
        .collect();

    let mut pieces = Vec::with_capacity(files.len());
    for path in files {
        let ds = open_dataset(path)?.drop_vars(&drops);
        pieces.push(cell.select(&ds.select(&var_list)?)?);
    }
    let refs: Vec<&Dataset> = pieces.iter().collect();
    let mut out = time_set_mid(&Dataset::concat(&refs, TIME)?, TIME, MidpointMode::Encoded)?;
    for name in copy_vars {
        out.insert(name, ds0.var(name)?.clone())?;
    }
    if resolved != spec.name {
        out.rename_var(resolved, &spec.name)?;
    }

    out.attrs = ds0.attrs.clone();
    out.set_attr("history", prepend_history(ds0.attr_str("history"), CREATOR));
    out.set_attr("input_file_list", join_paths(files));
    out.encoding.unlimited_dims = ds0.encoding.unlimited_dims.clone();
    Ok(out)
}
