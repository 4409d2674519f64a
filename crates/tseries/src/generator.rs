//! Generation of one spatially reduced series for one ensemble member.

use std::path::PathBuf;

use cesm_common::time::prepend_history;
use cesm_common::units::format_units;
use cesm_common::{clean_units, Component, ReduceOp, TseriesError, TseriesResult, Unit};
use grid_processor::{
    copy_var_names, drop_var_names, get_region_mask, get_weight, time_chunksize, vertlen, weight_sum,
    weighted_reduce, SizingInput, TimeBlocks, REGION_DIM,
};
use nc_dataset::ops::broadcast_mul;
use nc_dataset::time_coord::bounds_name;
use nc_dataset::{open_mfdataset, time_set_mid, Dataset, MidpointMode, Variable, TIME};
use storage::{member_files, CatalogEntry, ResolvedVarSpec};
use tracing::{debug, info};

use crate::pool::PoolSource;

const CREATOR: &str = "tseries::generator::generate";

/// What to generate.
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub spec: &'a ResolvedVarSpec,
    pub component: Component,
    pub stream: &'a str,
    pub experiment: &'a str,
    pub ensemble: u32,
}

impl GenerateRequest<'_> {
    fn no_files(&self) -> TseriesError {
        TseriesError::NoMatchingFiles {
            variable: self.spec.name.clone(),
            component: self.component.to_string(),
            stream: self.stream.to_string(),
            experiment: self.experiment.to_string(),
        }
    }
}

/// Build the reduced series of `req.spec` for one member from its catalog
/// entries.
///
/// The output holds the reduced variable under the requested name with
/// dimensions `(time, [kept...], region)`, the time coordinate reset to
/// bounds midpoints, the time bounds, the component's auxiliary variables,
/// `weight_sum_{var}` and the `region` coordinate.
pub fn generate(req: &GenerateRequest<'_>, entries: &[CatalogEntry], pool: &PoolSource) -> TseriesResult<Dataset> {
    let spec = req.spec;
    let varname = spec.name.as_str();
    let resolved = spec.resolved_name.as_str();

    let member: Vec<CatalogEntry> = entries.iter().filter(|e| e.variable == resolved).cloned().collect();
    let files = member_files(&member, req.ensemble);
    if files.is_empty() {
        return Err(req.no_files());
    }
    info!(
        varname,
        component = %req.component,
        experiment = req.experiment,
        ensemble = req.ensemble,
        files = files.len(),
        "Generating time series"
    );

    // Per-file properties come from the header of the first file alone.
    let first_file = open_mfdataset(&files[..1], TIME, &[])?;
    let ds0 = first_file.header();
    let var0 = ds0.var(resolved)?;
    let shape0 = var0.shape();
    let chunk = time_chunksize(shape0.len());
    let vlen = vertlen(&shape0);
    let var_encoding = var0.encoding.clone();
    let drops = drop_var_names(req.component, ds0, resolved);
    debug!(rank = shape0.len(), vertlen = vlen, time_chunksize = chunk, drops = ?drops, "Inspected first file");

    // Only headers are read here; data is fetched one time block at a time.
    let ds_in = open_mfdataset(&files, TIME, &drops)?;
    let tlen = ds_in.len();
    if tlen == 0 {
        return Err(TseriesError::EmptyTimeAxis(varname.to_string()));
    }
    let header = ds_in.header();
    let da = header.var(resolved)?;

    let units_in = da
        .units()
        .ok_or_else(|| TseriesError::missing_attribute(resolved, "units"))?;
    let mut var_units = clean_units(units_in);
    if let Some(conv) = &spec.unit_conv {
        var_units = format!("({})({})", conv, var_units);
    }

    let weight = get_weight(header, req.component, &spec.reduce_dims)?;
    let region_mask = get_region_mask(header, req.component)?;
    let mut combined = broadcast_mul(&region_mask.mask, &weight)?;
    combined.attrs = weight.attrs.clone();
    info!(varname, regions = region_mask.names.len(), "Weight constructed");

    let first_step = ds_in.read_var(resolved, 0..1)?;
    let mut wsum = weight_sum(&first_step.isel(TIME, 0)?, &combined, &spec.reduce_dims)?;
    wsum.attrs = weight.attrs.clone();
    wsum.attrs.insert(
        "long_name".to_string(),
        format!("sum of weights used in tseries generation for {}", varname).into(),
    );

    let out_units = match spec.op {
        ReduceOp::Integrate => {
            let weight_units = combined
                .units()
                .ok_or_else(|| TseriesError::missing_attribute("weight", "units"))?;
            format_units(&format!("({})({})", weight_units, var_units))?
        }
        ReduceOp::Average => format_units(&var_units)?,
    };
    let long_name = format!(
        "{} {}",
        match spec.op {
            ReduceOp::Integrate => "Integrated",
            ReduceOp::Average => "Averaged",
        },
        da.long_name().unwrap_or(varname)
    );

    let mut copy_list = vec![TIME.to_string()];
    if let Some(bounds) = bounds_name(header, TIME) {
        copy_list.push(bounds);
    }
    copy_list.extend(
        copy_var_names(req.component)
            .iter()
            .filter(|name| header.contains(name))
            .map(|name| name.to_string()),
    );
    let mut read_list = copy_list.clone();
    read_list.push(resolved.to_string());

    let input = SizingInput {
        tlen,
        time_chunksize: chunk,
        vertlen: vlen,
    };
    let blocks = TimeBlocks::new(tlen, pool.workers(&input), chunk);
    let workers = pool.acquire(&input)?;
    info!(tlen, time_step = blocks.time_step, blocks = blocks.len(), threads = workers.threads(), "Reducing");

    let mut pieces = Vec::with_capacity(blocks.len());
    for range in blocks.ranges() {
        debug!(time_ind0 = range.start, time_ind1 = range.end, "Time block");
        let mut piece = ds_in.read(&read_list, range)?;
        let block = piece
            .remove(resolved)
            .ok_or_else(|| TseriesError::MissingVariable(resolved.to_string()))?;
        let mut reduced = workers.install(|| weighted_reduce(&block, &combined, &spec.reduce_dims, spec.op))?;
        drop(block);
        reduced.attrs.insert("long_name".to_string(), long_name.clone().into());
        reduced.attrs.insert("units".to_string(), out_units.clone().into());
        reduced.encoding.dtype = var_encoding.dtype;
        reduced.encoding.fill_value = var_encoding.fill_value;
        reduced.encoding.missing_value = var_encoding.missing_value;

        piece.insert(varname, reduced)?;
        pieces.push(piece);
    }
    drop(workers);

    let refs: Vec<&Dataset> = pieces.iter().collect();
    let mut ds_out = time_set_mid(&Dataset::concat(&refs, TIME)?, TIME, MidpointMode::Encoded)?;

    ds_out.attrs = ds0.attrs.clone();
    let history = prepend_history(ds0.attr_str("history"), CREATOR);
    ds_out.set_attr("history", history);
    ds_out.set_attr("input_file_list", join_paths(&files));
    ds_out.encoding.unlimited_dims = ds0.encoding.unlimited_dims.clone();

    if let Some(target) = spec.output_units() {
        let var = ds_out.get_mut(varname).ok_or_else(|| TseriesError::MissingVariable(varname.to_string()))?;
        conv_units(var, target)?;
        info!(varname, units = target, "Converted units");
    }

    ds_out.insert(&format!("weight_sum_{}", varname), wsum)?;
    ds_out.insert(REGION_DIM, region_mask.region_coord())?;
    Ok(ds_out)
}

/// Convert `var` in place to `target` units and set its `units` attr.
pub fn conv_units(var: &mut Variable, target: &str) -> TseriesResult<()> {
    let from_units = var
        .units()
        .ok_or_else(|| TseriesError::missing_attribute("variable", "units"))?;
    let from = Unit::parse(&clean_units(from_units))?;
    let to = Unit::parse(&clean_units(target))?;
    let values = var.values_mut()?;
    let mut flat: Vec<f64> = values.iter().copied().collect();
    from.convert_values(&to, &mut flat)?;
    for (slot, v) in values.iter_mut().zip(flat) {
        *slot = v;
    }
    var.attrs.insert("units".to_string(), target.into());
    Ok(())
}

pub(crate) fn join_paths(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
