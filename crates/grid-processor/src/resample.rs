//! Temporal resampling of monthly series.

use cesm_common::time::prepend_history;
use cesm_common::{TseriesError, TseriesResult};
use nc_dataset::time_coord::{bounds_name, bounds_pairs, decode_times};
use nc_dataset::{time_set_mid, Dataset, MidpointMode, Variable};
use ndarray::{Array2, ArrayD, Axis, IxDyn};
use tracing::debug;

const ANN_MEAN_CREATOR: &str = "grid_processor::resample::compute_ann_mean";
const MON_ANOMALY_CREATOR: &str = "grid_processor::resample::compute_mon_anomaly";

/// Move `time_name` first and flatten the rest: `(time, rest)`.
fn time_major(var: &Variable, time_name: &str) -> TseriesResult<(Vec<String>, Array2<f64>)> {
    let mut order = vec![time_name.to_string()];
    order.extend(var.dims.iter().filter(|d| d.as_str() != time_name).cloned());
    let t = var.transpose(&order)?;
    let values = t.values()?;
    let ntime = values.shape()[0];
    let rest = if ntime == 0 { 0 } else { values.len() / ntime };
    let flat: Vec<f64> = values.iter().copied().collect();
    let array = Array2::from_shape_vec((ntime, rest), flat).map_err(|e| TseriesError::InvalidFormat(e.to_string()))?;
    Ok((order, array))
}

/// Inverse of [`time_major`] for a series with `ntime` steps.
fn from_time_major(template: &Variable, order: &[String], data: Array2<f64>) -> TseriesResult<Variable> {
    let ntime = data.nrows();
    let mut shape = vec![ntime];
    for d in order.iter().skip(1) {
        shape.push(template.dim_size(d).unwrap_or(1));
    }
    let flat: Vec<f64> = data.iter().copied().collect();
    let array = ArrayD::from_shape_vec(IxDyn(&shape), flat).map_err(|e| TseriesError::InvalidFormat(e.to_string()))?;
    template.with_data(order, array)?.transpose(&template.dims)
}

/// Contiguous index ranges sharing a key.
fn runs<K: PartialEq + Copy>(keys: &[K]) -> Vec<(K, std::ops::Range<usize>)> {
    let mut out: Vec<(K, std::ops::Range<usize>)> = Vec::new();
    for (i, &k) in keys.iter().enumerate() {
        match out.last_mut() {
            Some((last, range)) if *last == k => range.end = i + 1,
            _ => out.push((k, i..i + 1)),
        }
    }
    out
}

fn global_attrs_from(out: &mut Dataset, src: &Dataset, creator: &str) {
    out.attrs = src
        .attrs
        .iter()
        .filter(|(k, _)| k.as_str() != "history")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    out.set_attr("history", prepend_history(src.attr_str("history"), creator));
    out.encoding.unlimited_dims = src.encoding.unlimited_dims.clone();
}

/// Annual means of a monthly dataset, weighted by interval length.
///
/// Time must carry `bounds`. Each time-dependent numeric variable is averaged
/// per calendar year, skipping missing months. The result's bounds span each
/// year and time is reset to their midpoints.
pub fn compute_ann_mean(ds: &Dataset, time_name: &str) -> TseriesResult<Dataset> {
    let tb_name = bounds_name(ds, time_name).ok_or_else(|| TseriesError::missing_attribute(time_name, "bounds"))?;
    let bounds = bounds_pairs(ds, time_name)?;
    let years: Vec<i64> = decode_times(ds, time_name)?.iter().map(|t| t.year).collect();
    let groups = runs(&years);
    let widths: Vec<f64> = bounds.iter().map(|(l, u)| u - l).collect();
    debug!(years = groups.len(), months = years.len(), "Computing annual means");

    let mut out = Dataset::new();
    for (name, var) in ds.iter() {
        if name == tb_name || name == time_name {
            continue;
        }
        if !var.has_dim(time_name) || !var.is_numeric() {
            out.insert(name, var.clone())?;
            continue;
        }
        let (order, monthly) = time_major(var, time_name)?;
        let mut annual = Array2::<f64>::zeros((groups.len(), monthly.ncols()));
        for (g, (_, range)) in groups.iter().enumerate() {
            for col in 0..monthly.ncols() {
                let mut num = 0.0;
                let mut den = 0.0;
                for t in range.clone() {
                    let v = monthly[[t, col]];
                    if !v.is_nan() {
                        num += widths[t] * v;
                        den += widths[t];
                    }
                }
                annual[[g, col]] = num / den;
            }
        }
        out.insert(name, from_time_major(var, &order, annual)?)?;
    }

    let tb_src = ds.var(&tb_name)?;
    let tb_other = tb_src
        .dims
        .iter()
        .find(|d| d.as_str() != time_name)
        .cloned()
        .unwrap_or_else(|| "d2".to_string());
    let tb_values: Vec<f64> = groups
        .iter()
        .flat_map(|(_, r)| [bounds[r.start].0, bounds[r.end - 1].1])
        .collect();
    let tb = tb_src.with_data(
        &[time_name, tb_other.as_str()],
        ArrayD::from_shape_vec(IxDyn(&[groups.len(), 2]), tb_values).map_err(|e| TseriesError::InvalidFormat(e.to_string()))?,
    )?;
    let time_src = ds.var(time_name)?;
    let starts: Vec<f64> = groups.iter().map(|(_, r)| bounds[r.start].0).collect();
    out.insert(time_name, time_src.with_data(&[time_name], ArrayD::from_shape_vec(IxDyn(&[starts.len()]), starts).map_err(|e| TseriesError::InvalidFormat(e.to_string()))?)?)?;
    out.insert(&tb_name, tb)?;

    let mut out = time_set_mid(&out, time_name, MidpointMode::Encoded)?;
    global_attrs_from(&mut out, ds, ANN_MEAN_CREATOR);
    Ok(out)
}

/// Departures from the mean annual cycle.
///
/// For every time-dependent numeric variable the mean over all years of each
/// calendar month is subtracted. Time, bounds and metadata are kept.
pub fn compute_mon_anomaly(ds: &Dataset, time_name: &str) -> TseriesResult<Dataset> {
    let months: Vec<u32> = decode_times(ds, time_name)?.iter().map(|t| t.month).collect();
    let tb_name = bounds_name(ds, time_name);

    let mut out = Dataset::new();
    for (name, var) in ds.iter() {
        let is_time = name == time_name || Some(name) == tb_name.as_deref();
        if is_time || !var.has_dim(time_name) || !var.is_numeric() {
            out.insert(name, var.clone())?;
            continue;
        }
        let (order, mut values) = time_major(var, time_name)?;
        for month in 1..=12u32 {
            let rows: Vec<usize> = months.iter().enumerate().filter(|(_, &m)| m == month).map(|(i, _)| i).collect();
            if rows.is_empty() {
                continue;
            }
            for mut col in values.axis_iter_mut(Axis(1)) {
                let present: Vec<f64> = rows.iter().map(|&r| col[r]).filter(|v| !v.is_nan()).collect();
                let clim = if present.is_empty() {
                    f64::NAN
                } else {
                    present.iter().sum::<f64>() / present.len() as f64
                };
                for &r in &rows {
                    col[r] -= clim;
                }
            }
        }
        out.insert(name, from_time_major(var, &order, values)?)?;
    }
    global_attrs_from(&mut out, ds, MON_ANOMALY_CREATOR);
    Ok(out)
}
