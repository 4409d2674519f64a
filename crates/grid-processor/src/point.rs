//! Nearest grid-cell lookup for point extraction.

use cesm_common::{Component, TseriesError, TseriesResult};
use nc_dataset::{Dataset, Variable};
use tracing::debug;

use crate::registry::{strategy, PointLookup};

/// Integer selection of one grid cell, in the order of the grid axes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellIndex {
    pub indices: Vec<(String, usize)>,
}

impl CellIndex {
    /// `{dim}_{idx}` pairs joined by `_`, used in artifact filenames.
    pub fn file_tag(&self) -> String {
        self.indices
            .iter()
            .map(|(d, i)| format!("{}_{}", d, i))
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn select(&self, ds: &Dataset) -> TseriesResult<Dataset> {
        let mut out = ds.clone();
        for (dim, idx) in &self.indices {
            out = out.isel(dim, *idx)?;
        }
        Ok(out)
    }
}

/// Longitude difference folded into `[0, 180]`.
fn lon_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

/// Index of the element of `axis` nearest `target`, skipping NaN.
pub fn nearest_1d(axis: &[f64], target: f64, periodic: bool) -> Option<usize> {
    axis.iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .map(|(i, &v)| {
            let d = if periodic { lon_distance(v, target) } else { (v - target).abs() };
            (i, d)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

/// Central angle between two points given in degrees.
pub fn great_circle(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (p1, p2) = (lat1.to_radians(), lat2.to_radians());
    let dlon = (lon2 - lon1).to_radians();
    let cos_angle = p1.sin() * p2.sin() + p1.cos() * p2.cos() * dlon.cos();
    cos_angle.clamp(-1.0, 1.0).acos()
}

/// Flat index of the cell of a curvilinear grid nearest `(lat, lon)`.
pub fn nearest_2d(lats: &[f64], lons: &[f64], lat: f64, lon: f64) -> Option<usize> {
    lats.iter()
        .zip(lons)
        .enumerate()
        .filter(|(_, (a, o))| !a.is_nan() && !o.is_nan())
        .map(|(i, (&a, &o))| (i, great_circle(a, o, lat, lon)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

fn one_dim(var: &Variable, name: &str) -> TseriesResult<String> {
    match var.dims.as_slice() {
        [d] => Ok(d.clone()),
        _ => Err(TseriesError::dimension_mismatch(name, 1, var.ndim())),
    }
}

/// Grid cell of `component` nearest `(lat, lon)`.
pub fn find_cell(ds: &Dataset, component: Component, lat: f64, lon: f64) -> TseriesResult<CellIndex> {
    let not_found = || TseriesError::InvalidFormat(format!("no valid grid cell near lat={}, lon={}", lat, lon));
    let cell = match strategy(component).point_lookup {
        PointLookup::Rectilinear { lat: lat_name, lon: lon_name } => {
            let lat_var = ds.var(lat_name)?;
            let lon_var = ds.var(lon_name)?;
            let lat_dim = one_dim(lat_var, lat_name)?;
            let lon_dim = one_dim(lon_var, lon_name)?;
            let lat_vals: Vec<f64> = lat_var.values()?.iter().copied().collect();
            let lon_vals: Vec<f64> = lon_var.values()?.iter().copied().collect();
            let i = nearest_1d(&lat_vals, lat, false).ok_or_else(not_found)?;
            let j = nearest_1d(&lon_vals, lon, true).ok_or_else(not_found)?;
            CellIndex {
                indices: vec![(lat_dim, i), (lon_dim, j)],
            }
        }
        PointLookup::Curvilinear { lat: lat_name, lon: lon_name } => {
            let lat_var = ds.var(lat_name)?;
            let lon_var = ds.var(lon_name)?;
            if lat_var.ndim() != 2 {
                return Err(TseriesError::dimension_mismatch(lat_name, 2, lat_var.ndim()));
            }
            let lon_var = lon_var.transpose(&lat_var.dims)?;
            let lats: Vec<f64> = lat_var.values()?.iter().copied().collect();
            let lons: Vec<f64> = lon_var.values()?.iter().copied().collect();
            let flat = nearest_2d(&lats, &lons, lat, lon).ok_or_else(not_found)?;
            let ncols = lat_var.shape()[1].max(1);
            CellIndex {
                indices: vec![
                    (lat_var.dims[0].clone(), flat / ncols),
                    (lat_var.dims[1].clone(), flat % ncols),
                ],
            }
        }
    };
    debug!(component = %component, lat, lon, cell = %cell.file_tag(), "Resolved nearest grid cell");
    Ok(cell)
}
