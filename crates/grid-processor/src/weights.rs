//! Area and volume weights per component grid.

use cesm_common::constants::area_earth;
use cesm_common::{Component, TseriesError, TseriesResult};
use nc_dataset::ops::{broadcast_mul, broadcast_to};
use nc_dataset::{Dataset, Variable};
use tracing::debug;

/// Vertical dimensions that select a volume weight on the ocean grid.
const OCN_VERTICAL_DIMS: [&str; 2] = ["z_t", "z_t_150m"];

/// Fetch `name` and check it has exactly `rank` dimensions.
pub fn dim_cnt_check<'a>(ds: &'a Dataset, name: &str, rank: usize) -> TseriesResult<&'a Variable> {
    let var = ds.var(name)?;
    if var.ndim() != rank {
        return Err(TseriesError::dimension_mismatch(name, rank, var.ndim()));
    }
    Ok(var)
}

fn units_only(var: Variable, units: &str) -> Variable {
    let mut out = var;
    out.attrs.clear();
    out.encoding = Default::default();
    out.with_attr("units", units)
}

pub fn ocn_weight(ds: &Dataset, reduce_dims: &[String]) -> TseriesResult<Variable> {
    if reduce_dims.iter().any(|d| OCN_VERTICAL_DIMS.contains(&d.as_str())) {
        ocn_volume(ds, reduce_dims)
    } else {
        ocn_area(ds)
    }
}

fn ocn_area(ds: &Dataset) -> TseriesResult<Variable> {
    Ok(dim_cnt_check(ds, "TAREA", 2)?.clone())
}

fn ocn_volume(ds: &Dataset, reduce_dims: &[String]) -> TseriesResult<Variable> {
    let dz = dim_cnt_check(ds, "dz", 1)?;
    let tarea = dim_cnt_check(ds, "TAREA", 2)?;

    // fields on the upper-ocean axis use the leading dz levels
    let dz = if reduce_dims.iter().any(|d| d == "z_t_150m") {
        let nlev = ds
            .dim_size("z_t_150m")
            .ok_or_else(|| TseriesError::MissingVariable("z_t_150m".to_string()))?;
        let mut top = dz.slice(&dz.dims[0].clone(), 0..nlev)?;
        top.dims = vec!["z_t_150m".to_string()];
        top
    } else {
        dz.clone()
    };
    Ok(units_only(broadcast_mul(&dz, tarea)?, "cm3"))
}

pub fn ice_weight(ds: &Dataset, _reduce_dims: &[String]) -> TseriesResult<Variable> {
    Ok(dim_cnt_check(ds, "tarea", 2)?.clone())
}

pub fn lnd_weight(ds: &Dataset, _reduce_dims: &[String]) -> TseriesResult<Variable> {
    let landfrac = dim_cnt_check(ds, "landfrac", 2)?;
    let area = dim_cnt_check(ds, "area", 2)?;
    let units = area
        .units()
        .ok_or_else(|| TseriesError::missing_attribute("area", "units"))?
        .to_string();
    Ok(units_only(broadcast_mul(landfrac, area)?, &units))
}

pub fn atm_weight(ds: &Dataset, reduce_dims: &[String]) -> TseriesResult<Variable> {
    if reduce_dims.iter().any(|d| d == "lev") {
        return Err(TseriesError::unrecognized_operation("volume weight", "component=atm"));
    }
    atm_area(ds)
}

/// Gaussian weights spread over longitude and scaled to the Earth's area.
fn atm_area(ds: &Dataset) -> TseriesResult<Variable> {
    let gw = dim_cnt_check(ds, "gw", 1)?;
    let nlon = ds
        .dim_size("lon")
        .ok_or_else(|| TseriesError::MissingVariable("lon".to_string()))?;
    let lat_dim = gw.dims[0].clone();
    let nlat = gw.shape()[0];

    let spread = broadcast_to(gw, &[lat_dim.as_str(), "lon"], &[nlat, nlon])?;
    let total: f64 = spread.iter().filter(|v| !v.is_nan()).sum();
    if total <= 0.0 {
        return Err(TseriesError::InvalidFormat("gw sums to a non-positive value".into()));
    }
    let scale = area_earth() / total;
    debug!(scale, "Normalized atm area weight");
    let area = Variable::new(&[lat_dim.as_str(), "lon"], spread * scale)?;
    Ok(area.with_attr("units", "m2"))
}

/// Weight field for `component` given the dimensions being reduced.
pub fn get_weight(ds: &Dataset, component: Component, reduce_dims: &[String]) -> TseriesResult<Variable> {
    (crate::registry::strategy(component).weight)(ds, reduce_dims)
}
