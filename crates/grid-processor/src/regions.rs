//! Named region masks per component.
//!
//! Each component has a fixed, ordered table of regions. A region is a
//! predicate on the grid fields of a single lateral cell; boundaries are
//! half-open. Comparisons with missing (NaN) fields are false, so cells with
//! missing coordinates fall outside every latitude/longitude band.

use cesm_common::{Component, TseriesError, TseriesResult};
use nc_dataset::ops::broadcast_to;
use nc_dataset::{Dataset, Variable};
use ndarray::{Array3, ArrayD};
use tracing::debug;

use crate::weights::dim_cnt_check;

pub const REGION_DIM: &str = "region";

/// Grid fields for one lateral cell. Fields a component does not use are NaN.
#[derive(Debug, Clone, Copy)]
pub struct GridCell {
    pub lat: f64,
    pub lon: f64,
    /// Number of active ocean levels, missing treated as 0.
    pub kmt: f64,
    /// POP basin index, missing treated as 0.
    pub region_mask: f64,
    pub tmask: f64,
    pub landfrac: f64,
}

impl Default for GridCell {
    fn default() -> Self {
        Self {
            lat: f64::NAN,
            lon: f64::NAN,
            kmt: 0.0,
            region_mask: 0.0,
            tmask: f64::NAN,
            landfrac: f64::NAN,
        }
    }
}

pub type RegionPredicate = fn(&GridCell) -> bool;

fn lat_in(c: &GridCell, lo: f64, hi: f64) -> bool {
    c.lat >= lo && c.lat < hi
}

fn lon_in(c: &GridCell, lo: f64, hi: f64) -> bool {
    c.lon >= lo && c.lon < hi
}

fn atl(c: &GridCell) -> bool {
    c.lon < 20.0 || c.lon >= 291.0
}

fn ind(c: &GridCell) -> bool {
    lon_in(c, 20.0, 147.0)
}

fn pac(c: &GridCell) -> bool {
    lon_in(c, 147.0, 291.0)
}

fn atl_basin(c: &GridCell) -> bool {
    c.region_mask >= 6.0 && c.region_mask < 9.0
}

fn ocean(c: &GridCell) -> bool {
    c.kmt > 0.0
}

pub static OCN_REGIONS: &[(&str, RegionPredicate)] = &[
    ("Global", |c| ocean(c)),
    ("SouOce (90S-30S)", |c| ocean(c) && c.lat < -30.0),
    ("SH_high_lat (90S-44S)", |c| ocean(c) && c.lat < -44.0),
    ("SH_high_lat_ATL (90S-44S)", |c| ocean(c) && c.lat < -44.0 && atl(c)),
    ("SH_high_lat_IND (90S-44S)", |c| ocean(c) && c.lat < -44.0 && ind(c)),
    ("SH_high_lat_PAC (90S-44S)", |c| ocean(c) && c.lat < -44.0 && pac(c)),
    ("SH_mid_lat_ATL (44S-18S)", |c| ocean(c) && lat_in(c, -44.0, -18.0) && atl(c)),
    ("SH_mid_lat_IND (44S-18S)", |c| ocean(c) && lat_in(c, -44.0, -18.0) && ind(c)),
    ("SH_mid_lat_PAC (44S-18S)", |c| ocean(c) && lat_in(c, -44.0, -18.0) && pac(c)),
    ("low_lat_ATL (18S-18N)", |c| ocean(c) && lat_in(c, -18.0, 18.0) && c.region_mask == 6.0),
    ("low_lat_IND (18S-27N)", |c| ocean(c) && lat_in(c, -18.0, 18.0) && c.region_mask == 3.0),
    ("low_lat_PAC (18S-18N)", |c| ocean(c) && lat_in(c, -18.0, 18.0) && c.region_mask == 2.0),
    ("NH_mid_lat_ATL (18N-45N)", |c| ocean(c) && lat_in(c, 18.0, 45.0) && atl_basin(c)),
    ("NH_mid_lat_PAC (18N-45N)", |c| ocean(c) && lat_in(c, 18.0, 45.0) && c.region_mask == 2.0),
    ("NH_subpolar_ATL (45N-90N)", |c| ocean(c) && c.lat >= 45.0 && atl_basin(c)),
    ("NH_high_lat_PAC (45N-90N)", |c| ocean(c) && c.lat >= 45.0 && c.region_mask == 2.0),
    ("GIN", |c| ocean(c) && c.region_mask == 9.0),
    ("ARC", |c| ocean(c) && c.region_mask == 10.0),
];

pub static ICE_REGIONS: &[(&str, RegionPredicate)] = &[
    ("NH", |c| c.tmask == 1.0 && c.lat >= 0.0),
    ("SH", |c| c.tmask == 1.0 && c.lat < 0.0),
];

fn land(c: &GridCell) -> bool {
    c.landfrac > 0.0
}

pub static LND_REGIONS: &[(&str, RegionPredicate)] = &[
    ("Global", |c| land(c)),
    ("CentralAfrica", |c| land(c) && lat_in(c, -10.0, 10.0) && lon_in(c, 0.0, 55.0)),
    ("MaritimeContinent", |c| land(c) && lat_in(c, -11.0, 8.0) && lon_in(c, 90.0, 160.0)),
    ("Australia", |c| land(c) && lat_in(c, -45.0, -11.0) && lon_in(c, 110.0, 160.0)),
    ("TropSAmer", |c| land(c) && lat_in(c, -15.0, 15.0) && lon_in(c, 278.0, 330.0)),
    ("SSAmer", |c| land(c) && lat_in(c, -60.0, -15.0) && lon_in(c, 278.0, 330.0)),
];

// atm boxes use open intervals
pub static ATM_REGIONS: &[(&str, RegionPredicate)] = &[
    ("Global", |c| c.lat > -100.0 && c.lon > -400.0),
    ("SH", |c| c.lat < 0.0 && c.lon > -400.0),
    ("SH_Trop", |c| c.lat > -30.0 && c.lat < 0.0 && c.lon > -400.0),
    ("NH", |c| c.lat > 0.0 && c.lon > -400.0),
    ("NH_Trop", |c| c.lat > 0.0 && c.lat < 30.0 && c.lon > -400.0),
    ("nino34", |c| c.lat > -5.0 && c.lat < 5.0 && c.lon > 190.0 && c.lon < 240.0),
];

/// Region stack over the lateral grid.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionMask {
    pub names: Vec<String>,
    /// Dimensions `(region, y, x)`, values 0 or 1.
    pub mask: Variable,
}

impl RegionMask {
    /// Region-name coordinate variable.
    pub fn region_coord(&self) -> Variable {
        Variable::text(REGION_DIM, self.names.clone())
    }

    pub fn lateral_dims(&self) -> &[String] {
        &self.mask.dims[1..]
    }
}

/// Which grid field fills which member of [`GridCell`].
#[derive(Default)]
struct CellFields<'a> {
    lat: Option<&'a str>,
    lon: Option<&'a str>,
    kmt: Option<&'a str>,
    region_mask: Option<&'a str>,
    tmask: Option<&'a str>,
    landfrac: Option<&'a str>,
}

fn field_values(ds: &Dataset, name: Option<&str>, dims: &[String], sizes: &[usize], missing_as: f64) -> TseriesResult<Option<Vec<f64>>> {
    let Some(name) = name else {
        return Ok(None);
    };
    let var = ds.var(name)?;
    let full: ArrayD<f64> = broadcast_to(var, dims, sizes)?;
    Ok(Some(
        full.iter()
            .map(|&v| if v.is_nan() { missing_as } else { v })
            .collect(),
    ))
}

fn build_mask(
    ds: &Dataset,
    lateral_dims: &[String],
    fields: CellFields<'_>,
    table: &[(&str, RegionPredicate)],
) -> TseriesResult<RegionMask> {
    if lateral_dims.len() != 2 {
        return Err(TseriesError::dimension_mismatch("lateral grid", 2, lateral_dims.len()));
    }
    let sizes = lateral_dims
        .iter()
        .map(|d| {
            ds.dim_size(d)
                .ok_or_else(|| TseriesError::MissingVariable(d.clone()))
        })
        .collect::<TseriesResult<Vec<_>>>()?;
    let ncell = sizes[0] * sizes[1];

    let lat = field_values(ds, fields.lat, lateral_dims, &sizes, f64::NAN)?;
    let lon = field_values(ds, fields.lon, lateral_dims, &sizes, f64::NAN)?;
    let kmt = field_values(ds, fields.kmt, lateral_dims, &sizes, 0.0)?;
    let region_mask = field_values(ds, fields.region_mask, lateral_dims, &sizes, 0.0)?;
    let tmask = field_values(ds, fields.tmask, lateral_dims, &sizes, f64::NAN)?;
    let landfrac = field_values(ds, fields.landfrac, lateral_dims, &sizes, f64::NAN)?;
    let at = |f: &Option<Vec<f64>>, i: usize, default: f64| f.as_ref().map_or(default, |v| v[i]);

    let mut mask = Array3::<f64>::zeros((table.len(), sizes[0], sizes[1]));
    for i in 0..ncell {
        let cell = GridCell {
            lat: at(&lat, i, f64::NAN),
            lon: at(&lon, i, f64::NAN),
            kmt: at(&kmt, i, 0.0),
            region_mask: at(&region_mask, i, 0.0),
            tmask: at(&tmask, i, f64::NAN),
            landfrac: at(&landfrac, i, f64::NAN),
        };
        let (y, x) = (i / sizes[1], i % sizes[1]);
        for (r, (_, pred)) in table.iter().enumerate() {
            if pred(&cell) {
                mask[[r, y, x]] = 1.0;
            }
        }
    }

    let mut dims = vec![REGION_DIM.to_string()];
    dims.extend(lateral_dims.iter().cloned());
    let names: Vec<String> = table.iter().map(|(n, _)| n.to_string()).collect();
    debug!(regions = names.len(), "Region mask created");
    Ok(RegionMask {
        names,
        mask: Variable::new(&dims, mask.into_dyn())?,
    })
}

pub fn ocn_region_mask(ds: &Dataset) -> TseriesResult<RegionMask> {
    let kmt = dim_cnt_check(ds, "KMT", 2)?;
    let region_mask = ds.contains("REGION_MASK").then_some("REGION_MASK");
    build_mask(
        ds,
        &kmt.dims.clone(),
        CellFields {
            lat: Some("TLAT"),
            lon: Some("TLONG"),
            kmt: Some("KMT"),
            region_mask,
            ..Default::default()
        },
        OCN_REGIONS,
    )
}

pub fn ice_region_mask(ds: &Dataset) -> TseriesResult<RegionMask> {
    let tmask = dim_cnt_check(ds, "tmask", 2)?;
    dim_cnt_check(ds, "TLAT", 2)?;
    build_mask(
        ds,
        &tmask.dims.clone(),
        CellFields {
            lat: Some("TLAT"),
            tmask: Some("tmask"),
            ..Default::default()
        },
        ICE_REGIONS,
    )
}

pub fn lnd_region_mask(ds: &Dataset) -> TseriesResult<RegionMask> {
    let landfrac = dim_cnt_check(ds, "landfrac", 2)?;
    build_mask(
        ds,
        &landfrac.dims.clone(),
        CellFields {
            lat: Some("lat"),
            lon: Some("lon"),
            landfrac: Some("landfrac"),
            ..Default::default()
        },
        LND_REGIONS,
    )
}

pub fn atm_region_mask(ds: &Dataset) -> TseriesResult<RegionMask> {
    dim_cnt_check(ds, "gw", 1)?;
    build_mask(
        ds,
        &["lat".to_string(), "lon".to_string()],
        CellFields {
            lat: Some("lat"),
            lon: Some("lon"),
            ..Default::default()
        },
        ATM_REGIONS,
    )
}

/// Region mask for `component`.
pub fn get_region_mask(ds: &Dataset, component: Component) -> TseriesResult<RegionMask> {
    (crate::registry::strategy(component).region_mask)(ds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::fixtures;

    fn count(mask: &RegionMask, name: &str) -> f64 {
        let r = mask.names.iter().position(|n| n == name).unwrap();
        mask.mask.isel(REGION_DIM, r).unwrap().values().unwrap().sum()
    }

    #[test]
    fn test_region_order_and_shape() {
        let ds = fixtures::ocn_grid(2, 6, 8);
        let m = get_region_mask(&ds, Component::Ocn).unwrap();
        assert_eq!(m.names.len(), 18);
        assert_eq!(m.names[0], "Global");
        assert_eq!(m.names[17], "ARC");
        assert_eq!(m.mask.dims, vec!["region", "nlat", "nlon"]);
        assert_eq!(m.region_coord().shape(), vec![18]);
    }

    #[test]
    fn test_ocn_land_cells_excluded_everywhere() {
        let ds = fixtures::ocn_grid(2, 6, 8);
        let m = get_region_mask(&ds, Component::Ocn).unwrap();
        let kmt = ds.var("KMT").unwrap().values().unwrap().clone();
        let mask = m.mask.values().unwrap();
        for ((r, y, x), &v) in mask.indexed_iter().map(|(i, v)| ((i[0], i[1], i[2]), v)) {
            if !(kmt[[y, x]] > 0.0) {
                assert_eq!(v, 0.0, "region {} includes land cell ({}, {})", r, y, x);
            }
        }
    }

    #[test]
    fn test_ice_hemispheres_partition_active_cells() {
        let ds = fixtures::ice_grid(6, 4);
        let m = get_region_mask(&ds, Component::Ice).unwrap();
        let active = ds.var("tmask").unwrap().values().unwrap().iter().filter(|&&v| v == 1.0).count();
        assert_eq!(count(&m, "NH") + count(&m, "SH"), active as f64);
        let overlap = m.mask.isel(REGION_DIM, 0).unwrap().values().unwrap() * m.mask.isel(REGION_DIM, 1).unwrap().values().unwrap();
        assert_eq!(overlap.sum(), 0.0);
    }

    #[test]
    fn test_atm_hemispheres_exclusive() {
        let ds = fixtures::atm_grid(6, 12);
        let m = get_region_mask(&ds, Component::Atm).unwrap();
        assert_eq!(count(&m, "Global"), 72.0);
        assert_eq!(count(&m, "SH") + count(&m, "NH"), 72.0);
    }

    #[test]
    fn test_missing_coordinates_fall_outside_bands() {
        let mut ds = fixtures::ocn_grid(1, 4, 4);
        ds.get_mut("TLAT").unwrap().values_mut().unwrap().fill(f64::NAN);
        let m = get_region_mask(&ds, Component::Ocn).unwrap();
        assert!(count(&m, "Global") > 0.0);
        assert_eq!(count(&m, "SouOce (90S-30S)"), 0.0);
    }

    #[test]
    fn test_lnd_requires_landfrac() {
        let ds = fixtures::lnd_grid(4, 4).drop_vars(&["landfrac"]);
        assert!(matches!(
            get_region_mask(&ds, Component::Lnd),
            Err(TseriesError::MissingVariable(_))
        ));
    }
}
