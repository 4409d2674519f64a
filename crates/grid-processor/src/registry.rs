//! Per-component grid strategies.

use cesm_common::{Component, TseriesResult};
use nc_dataset::{Dataset, Variable};

use crate::regions::{self, RegionMask};
use crate::weights;

pub type WeightFn = fn(&Dataset, &[String]) -> TseriesResult<Variable>;
pub type RegionMaskFn = fn(&Dataset) -> TseriesResult<RegionMask>;
pub type DropListFn = fn(&Dataset, &str) -> Vec<String>;

/// Everything the generator needs to know about a component's grid.
pub struct ComponentStrategy {
    pub component: Component,
    pub weight: WeightFn,
    pub region_mask: RegionMaskFn,
    /// Variables to drop when opening the files of `varname`.
    pub drop_vars: DropListFn,
    /// Auxiliary variables copied into generated datasets when present.
    pub copy_vars: &'static [&'static str],
    /// Lateral grid axes, for nearest-cell lookup.
    pub point_lookup: PointLookup,
}

/// How grid cell coordinates are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointLookup {
    /// 1-D `lat` and `lon` coordinates.
    Rectilinear { lat: &'static str, lon: &'static str },
    /// 2-D curvilinear cell centers.
    Curvilinear { lat: &'static str, lon: &'static str },
}

const LND_TIME_CONSTANT_3D: [&str; 8] = ["ZSOI", "DZSOI", "WATSAT", "SUCSAT", "BSW", "HKSAT", "ZLAKE", "DZLAKE"];

const OCN_COORDS: [&str; 4] = ["TLAT", "TLONG", "ULAT", "ULONG"];

fn no_drops(_ds: &Dataset, _varname: &str) -> Vec<String> {
    Vec::new()
}

fn lnd_drops(ds: &Dataset, _varname: &str) -> Vec<String> {
    LND_TIME_CONSTANT_3D
        .iter()
        .filter(|name| ds.contains(name))
        .map(|name| name.to_string())
        .collect()
}

/// Ocean coordinates the variable does not use, and every variable that
/// references one of them.
fn ocn_drops(ds: &Dataset, varname: &str) -> Vec<String> {
    let Some(coords) = ds.get(varname).and_then(|v| v.encoding.coordinates.as_deref()) else {
        return Vec::new();
    };
    let used: Vec<&str> = coords.split_whitespace().collect();
    let mut drops: Vec<String> = OCN_COORDS
        .iter()
        .filter(|c| !used.contains(c))
        .map(|c| c.to_string())
        .collect();
    let referencing: Vec<String> = ds
        .iter()
        .filter(|(_, var)| {
            var.encoding
                .coordinates
                .as_deref()
                .is_some_and(|c| c.split_whitespace().any(|tok| drops.iter().any(|d| d == tok)))
        })
        .map(|(name, _)| name.to_string())
        .collect();
    drops.extend(referencing);
    drops
}

static ATM: ComponentStrategy = ComponentStrategy {
    component: Component::Atm,
    weight: weights::atm_weight,
    region_mask: regions::atm_region_mask,
    drop_vars: no_drops,
    copy_vars: &[
        "P0", "hyai", "hyam", "hybi", "hybm", "co2vmr", "ch4vmr", "f11vmr", "f12vmr", "n2ovmr", "sol_tsi",
    ],
    point_lookup: PointLookup::Rectilinear { lat: "lat", lon: "lon" },
};

static OCN: ComponentStrategy = ComponentStrategy {
    component: Component::Ocn,
    weight: weights::ocn_weight,
    region_mask: regions::ocn_region_mask,
    drop_vars: ocn_drops,
    copy_vars: &[],
    point_lookup: PointLookup::Curvilinear { lat: "TLAT", lon: "TLONG" },
};

static ICE: ComponentStrategy = ComponentStrategy {
    component: Component::Ice,
    weight: weights::ice_weight,
    region_mask: regions::ice_region_mask,
    drop_vars: no_drops,
    copy_vars: &[],
    point_lookup: PointLookup::Curvilinear { lat: "TLAT", lon: "TLON" },
};

static LND: ComponentStrategy = ComponentStrategy {
    component: Component::Lnd,
    weight: weights::lnd_weight,
    region_mask: regions::lnd_region_mask,
    drop_vars: lnd_drops,
    copy_vars: &[],
    point_lookup: PointLookup::Rectilinear { lat: "lat", lon: "lon" },
};

pub fn strategy(component: Component) -> &'static ComponentStrategy {
    match component {
        Component::Atm => &ATM,
        Component::Ocn => &OCN,
        Component::Ice => &ICE,
        Component::Lnd => &LND,
    }
}

/// Variables to drop when opening files of `varname`.
pub fn drop_var_names(component: Component, ds: &Dataset, varname: &str) -> Vec<String> {
    (strategy(component).drop_vars)(ds, varname)
}

pub fn copy_var_names(component: Component) -> &'static [&'static str] {
    strategy(component).copy_vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use nc_dataset::Variable;
    use test_utils::fixtures;

    #[test]
    fn test_every_component_registered() {
        for c in Component::ALL {
            assert_eq!(strategy(c).component, c);
        }
        assert_eq!(copy_var_names(Component::Atm).len(), 11);
        assert!(copy_var_names(Component::Ocn).is_empty());
    }

    #[test]
    fn test_ocn_drops_unused_coordinates() {
        let mut ds = fixtures::ocn_grid(1, 2, 2);
        let mut fg = Variable::from_vec(&["nlat", "nlon"], &[2, 2], vec![0.0; 4]).unwrap();
        fg.encoding.coordinates = Some("TLONG TLAT time".into());
        ds.insert("FG_CO2", fg).unwrap();
        let mut uvel = Variable::from_vec(&["nlat", "nlon"], &[2, 2], vec![0.0; 4]).unwrap();
        uvel.encoding.coordinates = Some("ULONG ULAT time".into());
        ds.insert("UVEL", uvel).unwrap();

        let drops = drop_var_names(Component::Ocn, &ds, "FG_CO2");
        assert!(drops.contains(&"ULAT".to_string()));
        assert!(drops.contains(&"ULONG".to_string()));
        assert!(drops.contains(&"UVEL".to_string()));
        assert!(!drops.contains(&"TLAT".to_string()));
        assert!(!drops.contains(&"FG_CO2".to_string()));
    }

    #[test]
    fn test_lnd_drops_present_soil_fields() {
        let mut ds = fixtures::lnd_grid(2, 2);
        ds.insert("ZSOI", Variable::from_values("levgrnd", vec![0.1, 0.3])).unwrap();
        assert_eq!(drop_var_names(Component::Lnd, &ds, "GPP"), vec!["ZSOI"]);
    }
}
