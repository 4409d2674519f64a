//! Physical constants shared with the CESM coupler (shr_const_mod).
//!
//! Every derived quantity (e.g. the surface area of the Earth used to
//! normalize atmosphere weights) is computed from this table.

/// A named physical constant with CF-style metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalConstant {
    pub name: &'static str,
    pub value: f64,
    pub long_name: &'static str,
    pub units: &'static str,
}

pub const PI: PhysicalConstant = PhysicalConstant {
    name: "pi",
    value: 3.14159265358979323846,
    long_name: "pi",
    units: "1",
};

pub const G: PhysicalConstant = PhysicalConstant {
    name: "g",
    value: 9.80616,
    long_name: "acceleration from Earth's gravity",
    units: "m/s2",
};

pub const REARTH: PhysicalConstant = PhysicalConstant {
    name: "rearth",
    value: 6.37122e6,
    long_name: "Earth's radius",
    units: "m",
};

pub const MWDAIR: PhysicalConstant = PhysicalConstant {
    name: "mwdair",
    value: 28.966,
    long_name: "molecular weight of dry air",
    units: "g/mol",
};

const ALL: [PhysicalConstant; 4] = [PI, G, REARTH, MWDAIR];

/// Look up a constant by its shr_const name.
pub fn shr_const(name: &str) -> Option<PhysicalConstant> {
    ALL.iter().copied().find(|c| c.name == name)
}

/// Surface area of the Earth [m2].
pub fn area_earth() -> f64 {
    4.0 * PI.value * REARTH.value * REARTH.value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(shr_const("rearth").map(|c| c.value), Some(6.37122e6));
        assert_eq!(shr_const("mwdair").map(|c| c.units), Some("g/mol"));
        assert!(shr_const("cpdair").is_none());
    }

    #[test]
    fn test_area_earth() {
        let expected = 4.0 * std::f64::consts::PI * 6.37122e6_f64.powi(2);
        assert!((area_earth() - expected).abs() / expected < 1e-15);
    }
}
