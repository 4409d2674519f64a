//! Known unit symbols with their dimensions and SI scale factors.
//!
//! Factors convert FROM the registered unit TO SI base units
//! (kg, m, s, mol, K). Model-world years are 365-day `common_year`s.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Exponents of (length, mass, time, amount, temperature).
pub type Dimension = [i8; 5];

pub const DIMENSIONLESS: Dimension = [0, 0, 0, 0, 0];
const LENGTH: Dimension = [1, 0, 0, 0, 0];
const MASS: Dimension = [0, 1, 0, 0, 0];
const TIME: Dimension = [0, 0, 1, 0, 0];
const AMOUNT: Dimension = [0, 0, 0, 1, 0];
const TEMPERATURE: Dimension = [0, 0, 0, 0, 1];

const SECONDS_PER_DAY: f64 = 86400.0;

/// Registry entry for a unit symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitInfo {
    pub dimension: Dimension,
    pub to_si: f64,
    /// Additive offset to the SI unit (degC -> K).
    pub offset: f64,
}

impl UnitInfo {
    const fn new(dimension: Dimension, to_si: f64) -> Self {
        Self {
            dimension,
            to_si,
            offset: 0.0,
        }
    }
}

/// SI prefixes, spelled-out names first, then symbols longest first.
static SI_PREFIXES: &[(&str, f64)] = &[
    ("peta", 1e15),
    ("tera", 1e12),
    ("giga", 1e9),
    ("mega", 1e6),
    ("kilo", 1e3),
    ("centi", 1e-2),
    ("milli", 1e-3),
    ("micro", 1e-6),
    ("nano", 1e-9),
    ("da", 1e1),
    ("Y", 1e24),
    ("Z", 1e21),
    ("E", 1e18),
    ("P", 1e15),
    ("T", 1e12),
    ("G", 1e9),
    ("M", 1e6),
    ("k", 1e3),
    ("h", 1e2),
    ("d", 1e-1),
    ("c", 1e-2),
    ("m", 1e-3),
    ("u", 1e-6),
    ("µ", 1e-6),
    ("n", 1e-9),
    ("p", 1e-12),
    ("f", 1e-15),
    ("a", 1e-18),
];

pub static UNIT_REGISTRY: LazyLock<UnitRegistry> = LazyLock::new(UnitRegistry::new);

/// Symbol table used for unit normalization and conversion.
#[derive(Debug)]
pub struct UnitRegistry {
    units: HashMap<&'static str, UnitInfo>,
    aliases: HashMap<&'static str, &'static str>,
}

impl UnitRegistry {
    fn new() -> Self {
        let mut registry = Self {
            units: HashMap::new(),
            aliases: HashMap::new(),
        };

        // base
        registry.add("m", UnitInfo::new(LENGTH, 1.0));
        registry.add("g", UnitInfo::new(MASS, 1e-3));
        registry.add("s", UnitInfo::new(TIME, 1.0));
        registry.add("mol", UnitInfo::new(AMOUNT, 1.0));
        registry.add("eq", UnitInfo::new(AMOUNT, 1.0));
        registry.add("K", UnitInfo::new(TEMPERATURE, 1.0));
        registry.add(
            "degC",
            UnitInfo {
                dimension: TEMPERATURE,
                to_si: 1.0,
                offset: 273.15,
            },
        );

        // time
        registry.add("min", UnitInfo::new(TIME, 60.0));
        registry.add("hr", UnitInfo::new(TIME, 3600.0));
        registry.add("day", UnitInfo::new(TIME, SECONDS_PER_DAY));
        registry.add("common_year", UnitInfo::new(TIME, 365.0 * SECONDS_PER_DAY));

        // derived
        registry.add("L", UnitInfo::new([3, 0, 0, 0, 0], 1e-3));
        registry.add("Sv", UnitInfo::new([3, 0, -1, 0, 0], 1e6));
        registry.add("N", UnitInfo::new([1, 1, -2, 0, 0], 1.0));
        registry.add("Pa", UnitInfo::new([-1, 1, -2, 0, 0], 1.0));
        registry.add("bar", UnitInfo::new([-1, 1, -2, 0, 0], 1e5));
        registry.add("atm", UnitInfo::new([-1, 1, -2, 0, 0], 101325.0));
        registry.add("J", UnitInfo::new([2, 1, -2, 0, 0], 1.0));
        registry.add("W", UnitInfo::new([2, 1, -3, 0, 0], 1.0));

        // dimensionless
        registry.add("1", UnitInfo::new(DIMENSIONLESS, 1.0));
        registry.add("percent", UnitInfo::new(DIMENSIONLESS, 1e-2));
        registry.add("ppm", UnitInfo::new(DIMENSIONLESS, 1e-6));
        registry.add("ppb", UnitInfo::new(DIMENSIONLESS, 1e-9));
        registry.add("ppt", UnitInfo::new(DIMENSIONLESS, 1e-12));
        registry.add("fraction", UnitInfo::new(DIMENSIONLESS, 1.0));

        for (alias, canonical) in [
            ("meter", "m"),
            ("metre", "m"),
            ("gram", "g"),
            ("second", "s"),
            ("sec", "s"),
            ("mole", "mol"),
            ("kelvin", "K"),
            ("degK", "K"),
            ("celsius", "degC"),
            ("deg_C", "degC"),
            ("minute", "min"),
            ("h", "hr"),
            ("hour", "hr"),
            ("d", "day"),
            ("yr", "common_year"),
            ("year", "common_year"),
            ("liter", "L"),
            ("litre", "L"),
            ("l", "L"),
            ("%", "percent"),
            ("ppmv", "ppm"),
            ("ppbv", "ppb"),
            ("pptv", "ppt"),
            ("unitless", "1"),
        ] {
            registry.aliases.insert(alias, canonical);
        }

        registry
    }

    fn add(&mut self, symbol: &'static str, info: UnitInfo) {
        self.units.insert(symbol, info);
    }

    fn exact(&self, symbol: &str) -> Option<(&'static str, UnitInfo)> {
        if let Some((&name, info)) = self.units.get_key_value(symbol) {
            return Some((name, *info));
        }
        let canonical = *self.aliases.get(symbol)?;
        self.units.get(canonical).map(|info| (canonical, *info))
    }

    /// Split a symbol into its canonical base symbol and prefix factor.
    ///
    /// Exact names win over prefixed readings (`min` is minutes, not
    /// milli-inches) and a trailing plural `s` is accepted (`common_years`).
    pub fn split(&self, symbol: &str) -> Option<(&'static str, f64)> {
        if let Some((name, _)) = self.exact(symbol) {
            return Some((name, 1.0));
        }
        for (prefix, factor) in SI_PREFIXES {
            if let Some(rest) = symbol.strip_prefix(prefix) {
                if let Some((name, info)) = self.exact(rest) {
                    // offsets do not combine with prefixes
                    if info.offset == 0.0 {
                        return Some((name, *factor));
                    }
                }
            }
        }
        if symbol.len() > 1 {
            if let Some(singular) = symbol.strip_suffix('s') {
                return self.split(singular);
            }
        }
        None
    }

    /// Dimension, SI factor and offset of a possibly prefixed symbol.
    pub fn lookup(&self, symbol: &str) -> Option<UnitInfo> {
        let (base, prefix) = self.split(symbol)?;
        let info = self.units.get(base)?;
        Some(UnitInfo {
            dimension: info.dimension,
            to_si: info.to_si * prefix,
            offset: info.offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_lookup() {
        assert_eq!(UNIT_REGISTRY.split("cm"), Some(("m", 1e-2)));
        assert_eq!(UNIT_REGISTRY.split("mmol"), Some(("mol", 1e-3)));
        assert_eq!(UNIT_REGISTRY.split("Pg"), Some(("g", 1e15)));
        assert_eq!(UNIT_REGISTRY.split("min"), Some(("min", 1.0)));
        assert_eq!(UNIT_REGISTRY.split("centimeter"), Some(("m", 1e-2)));
        assert_eq!(UNIT_REGISTRY.split("common_years"), Some(("common_year", 1.0)));
        assert!(UNIT_REGISTRY.split("degrees_north").is_none());
    }

    #[test]
    fn test_lookup_scales() {
        let kg = UNIT_REGISTRY.lookup("kg").unwrap();
        assert_eq!(kg.dimension, MASS);
        assert!((kg.to_si - 1.0).abs() < 1e-15);
        let yr = UNIT_REGISTRY.lookup("yr").unwrap();
        assert_eq!(yr.to_si, 31536000.0);
    }
}
