//! Unit strings: cleanup of CESM spellings, algebra and conversion.
//!
//! A [`Unit`] is a numeric factor times a product of symbols with integer
//! exponents. Symbols sharing a registered base (`cm` and `m`, `g` and `Pg`)
//! are folded together when units are combined, so that
//! `(cm3)(mmol/cm3)` normalizes to `mmol`.

mod parser;
mod registry;

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{TseriesError, TseriesResult};
use parser::UnitParser;
pub use registry::{Dimension, UnitInfo, DIMENSIONLESS, UNIT_REGISTRY};

/// Substring rewrites applied in order by [`clean_units`].
///
/// `degC` is parked under a placeholder so the `gC` rule cannot touch it.
const CLEAN_UNITS_REPLACEMENTS: [(&str, &str); 8] = [
    ("degC", "XXXX"),
    ("gC", "g"),
    ("gN", "g"),
    ("year", "common_year"),
    ("yr", "common_year"),
    ("meq", "mmol"),
    ("neq", "nmol"),
    ("XXXX", "degC"),
];

/// Rewrite CESM unit spellings into parseable, model-calendar-aware ones.
pub fn clean_units(units: &str) -> String {
    CLEAN_UNITS_REPLACEMENTS
        .iter()
        .fold(units.to_string(), |acc, (from, to)| acc.replace(from, to))
}

/// A parsed unit expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    factor: f64,
    components: BTreeMap<String, i32>,
}

impl Unit {
    /// Dimensionless unit `1`.
    pub fn one() -> Self {
        Self::scalar(1.0)
    }

    pub fn scalar(factor: f64) -> Self {
        Self {
            factor,
            components: BTreeMap::new(),
        }
    }

    pub fn symbol(symbol: &str, exp: i32) -> Self {
        let mut unit = Self::one();
        if symbol != "1" && exp != 0 {
            unit.components.insert(symbol.to_string(), exp);
        }
        unit
    }

    /// Parse a unit string. Unknown symbols are kept verbatim.
    pub fn parse(input: &str) -> TseriesResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(TseriesError::invalid_units(input, "empty unit string"));
        }
        UnitParser::new(trimmed).parse()
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn components(&self) -> &BTreeMap<String, i32> {
        &self.components
    }

    pub fn is_dimensionless(&self) -> bool {
        self.components.is_empty()
    }

    /// Product of two units, folding symbols that share a base.
    pub fn mul(&self, other: &Unit) -> Unit {
        let mut result = self.clone();
        result.factor *= other.factor;
        for (symbol, &exp) in &other.components {
            result.merge_term(symbol, exp);
        }
        result
    }

    pub fn div(&self, other: &Unit) -> Unit {
        self.mul(&other.pow(-1))
    }

    pub fn pow(&self, exp: i32) -> Unit {
        Unit {
            factor: self.factor.powi(exp),
            components: self
                .components
                .iter()
                .map(|(s, e)| (s.clone(), e * exp))
                .filter(|(_, e)| *e != 0)
                .collect(),
        }
    }

    fn merge_term(&mut self, symbol: &str, exp: i32) {
        if let Some(e) = self.components.get_mut(symbol) {
            *e += exp;
        } else if let Some((base, prefix)) = UNIT_REGISTRY.split(symbol) {
            let existing = self.components.keys().find_map(|k| {
                UNIT_REGISTRY
                    .split(k)
                    .filter(|(b, _)| *b == base)
                    .map(|(_, p)| (k.clone(), p))
            });
            match existing {
                Some((key, existing_prefix)) => {
                    self.factor *= (prefix / existing_prefix).powi(exp);
                    if let Some(e) = self.components.get_mut(&key) {
                        *e += exp;
                    }
                }
                None => {
                    self.components.insert(symbol.to_string(), exp);
                }
            }
        } else {
            self.components.insert(symbol.to_string(), exp);
        }
        self.components.retain(|_, e| *e != 0);
    }

    /// Physical dimension and SI scale, or an error naming the first unknown symbol.
    fn si(&self) -> TseriesResult<(Dimension, f64)> {
        let mut dim = DIMENSIONLESS;
        let mut scale = self.factor;
        for (symbol, &exp) in &self.components {
            let info = UNIT_REGISTRY
                .lookup(symbol)
                .ok_or_else(|| TseriesError::invalid_units(self.to_string(), format!("unknown symbol '{}'", symbol)))?;
            for (d, di) in dim.iter_mut().zip(info.dimension.iter()) {
                *d += di * exp as i8;
            }
            scale *= info.to_si.powi(exp);
        }
        Ok((dim, scale))
    }

    /// Offset of a lone affine temperature symbol (`degC`), if that is what this is.
    fn affine_offset(&self) -> Option<f64> {
        if self.factor != 1.0 || self.components.len() != 1 {
            return None;
        }
        let (symbol, &exp) = self.components.iter().next()?;
        let info = UNIT_REGISTRY.lookup(symbol)?;
        (exp == 1 && info.dimension == [0, 0, 0, 0, 1]).then_some(info.offset)
    }

    /// Multiplier taking values in `self` to values in `to`.
    pub fn conversion_factor(&self, to: &Unit) -> TseriesResult<f64> {
        let (from_dim, from_scale) = self.si()?;
        let (to_dim, to_scale) = to.si()?;
        if from_dim != to_dim {
            return Err(TseriesError::IncompatibleUnits {
                from: self.to_string(),
                to: to.to_string(),
            });
        }
        Ok(from_scale / to_scale)
    }

    /// Convert values in place; temperatures get their offsets applied.
    pub fn convert_values(&self, to: &Unit, values: &mut [f64]) -> TseriesResult<()> {
        let factor = self.conversion_factor(to)?;
        let offsets = self.affine_offset().zip(to.affine_offset());
        for v in values.iter_mut() {
            *v = match offsets {
                Some((from_off, to_off)) => (*v + from_off) - to_off,
                None => *v * factor,
            };
        }
        Ok(())
    }
}

fn format_factor(f: f64) -> String {
    // 12 significant digits hides the round-off of prefix folding
    let rounded: f64 = format!("{:.11e}", f).parse().unwrap_or(f);
    if rounded != 0.0 && (rounded.abs() < 1e-3 || rounded.abs() >= 1e6) {
        format!("{:e}", rounded)
    } else {
        format!("{}", rounded)
    }
}

impl fmt::Display for Unit {
    /// Canonical form: factor, positive exponents, then negative exponents.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        let factor = format_factor(self.factor);
        if factor != "1" || self.components.is_empty() {
            parts.push(factor);
        }
        let term = |s: &str, e: i32| if e == 1 { s.to_string() } else { format!("{}{}", s, e) };
        for positive in [true, false] {
            for (symbol, &exp) in &self.components {
                if (exp > 0) == positive {
                    parts.push(term(symbol.as_str(), exp));
                }
            }
        }
        f.write_str(&parts.join(" "))
    }
}

/// Normalize a unit string, e.g. `"(cm^2)(mmol/m^3 cm/s)"` to `"1e-6 mmol s-1"`.
pub fn format_units(units: &str) -> TseriesResult<String> {
    Ok(Unit::parse(units)?.to_string())
}

/// Normalized product of two unit strings.
pub fn multiply_units(a: &str, b: &str) -> TseriesResult<String> {
    Ok(Unit::parse(a)?.mul(&Unit::parse(b)?).to_string())
}
