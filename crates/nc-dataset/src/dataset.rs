//! Collections of variables sharing named dimensions.

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::PathBuf;

use cesm_common::{TseriesError, TseriesResult};

use crate::variable::{AttrValue, Attributes, Variable};

/// File-level encoding.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DatasetEncoding {
    pub unlimited_dims: Vec<String>,
    /// File the dataset was read from, if any.
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    variables: BTreeMap<String, Variable>,
    pub attrs: Attributes,
    pub encoding: DatasetEncoding,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a variable. Dimension lengths must agree with the
    /// variables already present.
    pub fn insert(&mut self, name: &str, var: Variable) -> TseriesResult<()> {
        let shape = var.shape();
        for (dim, &len) in var.dims.iter().zip(shape.iter()) {
            if let Some(existing) = self.dim_size_excluding(dim, name) {
                if existing != len {
                    return Err(TseriesError::DimensionMismatch {
                        variable: format!("{}({})", name, dim),
                        expected: existing,
                        found: len,
                    });
                }
            }
        }
        self.variables.insert(name.to_string(), var);
        Ok(())
    }

    pub fn with_var(mut self, name: &str, var: Variable) -> TseriesResult<Self> {
        self.insert(name, var)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.variables.get_mut(name)
    }

    /// Variable by name, or `MissingVariable`.
    pub fn var(&self, name: &str) -> TseriesResult<&Variable> {
        self.variables
            .get(name)
            .ok_or_else(|| TseriesError::MissingVariable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Variable> {
        self.variables.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Variable)> {
        self.variables.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// All dimensions with their lengths.
    pub fn dims(&self) -> BTreeMap<String, usize> {
        let mut dims = BTreeMap::new();
        for var in self.variables.values() {
            for (dim, len) in var.dims.iter().zip(var.shape()) {
                dims.entry(dim.clone()).or_insert(len);
            }
        }
        dims
    }

    pub fn dim_size(&self, dim: &str) -> Option<usize> {
        self.variables.values().find_map(|v| v.dim_size(dim))
    }

    fn dim_size_excluding(&self, dim: &str, skip: &str) -> Option<usize> {
        self.variables
            .iter()
            .filter(|(k, _)| k.as_str() != skip)
            .find_map(|(_, v)| v.dim_size(dim))
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(AttrValue::as_str)
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<AttrValue>) {
        self.attrs.insert(key.to_string(), value.into());
    }

    /// Keep only `names`, with global attrs and encoding.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> TseriesResult<Dataset> {
        let mut out = self.empty_like();
        for name in names {
            let name = name.as_ref();
            out.variables.insert(name.to_string(), self.var(name)?.clone());
        }
        Ok(out)
    }

    /// Like [`select`](Self::select) but silently skips names not present.
    pub fn select_existing<S: AsRef<str>>(&self, names: &[S]) -> Dataset {
        let mut out = self.empty_like();
        for name in names {
            if let Some(var) = self.variables.get(name.as_ref()) {
                out.variables.insert(name.as_ref().to_string(), var.clone());
            }
        }
        out
    }

    pub fn drop_vars<S: AsRef<str>>(&self, names: &[S]) -> Dataset {
        let mut out = self.clone();
        for name in names {
            out.variables.remove(name.as_ref());
        }
        out
    }

    /// Dataset with no variables but the same attrs and encoding.
    pub fn empty_like(&self) -> Dataset {
        Dataset {
            variables: BTreeMap::new(),
            attrs: self.attrs.clone(),
            encoding: self.encoding.clone(),
        }
    }

    /// Select one index along `dim` in every variable that has it.
    pub fn isel(&self, dim: &str, index: usize) -> TseriesResult<Dataset> {
        let mut out = self.empty_like();
        for (name, var) in &self.variables {
            let picked = if var.has_dim(dim) { var.isel(dim, index)? } else { var.clone() };
            out.variables.insert(name.clone(), picked);
        }
        Ok(out)
    }

    /// Keep `range` along `dim` in every variable that has it.
    pub fn slice(&self, dim: &str, range: Range<usize>) -> TseriesResult<Dataset> {
        let mut out = self.empty_like();
        for (name, var) in &self.variables {
            let part = if var.has_dim(dim) { var.slice(dim, range.clone())? } else { var.clone() };
            out.variables.insert(name.clone(), part);
        }
        Ok(out)
    }

    /// Merge variables from `others`; on name clashes the earliest wins.
    /// Global attrs and encoding come from `self`.
    pub fn merge(&self, others: &[&Dataset]) -> TseriesResult<Dataset> {
        let mut out = self.clone();
        for other in others {
            for (name, var) in &other.variables {
                if !out.variables.contains_key(name) {
                    out.insert(name, var.clone())?;
                }
            }
        }
        Ok(out)
    }

    /// Concatenate along `dim`.
    ///
    /// Variables that have `dim` are joined in order; all other variables
    /// are taken from the first dataset unchanged. Every piece must carry the
    /// same set of `dim`-dependent variables.
    pub fn concat(pieces: &[&Dataset], dim: &str) -> TseriesResult<Dataset> {
        let first = pieces
            .first()
            .ok_or_else(|| TseriesError::InvalidFormat("nothing to concatenate".into()))?;
        let mut out = first.empty_like();
        for (name, var) in &first.variables {
            if !var.has_dim(dim) {
                out.variables.insert(name.clone(), var.clone());
                continue;
            }
            let parts = pieces
                .iter()
                .map(|p| {
                    p.variables.get(name).ok_or_else(|| {
                        TseriesError::InvalidFormat(format!(
                            "variable '{}' missing from a piece concatenated along '{}'",
                            name, dim
                        ))
                    })
                })
                .collect::<TseriesResult<Vec<_>>>()?;
            out.variables.insert(name.clone(), Variable::concat(&parts, dim)?);
        }
        Ok(out)
    }

    /// Rename a variable in place of the old one.
    pub fn rename_var(&mut self, from: &str, to: &str) -> TseriesResult<()> {
        let var = self
            .variables
            .remove(from)
            .ok_or_else(|| TseriesError::MissingVariable(from.to_string()))?;
        self.variables.insert(to.to_string(), var);
        Ok(())
    }

    /// Structural equality that ignores the listed global attributes.
    pub fn identical_except(&self, other: &Dataset, ignore_attrs: &[&str]) -> bool {
        let strip = |attrs: &Attributes| -> Attributes {
            attrs
                .iter()
                .filter(|(k, _)| !ignore_attrs.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        self.variables == other.variables
            && strip(&self.attrs) == strip(&other.attrs)
            && self.encoding.unlimited_dims == other.encoding.unlimited_dims
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monthly(offset: f64, n: usize) -> Dataset {
        let time: Vec<f64> = (0..n).map(|i| offset + i as f64 * 30.0).collect();
        Dataset::new()
            .with_var("time", Variable::from_values("time", time))
            .unwrap()
            .with_var("TAREA", Variable::from_vec(&["nlat"], &[2], vec![1.0, 2.0]).unwrap())
            .unwrap()
            .with_var(
                "SST",
                Variable::from_vec(&["time", "nlat"], &[n, 2], vec![offset; n * 2]).unwrap(),
            )
            .unwrap()
    }

    #[test]
    fn test_insert_checks_dim_lengths() {
        let mut ds = monthly(0.0, 3);
        let bad = Variable::from_values("time", vec![0.0; 4]);
        assert!(matches!(ds.insert("other", bad), Err(TseriesError::DimensionMismatch { .. })));
        // replacements are checked against the other variables only
        ds.insert("TAREA", Variable::from_vec(&["nlat"], &[2], vec![5.0, 5.0]).unwrap())
            .unwrap();
        assert_eq!(ds.dims()["time"], 3);
    }

    #[test]
    fn test_concat_keeps_invariant_fields_from_first() {
        let a = monthly(0.0, 2);
        let mut b = monthly(60.0, 3);
        b.get_mut("TAREA").unwrap().values_mut().unwrap().fill(99.0);
        let joined = Dataset::concat(&[&a, &b], "time").unwrap();
        assert_eq!(joined.dim_size("time"), Some(5));
        assert_eq!(joined.var("TAREA").unwrap().shape(), vec![2]);
        assert_eq!(joined.var("TAREA").unwrap().values().unwrap()[[0]], 1.0);
    }

    #[test]
    fn test_concat_requires_time_vars_in_every_piece() {
        let a = monthly(0.0, 2);
        let b = monthly(60.0, 2).drop_vars(&["SST"]);
        assert!(Dataset::concat(&[&a, &b], "time").is_err());
    }

    #[test]
    fn test_merge_first_wins() {
        let a = monthly(0.0, 2);
        let mut b = monthly(0.0, 2);
        b.insert("extra", Variable::scalar(3.0)).unwrap();
        b.get_mut("SST").unwrap().values_mut().unwrap().fill(7.0);
        let merged = a.merge(&[&b]).unwrap();
        assert!(merged.contains("extra"));
        assert_eq!(merged.var("SST").unwrap().values().unwrap()[[0, 0]], 0.0);
    }

    #[test]
    fn test_missing_variable() {
        let err = monthly(0.0, 1).var("FG_CO2").unwrap_err();
        assert!(matches!(err, TseriesError::MissingVariable(ref v) if v == "FG_CO2"));
    }

    #[test]
    fn test_identical_except_history() {
        let mut a = monthly(0.0, 2);
        let mut b = a.clone();
        a.set_attr("history", "one");
        b.set_attr("history", "two");
        assert!(a.identical_except(&b, &["history"]));
        assert!(!a.identical_except(&b, &[]));
    }
}
