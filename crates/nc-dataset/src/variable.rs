//! Named-dimension variables with attributes and on-disk encoding.

use std::collections::BTreeMap;
use std::ops::Range;

use cesm_common::{TseriesError, TseriesResult};
use ndarray::{Array1, ArrayD, Axis, IxDyn, Slice};
use serde::{Deserialize, Serialize};

/// Attribute value as found in netCDF metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Number(f64),
    Numbers(Vec<f64>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Number(v) => Some(*v),
            AttrValue::Numbers(v) if v.len() == 1 => Some(v[0]),
            AttrValue::Text(s) => s.trim().parse().ok(),
            AttrValue::Numbers(_) => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Number(v)
    }
}

impl From<Vec<f64>> for AttrValue {
    fn from(v: Vec<f64>) -> Self {
        AttrValue::Numbers(v)
    }
}

pub type Attributes = BTreeMap<String, AttrValue>;

/// State of the `_FillValue` encoding.
///
/// `Unset` leaves the choice to the writer; `Disabled` writes no fill value
/// at all.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FillValue {
    #[default]
    Unset,
    Disabled,
    Value(f64),
}

/// On-disk element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    F64,
    F32,
    I32,
    I16,
    I8,
    Char,
}

impl DType {
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F64 | DType::F32)
    }
}

/// Per-variable encoding carried from source files to artifacts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Encoding {
    pub fill_value: FillValue,
    pub missing_value: Option<f64>,
    pub dtype: Option<DType>,
    pub coordinates: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VarData {
    Numeric(ArrayD<f64>),
    /// One string per element of the single dimension.
    Text(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub dims: Vec<String>,
    pub data: VarData,
    pub attrs: Attributes,
    pub encoding: Encoding,
}

impl Variable {
    /// Numeric variable; the number of dims must match the array rank.
    pub fn new<S: AsRef<str>>(dims: &[S], data: ArrayD<f64>) -> TseriesResult<Self> {
        if dims.len() != data.ndim() {
            return Err(TseriesError::dimension_mismatch(
                dims.iter().map(|d| d.as_ref()).collect::<Vec<_>>().join(","),
                dims.len(),
                data.ndim(),
            ));
        }
        Ok(Self {
            dims: dims.iter().map(|d| d.as_ref().to_string()).collect(),
            data: VarData::Numeric(data),
            attrs: Attributes::new(),
            encoding: Encoding::default(),
        })
    }

    pub fn from_vec<S: AsRef<str>>(dims: &[S], shape: &[usize], values: Vec<f64>) -> TseriesResult<Self> {
        let data = ArrayD::from_shape_vec(IxDyn(shape), values)
            .map_err(|e| TseriesError::InvalidFormat(format!("shape {:?}: {}", shape, e)))?;
        Self::new(dims, data)
    }

    /// One-dimensional variable.
    pub fn from_values(dim: &str, values: Vec<f64>) -> Self {
        Self {
            dims: vec![dim.to_string()],
            data: VarData::Numeric(Array1::from(values).into_dyn()),
            attrs: Attributes::new(),
            encoding: Encoding::default(),
        }
    }

    pub fn scalar(value: f64) -> Self {
        Self {
            dims: Vec::new(),
            data: VarData::Numeric(ArrayD::from_elem(IxDyn(&[]), value)),
            attrs: Attributes::new(),
            encoding: Encoding::default(),
        }
    }

    pub fn text(dim: &str, values: Vec<String>) -> Self {
        Self {
            dims: vec![dim.to_string()],
            data: VarData::Text(values),
            attrs: Attributes::new(),
            encoding: Encoding {
                dtype: Some(DType::Char),
                ..Encoding::default()
            },
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.data, VarData::Numeric(_))
    }

    pub fn values(&self) -> TseriesResult<&ArrayD<f64>> {
        match &self.data {
            VarData::Numeric(a) => Ok(a),
            VarData::Text(_) => Err(TseriesError::InvalidFormat(format!(
                "text variable over ({}) used as numeric",
                self.dims.join(", ")
            ))),
        }
    }

    pub fn values_mut(&mut self) -> TseriesResult<&mut ArrayD<f64>> {
        match &mut self.data {
            VarData::Numeric(a) => Ok(a),
            VarData::Text(_) => Err(TseriesError::InvalidFormat("text variable used as numeric".into())),
        }
    }

    pub fn text_values(&self) -> Option<&[String]> {
        match &self.data {
            VarData::Text(t) => Some(t),
            VarData::Numeric(_) => None,
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        match &self.data {
            VarData::Numeric(a) => a.shape().to_vec(),
            VarData::Text(t) if self.dims.is_empty() => {
                debug_assert!(t.len() == 1);
                Vec::new()
            }
            VarData::Text(t) => vec![t.len()],
        }
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn dim_index(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    pub fn has_dim(&self, dim: &str) -> bool {
        self.dim_index(dim).is_some()
    }

    pub fn dim_size(&self, dim: &str) -> Option<usize> {
        self.dim_index(dim).map(|i| self.shape()[i])
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(AttrValue::as_str)
    }

    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        self.attrs.get(key).and_then(AttrValue::as_f64)
    }

    pub fn units(&self) -> Option<&str> {
        self.attr_str("units")
    }

    pub fn long_name(&self) -> Option<&str> {
        self.attr_str("long_name")
    }

    fn require_dim(&self, dim: &str) -> TseriesResult<usize> {
        self.dim_index(dim).ok_or_else(|| {
            TseriesError::InvalidFormat(format!("dimension '{}' not in ({})", dim, self.dims.join(", ")))
        })
    }

    /// Select one index along `dim`, dropping the dimension.
    pub fn isel(&self, dim: &str, index: usize) -> TseriesResult<Variable> {
        let axis = self.require_dim(dim)?;
        let len = self.shape()[axis];
        if index >= len {
            return Err(TseriesError::InvalidFormat(format!(
                "index {} out of bounds for dimension '{}' of length {}",
                index, dim, len
            )));
        }
        let mut dims = self.dims.clone();
        dims.remove(axis);
        let data = match &self.data {
            VarData::Numeric(a) => VarData::Numeric(a.index_axis(Axis(axis), index).to_owned()),
            VarData::Text(t) => VarData::Text(vec![t[index].clone()]),
        };
        Ok(Variable {
            dims,
            data,
            attrs: self.attrs.clone(),
            encoding: self.encoding.clone(),
        })
    }

    /// Keep the half-open `range` along `dim`.
    pub fn slice(&self, dim: &str, range: Range<usize>) -> TseriesResult<Variable> {
        let axis = self.require_dim(dim)?;
        let len = self.shape()[axis];
        if range.start > range.end || range.end > len {
            return Err(TseriesError::InvalidFormat(format!(
                "slice {:?} out of bounds for dimension '{}' of length {}",
                range, dim, len
            )));
        }
        let data = match &self.data {
            VarData::Numeric(a) => VarData::Numeric(
                a.slice_axis(Axis(axis), Slice::from(range.start..range.end))
                    .to_owned(),
            ),
            VarData::Text(t) => VarData::Text(t[range].to_vec()),
        };
        Ok(Variable {
            dims: self.dims.clone(),
            data,
            attrs: self.attrs.clone(),
            encoding: self.encoding.clone(),
        })
    }

    /// Reorder dimensions; `order` must be a permutation of `dims`.
    pub fn transpose<S: AsRef<str>>(&self, order: &[S]) -> TseriesResult<Variable> {
        if order.len() != self.dims.len() {
            return Err(TseriesError::dimension_mismatch("transpose", self.dims.len(), order.len()));
        }
        let perm = order
            .iter()
            .map(|d| self.require_dim(d.as_ref()))
            .collect::<TseriesResult<Vec<_>>>()?;
        if perm.iter().enumerate().all(|(i, &p)| i == p) {
            return Ok(self.clone());
        }
        let a = self.values()?;
        let permuted = a.view().permuted_axes(perm.as_slice()).as_standard_layout().into_owned();
        Ok(Variable {
            dims: order.iter().map(|d| d.as_ref().to_string()).collect(),
            data: VarData::Numeric(permuted),
            attrs: self.attrs.clone(),
            encoding: self.encoding.clone(),
        })
    }

    /// Add a leading dimension of length 1.
    pub fn expand_dims(&self, dim: &str) -> TseriesResult<Variable> {
        let a = self.values()?;
        let mut dims = vec![dim.to_string()];
        dims.extend(self.dims.iter().cloned());
        Ok(Variable {
            dims,
            data: VarData::Numeric(a.clone().insert_axis(Axis(0))),
            attrs: self.attrs.clone(),
            encoding: self.encoding.clone(),
        })
    }

    /// Concatenate along an existing dimension. Attrs and encoding come from
    /// the first piece.
    pub fn concat(pieces: &[&Variable], dim: &str) -> TseriesResult<Variable> {
        let first = pieces
            .first()
            .ok_or_else(|| TseriesError::InvalidFormat("nothing to concatenate".into()))?;
        let axis = first.require_dim(dim)?;
        for p in pieces.iter().skip(1) {
            if p.dims != first.dims {
                return Err(TseriesError::InvalidFormat(format!(
                    "cannot concatenate ({}) with ({})",
                    first.dims.join(", "),
                    p.dims.join(", ")
                )));
            }
        }
        let data = match &first.data {
            VarData::Numeric(_) => {
                let views = pieces
                    .iter()
                    .map(|p| p.values().map(|a| a.view()))
                    .collect::<TseriesResult<Vec<_>>>()?;
                let joined = ndarray::concatenate(Axis(axis), &views)
                    .map_err(|e| TseriesError::InvalidFormat(format!("concatenate along '{}': {}", dim, e)))?;
                VarData::Numeric(joined)
            }
            VarData::Text(_) => VarData::Text(
                pieces
                    .iter()
                    .flat_map(|p| p.text_values().unwrap_or_default().iter().cloned())
                    .collect(),
            ),
        };
        Ok(Variable {
            dims: first.dims.clone(),
            data,
            attrs: first.attrs.clone(),
            encoding: first.encoding.clone(),
        })
    }

    /// Stack equally shaped numeric pieces along a new leading dimension.
    pub fn stack(pieces: &[&Variable], dim: &str) -> TseriesResult<Variable> {
        let first = pieces
            .first()
            .ok_or_else(|| TseriesError::InvalidFormat("nothing to stack".into()))?;
        let views = pieces
            .iter()
            .map(|p| p.values().map(|a| a.view()))
            .collect::<TseriesResult<Vec<_>>>()?;
        let stacked = ndarray::stack(Axis(0), &views)
            .map_err(|e| TseriesError::InvalidFormat(format!("stack along '{}': {}", dim, e)))?;
        let mut dims = vec![dim.to_string()];
        dims.extend(first.dims.iter().cloned());
        Ok(Variable {
            dims,
            data: VarData::Numeric(stacked),
            attrs: first.attrs.clone(),
            encoding: first.encoding.clone(),
        })
    }

    /// Same variable with data replaced, keeping attrs and encoding.
    pub fn with_data<S: AsRef<str>>(&self, dims: &[S], data: ArrayD<f64>) -> TseriesResult<Variable> {
        let mut out = Variable::new(dims, data)?;
        out.attrs = self.attrs.clone();
        out.encoding = self.encoding.clone();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Variable {
        Variable::from_vec(&["time", "lat"], &[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .unwrap()
            .with_attr("units", "K")
    }

    #[test]
    fn test_rank_check() {
        let err = Variable::from_vec(&["time"], &[2, 3], vec![0.0; 6]).unwrap_err();
        assert!(matches!(err, TseriesError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_isel_and_slice() {
        let v = grid();
        let row = v.isel("time", 1).unwrap();
        assert_eq!(row.dims, vec!["lat"]);
        assert_eq!(row.values().unwrap().as_slice().unwrap(), &[4.0, 5.0, 6.0]);
        assert_eq!(row.units(), Some("K"));

        let part = v.slice("lat", 1..3).unwrap();
        assert_eq!(part.shape(), vec![2, 2]);
        assert!(v.slice("lat", 2..4).is_err());
        assert!(v.isel("lon", 0).is_err());
    }

    #[test]
    fn test_transpose() {
        let t = grid().transpose(&["lat", "time"]).unwrap();
        assert_eq!(t.shape(), vec![3, 2]);
        let flat: Vec<f64> = t.values().unwrap().iter().copied().collect();
        assert_eq!(flat, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_concat_and_stack() {
        let v = grid();
        let joined = Variable::concat(&[&v, &v], "time").unwrap();
        assert_eq!(joined.shape(), vec![4, 3]);
        let stacked = Variable::stack(&[&v, &v, &v], "ensemble").unwrap();
        assert_eq!(stacked.dims, vec!["ensemble", "time", "lat"]);
        assert_eq!(stacked.shape(), vec![3, 2, 3]);
    }

    #[test]
    fn test_text_variable() {
        let names = Variable::text("region", vec!["Global".into(), "SH".into(), "NH".into()]);
        assert_eq!(names.shape(), vec![3]);
        assert!(names.values().is_err());
        let nh = names.slice("region", 2..3).unwrap();
        assert_eq!(nh.text_values().unwrap(), &["NH".to_string()]);
    }

    #[test]
    fn test_attr_accessors() {
        let v = Variable::scalar(1.0)
            .with_attr("missing_value", 1e20)
            .with_attr("note", "x");
        assert_eq!(v.attr_f64("missing_value"), Some(1e20));
        assert_eq!(v.attr_str("note"), Some("x"));
        assert_eq!(v.attr_str("missing_value"), None);
    }
}
