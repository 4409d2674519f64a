//! JSON artifact codec.
//!
//! Missing values (NaN) are written as `null`; floats round-trip exactly.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use cesm_common::{TseriesError, TseriesResult};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::dataset::{Dataset, DatasetEncoding};
use crate::variable::{AttrValue, Attributes, DType, Encoding, FillValue, VarData, Variable};

pub(crate) const FORMAT_TAG: &str = "nc-dataset";
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct DatasetDto {
    format: String,
    version: u32,
    #[serde(default)]
    attrs: BTreeMap<String, AttrDto>,
    #[serde(default)]
    unlimited_dims: Vec<String>,
    variables: BTreeMap<String, VariableDto>,
}

#[derive(Serialize, Deserialize)]
struct VariableDto {
    dims: Vec<String>,
    shape: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    values: Option<Vec<Option<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<Vec<String>>,
    #[serde(default)]
    attrs: BTreeMap<String, AttrDto>,
    #[serde(default)]
    encoding: EncodingDto,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum AttrDto {
    Text(String),
    Number(Option<f64>),
    Numbers(Vec<Option<f64>>),
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
enum FillDto {
    #[default]
    Unset,
    Disabled,
    Value(Option<f64>),
}

#[derive(Serialize, Deserialize, Default)]
struct EncodingDto {
    #[serde(default)]
    fill_value: FillDto,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    missing_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dtype: Option<DType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    coordinates: Option<String>,
}

fn nan_to_none(v: f64) -> Option<f64> {
    if v.is_nan() {
        None
    } else {
        Some(v)
    }
}

fn attrs_to_dto(attrs: &Attributes) -> BTreeMap<String, AttrDto> {
    attrs
        .iter()
        .map(|(k, v)| {
            let dto = match v {
                AttrValue::Text(s) => AttrDto::Text(s.clone()),
                AttrValue::Number(n) => AttrDto::Number(nan_to_none(*n)),
                AttrValue::Numbers(ns) => AttrDto::Numbers(ns.iter().copied().map(nan_to_none).collect()),
            };
            (k.clone(), dto)
        })
        .collect()
}

fn attrs_from_dto(attrs: BTreeMap<String, AttrDto>) -> Attributes {
    attrs
        .into_iter()
        .map(|(k, v)| {
            let value = match v {
                AttrDto::Text(s) => AttrValue::Text(s),
                AttrDto::Number(n) => AttrValue::Number(n.unwrap_or(f64::NAN)),
                AttrDto::Numbers(ns) => AttrValue::Numbers(ns.into_iter().map(|n| n.unwrap_or(f64::NAN)).collect()),
            };
            (k, value)
        })
        .collect()
}

impl From<&Encoding> for EncodingDto {
    fn from(enc: &Encoding) -> Self {
        Self {
            fill_value: match enc.fill_value {
                FillValue::Unset => FillDto::Unset,
                FillValue::Disabled => FillDto::Disabled,
                FillValue::Value(v) => FillDto::Value(nan_to_none(v)),
            },
            missing_value: enc.missing_value,
            dtype: enc.dtype,
            coordinates: enc.coordinates.clone(),
        }
    }
}

impl From<EncodingDto> for Encoding {
    fn from(dto: EncodingDto) -> Self {
        Self {
            fill_value: match dto.fill_value {
                FillDto::Unset => FillValue::Unset,
                FillDto::Disabled => FillValue::Disabled,
                FillDto::Value(v) => FillValue::Value(v.unwrap_or(f64::NAN)),
            },
            missing_value: dto.missing_value,
            dtype: dto.dtype,
            coordinates: dto.coordinates,
        }
    }
}

fn variable_to_dto(var: &Variable) -> VariableDto {
    let (values, text) = match &var.data {
        VarData::Numeric(a) => (Some(a.iter().copied().map(nan_to_none).collect()), None),
        VarData::Text(t) => (None, Some(t.clone())),
    };
    VariableDto {
        dims: var.dims.clone(),
        shape: var.shape(),
        values,
        text,
        attrs: attrs_to_dto(&var.attrs),
        encoding: (&var.encoding).into(),
    }
}

fn variable_from_dto(name: &str, dto: VariableDto) -> TseriesResult<Variable> {
    let data = match (dto.values, dto.text) {
        (Some(values), None) => {
            let flat: Vec<f64> = values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
            let array = ArrayD::from_shape_vec(IxDyn(&dto.shape), flat)
                .map_err(|e| TseriesError::InvalidFormat(format!("variable '{}': {}", name, e)))?;
            VarData::Numeric(array)
        }
        (None, Some(text)) => VarData::Text(text),
        _ => {
            return Err(TseriesError::InvalidFormat(format!(
                "variable '{}' must have exactly one of values/text",
                name
            )))
        }
    };
    let var = Variable {
        dims: dto.dims,
        data,
        attrs: attrs_from_dto(dto.attrs),
        encoding: dto.encoding.into(),
    };
    if var.shape().len() != var.dims.len() {
        return Err(TseriesError::dimension_mismatch(name, var.dims.len(), var.shape().len()));
    }
    Ok(var)
}

pub fn write(ds: &Dataset, path: &Path) -> TseriesResult<()> {
    let dto = DatasetDto {
        format: FORMAT_TAG.to_string(),
        version: FORMAT_VERSION,
        attrs: attrs_to_dto(&ds.attrs),
        unlimited_dims: ds.encoding.unlimited_dims.clone(),
        variables: ds.iter().map(|(k, v)| (k.to_string(), variable_to_dto(v))).collect(),
    };
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &dto)?;
    writer.flush()?;
    Ok(())
}

pub fn read(path: &Path) -> TseriesResult<Dataset> {
    let reader = BufReader::new(File::open(path)?);
    let dto: DatasetDto = serde_json::from_reader(reader)?;
    if dto.format != FORMAT_TAG {
        return Err(TseriesError::InvalidFormat(format!(
            "{}: unexpected format tag '{}'",
            path.display(),
            dto.format
        )));
    }
    let mut ds = Dataset::new();
    ds.attrs = attrs_from_dto(dto.attrs);
    ds.encoding = DatasetEncoding {
        unlimited_dims: dto.unlimited_dims,
        source: Some(path.to_path_buf()),
    };
    for (name, var) in dto.variables {
        let var = variable_from_dto(&name, var)?;
        ds.insert(&name, var)?;
    }
    Ok(ds)
}
