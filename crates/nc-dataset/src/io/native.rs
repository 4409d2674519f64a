//! Native netCDF-4 (classic model) reading and writing.
//!
//! Text variables such as region names are stored as fixed-width
//! single-byte arrays with a trailing `<name>_nchar` dimension. Reads can be
//! restricted to a range along one dimension, which [`read_slice`] uses to
//! fetch one time block without touching the rest of the file.

use std::ops::Range;
use std::path::Path;
use std::sync::Once;

use cesm_common::{TseriesError, TseriesResult};
use ndarray::{ArrayD, IxDyn};
use netcdf::types::{FloatType, IntType, NcVariableType};
use netcdf::AttributeValue;
use tracing::debug;

use crate::dataset::{Dataset, DatasetEncoding};
use crate::variable::{AttrValue, Attributes, DType, Encoding, FillValue, VarData, Variable};

/// Attributes managed by the library rather than carried as metadata.
const RESERVED_ATTRS: [&str; 3] = ["_FillValue", "missing_value", "coordinates"];

fn nc_err(context: &str) -> impl Fn(netcdf::Error) -> TseriesError + '_ {
    move |e| TseriesError::NetCdf(format!("{}: {}", context, e))
}

/// Silence HDF5's automatic error printing to stderr.
///
/// HDF5 reports handled errors (such as probing optional attributes) on
/// stderr. Safe to call repeatedly; only the first call does anything.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 with null handlers is a documented way to
        // disable automatic error output.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(hdf5_metno_sys::h5e::H5E_DEFAULT, None, std::ptr::null_mut());
        }
    });
}

fn attr_from_nc(value: AttributeValue) -> Option<AttrValue> {
    let v = match value {
        AttributeValue::Str(s) => AttrValue::Text(s),
        AttributeValue::Strs(s) => AttrValue::Text(s.join(" ")),
        AttributeValue::Double(v) => AttrValue::Number(v),
        AttributeValue::Float(v) => AttrValue::Number(v as f64),
        AttributeValue::Int(v) => AttrValue::Number(v as f64),
        AttributeValue::Uint(v) => AttrValue::Number(v as f64),
        AttributeValue::Short(v) => AttrValue::Number(v as f64),
        AttributeValue::Ushort(v) => AttrValue::Number(v as f64),
        AttributeValue::Schar(v) => AttrValue::Number(v as f64),
        AttributeValue::Uchar(v) => AttrValue::Number(v as f64),
        AttributeValue::Longlong(v) => AttrValue::Number(v as f64),
        AttributeValue::Ulonglong(v) => AttrValue::Number(v as f64),
        AttributeValue::Doubles(v) => AttrValue::Numbers(v),
        AttributeValue::Floats(v) => AttrValue::Numbers(v.into_iter().map(f64::from).collect()),
        AttributeValue::Ints(v) => AttrValue::Numbers(v.into_iter().map(f64::from).collect()),
        AttributeValue::Shorts(v) => AttrValue::Numbers(v.into_iter().map(f64::from).collect()),
        AttributeValue::Schars(v) => AttrValue::Numbers(v.into_iter().map(f64::from).collect()),
        AttributeValue::Uchars(v) => AttrValue::Numbers(v.into_iter().map(f64::from).collect()),
        _ => return None,
    };
    Some(v)
}

/// Element type of a stored variable.
fn dtype_of(vartype: &NcVariableType) -> Option<DType> {
    match vartype {
        NcVariableType::Float(FloatType::F64) => Some(DType::F64),
        NcVariableType::Float(FloatType::F32) => Some(DType::F32),
        NcVariableType::Int(IntType::I32) => Some(DType::I32),
        NcVariableType::Int(IntType::I16) => Some(DType::I16),
        NcVariableType::Int(IntType::I8) => Some(DType::I8),
        NcVariableType::Char => Some(DType::Char),
        _ => None,
    }
}

/// Fixed-width text: `char` variables, or `i8` ones whose last dimension
/// is `<name>_nchar`.
fn is_text(name: &str, dims: &[String], dtype: Option<DType>) -> bool {
    match dtype {
        Some(DType::Char) => true,
        Some(DType::I8) => dims.last().map_or(false, |d| *d == format!("{}_nchar", name)),
        _ => false,
    }
}

/// Which part of a variable to read.
#[derive(Clone, Copy)]
enum Selection<'a> {
    All,
    /// `range` along the named dimension; other dimensions in full.
    Along(&'a str, &'a Range<usize>),
}

fn read_variable(var: &netcdf::Variable, sel: Selection<'_>) -> TseriesResult<Option<Variable>> {
    let name = var.name();
    let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
    let ranges: Vec<Range<usize>> = var
        .dimensions()
        .iter()
        .map(|d| match sel {
            Selection::Along(dim, range) if d.name() == dim => range.clone(),
            _ => 0..d.len(),
        })
        .collect();
    let shape: Vec<usize> = ranges.iter().map(|r| r.end.saturating_sub(r.start)).collect();
    let extents: Vec<netcdf::Extent> = ranges.iter().map(|r| r.clone().into()).collect();
    let empty = shape.iter().any(|&n| n == 0);

    let mut attrs = Attributes::new();
    let mut encoding = Encoding {
        dtype: dtype_of(&var.vartype()),
        ..Encoding::default()
    };
    for attr in var.attributes() {
        let key = attr.name().to_string();
        let Ok(value) = attr.value() else {
            debug!(variable = %name, attribute = %key, "Skipping unreadable attribute");
            continue;
        };
        match key.as_str() {
            "_FillValue" => {
                encoding.fill_value = attr_from_nc(value)
                    .and_then(|v| v.as_f64())
                    .map(FillValue::Value)
                    .unwrap_or(FillValue::Unset);
            }
            "missing_value" => encoding.missing_value = attr_from_nc(value).and_then(|v| v.as_f64()),
            "coordinates" => encoding.coordinates = attr_from_nc(value).and_then(|v| v.as_str().map(str::to_string)),
            _ => {
                if let Some(v) = attr_from_nc(value) {
                    attrs.insert(key, v);
                }
            }
        }
    }

    if is_text(&name, &dims, encoding.dtype) {
        let raw: Vec<u8> = if empty {
            Vec::new()
        } else if encoding.dtype == Some(DType::Char) {
            var.get_raw_values(extents).map_err(nc_err(&name))?
        } else {
            let signed: Vec<i8> = var.get_values(extents).map_err(nc_err(&name))?;
            signed.into_iter().map(|c| c as u8).collect()
        };
        let width = shape.last().copied().unwrap_or(0).max(1);
        let strings = raw
            .chunks(width)
            .map(|chunk| {
                let bytes: Vec<u8> = chunk.iter().copied().take_while(|&c| c != 0).collect();
                String::from_utf8_lossy(&bytes).into_owned()
            })
            .collect();
        return Ok(Some(Variable {
            dims: dims[..dims.len().saturating_sub(1)].to_vec(),
            data: VarData::Text(strings),
            attrs,
            encoding: Encoding {
                dtype: Some(DType::Char),
                ..encoding
            },
        }));
    }

    let data: Vec<f64> = if empty {
        Vec::new()
    } else {
        match var.get_values::<f64, _>(extents) {
            Ok(values) => values,
            Err(e) => {
                debug!(variable = %name, error = %e, "Skipping non-numeric variable");
                return Ok(None);
            }
        }
    };

    // masked values become NaN like xarray's decoding
    let sentinels: Vec<f64> = [
        match encoding.fill_value {
            FillValue::Value(v) => Some(v),
            _ => None,
        },
        encoding.missing_value,
    ]
    .into_iter()
    .flatten()
    .collect();
    let data: Vec<f64> = data
        .into_iter()
        .map(|v| if sentinels.contains(&v) { f64::NAN } else { v })
        .collect();

    let array = ArrayD::from_shape_vec(IxDyn(&shape), data)
        .map_err(|e| TseriesError::InvalidFormat(format!("{}: {}", name, e)))?;
    Ok(Some(Variable {
        dims,
        data: VarData::Numeric(array),
        attrs,
        encoding,
    }))
}

fn open(path: &Path) -> TseriesResult<(netcdf::File, Dataset)> {
    silence_hdf5_errors();
    let file = netcdf::open(path).map_err(nc_err(&path.display().to_string()))?;

    let mut ds = Dataset::new();
    for attr in file.attributes() {
        if let Some(v) = attr.value().ok().and_then(attr_from_nc) {
            ds.attrs.insert(attr.name().to_string(), v);
        }
    }
    ds.encoding = DatasetEncoding {
        unlimited_dims: file
            .dimensions()
            .filter(|d| d.is_unlimited())
            .map(|d| d.name())
            .collect(),
        source: Some(path.to_path_buf()),
    };
    Ok((file, ds))
}

/// Every variable not along `dim` in full, the ones along it with length 0,
/// plus the length of `dim` and the first value of its coordinate.
pub fn read_header(path: &Path, dim: &str) -> TseriesResult<(Dataset, usize, Option<f64>)> {
    let (file, mut ds) = open(path)?;
    let len = file.dimension(dim).map_or(0, |d| d.len());
    let none = 0..0;
    for var in file.variables() {
        if let Some(v) = read_variable(&var, Selection::Along(dim, &none))? {
            ds.insert(&var.name(), v)?;
        }
    }
    let first = match file.variable(dim) {
        Some(coord) if len > 0 => {
            let head = 0..1;
            read_variable(&coord, Selection::Along(dim, &head))?
                .and_then(|v| v.values().ok().and_then(|a| a.iter().next().copied()))
        }
        _ => None,
    };
    Ok((ds, len, first))
}

/// `names` with only `range` read along `dim`.
pub fn read_slice(path: &Path, names: &[String], dim: &str, range: Range<usize>) -> TseriesResult<Dataset> {
    let (file, mut ds) = open(path)?;
    for name in names {
        let var = file
            .variable(name)
            .ok_or_else(|| TseriesError::MissingVariable(format!("{} in {}", name, path.display())))?;
        let v = read_variable(&var, Selection::Along(dim, &range))?
            .ok_or_else(|| TseriesError::InvalidFormat(format!("{}: not a numeric or text variable", name)))?;
        ds.insert(name, v)?;
    }
    Ok(ds)
}

pub fn read(path: &Path) -> TseriesResult<Dataset> {
    let (file, mut ds) = open(path)?;
    for var in file.variables() {
        if let Some(v) = read_variable(&var, Selection::All)? {
            ds.insert(&var.name(), v)?;
        }
    }
    Ok(ds)
}

fn put_attr(var: &mut netcdf::VariableMut, key: &str, value: &AttrValue) -> TseriesResult<()> {
    let result = match value {
        AttrValue::Text(s) => var.put_attribute(key, s.as_str()),
        AttrValue::Number(v) => var.put_attribute(key, *v),
        AttrValue::Numbers(v) => var.put_attribute(key, v.clone()),
    };
    result.map(|_| ()).map_err(nc_err(key))
}

fn extents(shape: &[usize]) -> Vec<netcdf::Extent> {
    shape.iter().map(|&n| (0..n).into()).collect()
}

pub fn write(ds: &Dataset, path: &Path) -> TseriesResult<()> {
    silence_hdf5_errors();
    let ctx = path.display().to_string();
    let mut file = netcdf::create_with(path, netcdf::Options::NETCDF4 | netcdf::Options::CLASSIC).map_err(nc_err(&ctx))?;

    for (dim, len) in ds.dims() {
        if ds.encoding.unlimited_dims.contains(&dim) {
            file.add_unlimited_dimension(&dim).map_err(nc_err(&dim))?;
        } else {
            file.add_dimension(&dim, len).map_err(nc_err(&dim))?;
        }
    }

    for (key, value) in &ds.attrs {
        let result = match value {
            AttrValue::Text(s) => file.add_attribute(key, s.as_str()),
            AttrValue::Number(v) => file.add_attribute(key, *v),
            AttrValue::Numbers(v) => file.add_attribute(key, v.clone()),
        };
        result.map_err(nc_err(key))?;
    }

    for (name, var) in ds.iter() {
        match &var.data {
            VarData::Numeric(values) => {
                let fill = match var.encoding.fill_value {
                    FillValue::Value(v) => Some(v),
                    _ => None,
                };
                let flat: Vec<f64> = values
                    .iter()
                    .map(|&v| match fill {
                        Some(f) if v.is_nan() => f,
                        _ => v,
                    })
                    .collect();
                match var.encoding.dtype {
                    Some(DType::F32) => put_numeric(&mut file, name, var, &flat, fill, |v| v as f32)?,
                    Some(DType::I32) => put_numeric(&mut file, name, var, &flat, fill, |v| v.round() as i32)?,
                    Some(DType::I16) => put_numeric(&mut file, name, var, &flat, fill, |v| v.round() as i16)?,
                    Some(DType::I8) => put_numeric(&mut file, name, var, &flat, fill, |v| v.round() as i8)?,
                    _ => put_numeric(&mut file, name, var, &flat, fill, |v| v)?,
                }
            }
            VarData::Text(strings) => {
                let width = strings.iter().map(String::len).max().unwrap_or(0).max(1);
                let nchar = format!("{}_nchar", name);
                file.add_dimension(&nchar, width).map_err(nc_err(&nchar))?;
                let mut dims: Vec<&str> = var.dims.iter().map(String::as_str).collect();
                dims.push(&nchar);
                let mut raw = vec![0i8; strings.len() * width];
                for (row, s) in strings.iter().enumerate() {
                    for (col, b) in s.bytes().enumerate() {
                        raw[row * width + col] = b as i8;
                    }
                }
                let mut nc_var = file.add_variable::<i8>(name, &dims).map_err(nc_err(name))?;
                write_var_attrs(&mut nc_var, var)?;
                let mut shape = var.shape();
                shape.push(width);
                nc_var.put_values(&raw, extents(&shape)).map_err(nc_err(name))?;
            }
        }
    }
    debug!(path = %ctx, variables = ds.len(), "Wrote netCDF artifact");
    Ok(())
}

/// Add `name` stored as `T`, converting values and the fill with `cast`.
fn put_numeric<T: netcdf::NcTypeDescriptor + Copy>(
    file: &mut netcdf::FileMut,
    name: &str,
    var: &Variable,
    flat: &[f64],
    fill: Option<f64>,
    cast: impl Fn(f64) -> T,
) -> TseriesResult<()> {
    let dims: Vec<&str> = var.dims.iter().map(String::as_str).collect();
    let mut nc_var = file.add_variable::<T>(name, &dims).map_err(nc_err(name))?;
    if let Some(f) = fill {
        nc_var.set_fill_value(cast(f)).map_err(nc_err(name))?;
    }
    write_var_attrs(&mut nc_var, var)?;
    let stored: Vec<T> = flat.iter().map(|&v| cast(v)).collect();
    nc_var.put_values(&stored, extents(&var.shape())).map_err(nc_err(name))?;
    Ok(())
}

fn write_var_attrs(nc_var: &mut netcdf::VariableMut, var: &Variable) -> TseriesResult<()> {
    for (key, value) in &var.attrs {
        if !RESERVED_ATTRS.contains(&key.as_str()) {
            put_attr(nc_var, key, value)?;
        }
    }
    if let Some(mv) = var.encoding.missing_value {
        put_attr(nc_var, "missing_value", &AttrValue::Number(mv))?;
    }
    if let Some(coords) = &var.encoding.coordinates {
        put_attr(nc_var, "coordinates", &AttrValue::Text(coords.clone()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let mut sst = Variable::from_vec(&["time", "nlat"], &[3, 2], vec![1.5, 2.5, 3.5, 4.5, 5.5, 6.5]).unwrap();
        sst.encoding.dtype = Some(DType::F32);
        let mut kmt = Variable::from_values("nlat", vec![0.0, 3.0]);
        kmt.encoding.dtype = Some(DType::I32);
        let time = Variable::from_values("time", vec![15.5, 45.0, 74.5]).with_attr("units", "days since 0001-01-01");
        let mut ds = Dataset::new()
            .with_var("time", time)
            .unwrap()
            .with_var("SST", sst)
            .unwrap()
            .with_var("KMT", kmt)
            .unwrap()
            .with_var("region", Variable::text("region", vec!["Global".into(), "SH".into()]))
            .unwrap();
        ds.encoding.unlimited_dims = vec!["time".into()];
        ds
    }

    #[test]
    fn test_dtype_kept_without_fill_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.nc");
        write(&sample(), &path).unwrap();

        let back = read(&path).unwrap();
        let sst = back.var("SST").unwrap();
        assert_eq!(sst.encoding.fill_value, FillValue::Unset);
        assert_eq!(sst.encoding.dtype, Some(DType::F32));
        assert_eq!(back.var("KMT").unwrap().encoding.dtype, Some(DType::I32));
        assert_eq!(back.var("time").unwrap().encoding.dtype, Some(DType::F64));

        let copy = dir.path().join("copy.nc");
        write(&back, &copy).unwrap();
        let file = netcdf::open(&copy).unwrap();
        assert!(matches!(
            file.variable("SST").unwrap().vartype(),
            NcVariableType::Float(FloatType::F32)
        ));
        assert!(matches!(
            file.variable("KMT").unwrap().vartype(),
            NcVariableType::Int(IntType::I32)
        ));
    }

    #[test]
    fn test_text_written_without_marker_attribute() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.nc");
        write(&sample(), &path).unwrap();

        let file = netcdf::open(&path).unwrap();
        let region = file.variable("region").unwrap();
        assert_eq!(region.attributes().count(), 0);
        drop(file);

        let back = read(&path).unwrap();
        let region = back.var("region").unwrap();
        assert_eq!(region.text_values().unwrap(), ["Global", "SH"]);
        assert!(region.attrs.is_empty());
    }

    #[test]
    fn test_header_and_slice_read_only_requested_steps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.nc");
        write(&sample(), &path).unwrap();

        let (header, len, first) = read_header(&path, "time").unwrap();
        assert_eq!(len, 3);
        assert_eq!(first, Some(15.5));
        assert_eq!(header.var("SST").unwrap().shape(), vec![0, 2]);
        assert_eq!(header.var("KMT").unwrap().shape(), vec![2]);

        let part = read_slice(&path, &["SST".to_string(), "time".to_string()], "time", 1..3).unwrap();
        let sst = part.var("SST").unwrap();
        assert_eq!(sst.shape(), vec![2, 2]);
        assert_eq!(sst.values().unwrap()[[1, 1]], 6.5);
        assert_eq!(sst.encoding.dtype, Some(DType::F32));
    }
}
