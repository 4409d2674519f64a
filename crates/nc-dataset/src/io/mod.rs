//! Reading and writing datasets.
//!
//! Two artifact codecs are supported: native netCDF-4 (cargo feature
//! `netcdf`) and a JSON encoding that is always available. Readers sniff the
//! leading bytes, so the file extension carries no meaning.

pub mod json;
mod multi;
#[cfg(feature = "netcdf")]
pub mod native;

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::ops::Range;
use std::path::Path;
use std::str::FromStr;

use cesm_common::{TseriesError, TseriesResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::Dataset;

pub use multi::{open_mfdataset, MfDataset};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    NetCdf,
    Json,
}

impl ArtifactFormat {
    /// Format written when nothing else is configured.
    pub fn preferred() -> Self {
        if cfg!(feature = "netcdf") {
            ArtifactFormat::NetCdf
        } else {
            ArtifactFormat::Json
        }
    }

    /// Detect the format of an existing file from its magic bytes.
    pub fn detect(path: &Path) -> TseriesResult<Self> {
        let mut head = [0u8; 8];
        let n = File::open(path)?.read(&mut head)?;
        let head = &head[..n];
        if head.starts_with(b"CDF") || head.starts_with(b"\x89HDF") {
            Ok(ArtifactFormat::NetCdf)
        } else if head.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{') {
            Ok(ArtifactFormat::Json)
        } else {
            Err(TseriesError::InvalidFormat(format!(
                "{}: unrecognized file signature",
                path.display()
            )))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactFormat::NetCdf => "netcdf",
            ArtifactFormat::Json => "json",
        }
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactFormat {
    type Err = TseriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "netcdf" | "nc" | "netcdf4" => Ok(ArtifactFormat::NetCdf),
            "json" => Ok(ArtifactFormat::Json),
            other => Err(TseriesError::Config(format!("unknown artifact format '{}'", other))),
        }
    }
}

#[cfg(feature = "netcdf")]
fn read_netcdf(path: &Path) -> TseriesResult<Dataset> {
    native::read(path)
}

#[cfg(not(feature = "netcdf"))]
fn read_netcdf(path: &Path) -> TseriesResult<Dataset> {
    Err(TseriesError::NetCdf(format!(
        "{}: netCDF support not compiled in (enable the `netcdf` feature)",
        path.display()
    )))
}

#[cfg(feature = "netcdf")]
fn read_netcdf_header(path: &Path, dim: &str) -> TseriesResult<(Dataset, usize, Option<f64>)> {
    native::read_header(path, dim)
}

#[cfg(not(feature = "netcdf"))]
fn read_netcdf_header(path: &Path, dim: &str) -> TseriesResult<(Dataset, usize, Option<f64>)> {
    header_of(&read_netcdf(path)?, dim)
}

#[cfg(feature = "netcdf")]
fn read_netcdf_slice(path: &Path, names: &[String], dim: &str, range: Range<usize>) -> TseriesResult<Dataset> {
    native::read_slice(path, names, dim, range)
}

#[cfg(not(feature = "netcdf"))]
fn read_netcdf_slice(path: &Path, names: &[String], dim: &str, range: Range<usize>) -> TseriesResult<Dataset> {
    read_netcdf(path)?.select(names)?.slice(dim, range)
}

#[cfg(feature = "netcdf")]
fn write_netcdf(ds: &Dataset, path: &Path) -> TseriesResult<()> {
    native::write(ds, path)
}

#[cfg(not(feature = "netcdf"))]
fn write_netcdf(_ds: &Dataset, path: &Path) -> TseriesResult<()> {
    Err(TseriesError::NetCdf(format!(
        "{}: netCDF support not compiled in (enable the `netcdf` feature)",
        path.display()
    )))
}

/// Open a single file of either format.
pub fn open_dataset(path: &Path) -> TseriesResult<Dataset> {
    let format = ArtifactFormat::detect(path)?;
    debug!(path = %path.display(), format = %format, "Opening dataset");
    match format {
        ArtifactFormat::NetCdf => read_netcdf(path),
        ArtifactFormat::Json => json::read(path),
    }
}

pub fn write_dataset(ds: &Dataset, path: &Path, format: ArtifactFormat) -> TseriesResult<()> {
    match format {
        ArtifactFormat::NetCdf => write_netcdf(ds, path),
        ArtifactFormat::Json => json::write(ds, path),
    }
}

/// Header of one file along `dim`: the dataset with every `dim`-dependent
/// variable cut to length 0, the length of `dim`, and the first value of
/// the `dim` coordinate if there is one.
pub(crate) fn read_header(path: &Path, dim: &str) -> TseriesResult<(Dataset, usize, Option<f64>)> {
    match ArtifactFormat::detect(path)? {
        ArtifactFormat::NetCdf => read_netcdf_header(path, dim),
        ArtifactFormat::Json => header_of(&json::read(path)?, dim),
    }
}

/// `names` restricted to `range` along `dim`, read from one file.
pub(crate) fn read_slice(path: &Path, names: &[String], dim: &str, range: Range<usize>) -> TseriesResult<Dataset> {
    match ArtifactFormat::detect(path)? {
        ArtifactFormat::NetCdf => read_netcdf_slice(path, names, dim, range),
        // JSON has no random access; the parsed file is dropped on return.
        ArtifactFormat::Json => json::read(path)?.select(names)?.slice(dim, range),
    }
}

pub(crate) fn header_of(ds: &Dataset, dim: &str) -> TseriesResult<(Dataset, usize, Option<f64>)> {
    let len = ds.dim_size(dim).unwrap_or(0);
    let first = ds
        .get(dim)
        .and_then(|v| v.values().ok())
        .and_then(|a| a.iter().next().copied());
    Ok((ds.slice(dim, 0..0)?, len, first))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::{FillValue, Variable};

    fn piece(start: f64, n: usize) -> Dataset {
        let time: Vec<f64> = (0..n).map(|i| start + i as f64).collect();
        let mut sst = Variable::from_vec(&["time", "nlat"], &[n, 2], vec![start; n * 2]).unwrap();
        sst.encoding.fill_value = FillValue::Value(9.96921e36);
        sst.attrs.insert("units".into(), "degC".into());
        let mut ds = Dataset::new()
            .with_var("time", Variable::from_values("time", time))
            .unwrap()
            .with_var("TAREA", Variable::from_values("nlat", vec![1.0, 2.0]))
            .unwrap()
            .with_var("SST", sst)
            .unwrap();
        ds.set_attr("title", "piece");
        ds.encoding.unlimited_dims = vec!["time".into()];
        ds
    }

    #[test]
    fn test_json_roundtrip_preserves_nan_and_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.nc");
        let mut ds = piece(0.0, 2);
        ds.get_mut("SST").unwrap().values_mut().unwrap()[[1, 1]] = f64::NAN;
        ds.insert("region", Variable::text("region", vec!["Global".into(), "SH".into()]))
            .unwrap();
        write_dataset(&ds, &path, ArtifactFormat::Json).unwrap();

        assert_eq!(ArtifactFormat::detect(&path).unwrap(), ArtifactFormat::Json);
        let back = open_dataset(&path).unwrap();
        let sst = back.var("SST").unwrap();
        assert!(sst.values().unwrap()[[1, 1]].is_nan());
        assert_eq!(sst.encoding.fill_value, FillValue::Value(9.96921e36));
        assert_eq!(back.encoding.unlimited_dims, vec!["time"]);
        assert_eq!(back.var("region").unwrap().text_values().unwrap()[1], "SH");
        assert_eq!(back.attr_str("title"), Some("piece"));
    }

    #[test]
    fn test_unrecognized_signature() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.nc");
        std::fs::write(&path, b"garbage").unwrap();
        assert!(matches!(open_dataset(&path), Err(TseriesError::InvalidFormat(_))));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("JSON".parse::<ArtifactFormat>().unwrap(), ArtifactFormat::Json);
        assert_eq!("netcdf".parse::<ArtifactFormat>().unwrap(), ArtifactFormat::NetCdf);
        assert!("zarr".parse::<ArtifactFormat>().is_err());
    }
}
