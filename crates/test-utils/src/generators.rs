//! Synthetic CESM output archives on disk.
//!
//! Files are laid out the way the catalog scanner expects,
//! `{root}/{case}/{component}/proc/tseries/month_1/{case}.{stream}.{var}.{YYYYMM-YYYYMM}.nc`,
//! and are written with the JSON codec so tests run without libnetcdf.

use std::path::{Path, PathBuf};

use cesm_common::TseriesResult;
use nc_dataset::{write_dataset, ArtifactFormat, Dataset, Encoding, FillValue, DType, Variable};
use serde::Serialize;

use crate::fixtures;

pub const EXPERIMENT: &str = "esm-hist";
pub const OCN_STREAM: &str = "pop.h";
pub const FILL: f64 = 9.969_209_968_386_869e36;

/// Shape of a synthetic ocean archive.
#[derive(Debug, Clone)]
pub struct OcnArchiveSpec {
    /// One case name per ensemble member; member ids start at 1.
    pub cases: Vec<String>,
    pub files_per_case: usize,
    pub years_per_file: usize,
    pub nlat: usize,
    pub nlon: usize,
}

impl Default for OcnArchiveSpec {
    fn default() -> Self {
        Self {
            cases: vec!["b.e21.esm-hist.001".to_string(), "b.e21.esm-hist.002".to_string()],
            files_per_case: 2,
            years_per_file: 2,
            nlat: 6,
            nlon: 8,
        }
    }
}

/// Catalog row as serialized for the YAML catalog.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveEntry {
    pub variable: String,
    pub component: String,
    pub stream: String,
    pub experiment: String,
    pub ensemble: u32,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
struct CatalogFile<'a> {
    entries: &'a [ArchiveEntry],
}

/// Paths of a written archive.
#[derive(Debug, Clone)]
pub struct OcnArchive {
    pub root: PathBuf,
    pub entries: Vec<ArchiveEntry>,
    pub catalog_path: PathBuf,
    pub var_specs_path: PathBuf,
}

/// Component-level ocean defaults plus an integrated CO2 flux in PgC/yr.
pub const VAR_SPECS_YAML: &str = r#"
ocn:
  stream: pop.h
  reduce_dims: [nlat, nlon]
  tseries_op: average
  vars:
    FG_CO2:
      tseries_op: integrate
      unit_conv: 12.0e-3 g/mmol
      integral_display_units: PgC/yr
    SST_MEAN:
      varname: SST
"#;

/// `FG_CO2` value for a member, month and cell; NaN on land.
pub fn fg_co2_value(ensemble: u32, month: usize, y: usize, x: usize, land: bool) -> f64 {
    if land {
        return f64::NAN;
    }
    let seasonal = ((month % 12) as f64 * std::f64::consts::PI / 6.0).sin();
    1.0e-3 * (1.0 + 0.1 * ensemble as f64 + 0.5 * seasonal + 0.01 * (y * 7 + x) as f64)
}

fn member_file(spec: &OcnArchiveSpec, ensemble: u32, file_index: usize) -> TseriesResult<Dataset> {
    let mut ds = fixtures::ocn_grid(1, spec.nlat, spec.nlon);
    let start_year = file_index * spec.years_per_file;
    let time = fixtures::monthly_time(start_year, spec.years_per_file);
    for (name, var) in time.iter() {
        ds.insert(name, var.clone())?;
    }
    ds.encoding.unlimited_dims = time.encoding.unlimited_dims.clone();

    let ntime = spec.years_per_file * 12;
    let kmt = ds.var("KMT")?.values()?.clone();
    let mut values = Vec::with_capacity(ntime * spec.nlat * spec.nlon);
    for t in 0..ntime {
        for y in 0..spec.nlat {
            for x in 0..spec.nlon {
                let land = kmt[[y, x]] <= 0.0;
                values.push(fg_co2_value(ensemble, start_year * 12 + t, y, x, land));
            }
        }
    }
    let mut fg = Variable::from_vec(&["time", "nlat", "nlon"], &[ntime, spec.nlat, spec.nlon], values)?
        .with_attr("long_name", "DIC Surface Gas Flux")
        .with_attr("units", "mmol/m^3 cm/s");
    fg.encoding = Encoding {
        fill_value: FillValue::Value(FILL),
        missing_value: Some(FILL),
        dtype: Some(DType::F32),
        coordinates: Some("TLONG TLAT time".to_string()),
    };
    ds.insert("FG_CO2", fg)?;
    let sst = ds.var("FG_CO2")?.values()?.mapv(|v| 1.0e4 * v);
    let sst = ds.var("FG_CO2")?.with_data(&["time", "nlat", "nlon"], sst)?;
    ds.insert(
        "SST",
        sst.with_attr("long_name", "Surface Potential Temperature").with_attr("units", "degC"),
    )?;

    let mut uvel = Variable::from_vec(&["nlat", "nlon"], &[spec.nlat, spec.nlon], vec![0.0; spec.nlat * spec.nlon])?;
    uvel.encoding.coordinates = Some("ULONG ULAT".to_string());
    ds.insert("UVEL_SURF", uvel)?;

    ds.set_attr("title", "synthetic POP history");
    ds.set_attr("history", format!("member {} file {}", ensemble, file_index));
    Ok(ds)
}

fn file_name(case: &str, stream: &str, var: &str, start_year: usize, nyears: usize) -> String {
    format!(
        "{}.{}.{}.{:04}01-{:04}12.nc",
        case,
        stream,
        var,
        start_year + 1,
        start_year + nyears
    )
}

/// Write an ocean archive, its YAML catalog and a var-spec file under `root`.
pub fn write_ocn_archive(root: &Path, spec: &OcnArchiveSpec) -> TseriesResult<OcnArchive> {
    let mut entries = Vec::new();
    for (member, case) in spec.cases.iter().enumerate() {
        let ensemble = member as u32 + 1;
        let dir = root.join(case).join("ocn").join("proc").join("tseries").join("month_1");
        std::fs::create_dir_all(&dir)?;
        let mut files = Vec::new();
        for f in 0..spec.files_per_case {
            let ds = member_file(spec, ensemble, f)?;
            let start_year = f * spec.years_per_file;
            // one file per variable, as in CESM time-series output
            for var in ["FG_CO2", "SST"] {
                let path = dir.join(file_name(case, OCN_STREAM, var, start_year, spec.years_per_file));
                let other = if var == "FG_CO2" { "SST" } else { "FG_CO2" };
                write_dataset(&ds.drop_vars(&[other]), &path, ArtifactFormat::Json)?;
                if var == "FG_CO2" {
                    files.push(path);
                }
            }
        }
        entries.push(ArchiveEntry {
            variable: "FG_CO2".to_string(),
            component: "ocn".to_string(),
            stream: OCN_STREAM.to_string(),
            experiment: EXPERIMENT.to_string(),
            ensemble,
            files: files.clone(),
        });
        entries.push(ArchiveEntry {
            variable: "SST".to_string(),
            component: "ocn".to_string(),
            stream: OCN_STREAM.to_string(),
            experiment: EXPERIMENT.to_string(),
            ensemble,
            files: files
                .iter()
                .map(|p| PathBuf::from(p.to_string_lossy().replace(".FG_CO2.", ".SST.")))
                .collect(),
        });
    }

    let catalog_path = root.join("catalog.yaml");
    std::fs::write(&catalog_path, serde_yaml::to_string(&CatalogFile { entries: &entries })?)?;
    let var_specs_path = root.join("var_specs.yaml");
    std::fs::write(&var_specs_path, VAR_SPECS_YAML)?;

    Ok(OcnArchive {
        root: root.to_path_buf(),
        entries,
        catalog_path,
        var_specs_path,
    })
}
