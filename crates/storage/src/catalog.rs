//! File catalog of CESM time-series output.
//!
//! A catalog maps `(variable, component, stream, experiment)` to the files of
//! each ensemble member. It is an explicit handle: load it from YAML or JSON,
//! or build it by scanning an archive, then pass it to whoever queries it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cesm_common::{Component, TseriesError, TseriesResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Files of one variable for one ensemble member.
///
/// Several entries may share an ensemble; their files form one continuous
/// time axis in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub variable: String,
    pub component: Component,
    pub stream: String,
    pub experiment: String,
    pub ensemble: u32,
    pub files: Vec<PathBuf>,
}

/// Catalog lookup.
pub trait CatalogQuery: Send + Sync {
    /// Entries whose variable is one of `variables`, in catalog order.
    fn find_in_index(
        &self,
        variables: &[String],
        component: Component,
        stream: &str,
        experiment: &str,
    ) -> TseriesResult<Vec<CatalogEntry>>;
}

/// Distinct ensemble ids of `entries`, in first-seen order.
pub fn ensembles(entries: &[CatalogEntry]) -> Vec<u32> {
    let mut out: Vec<u32> = Vec::new();
    for e in entries {
        if !out.contains(&e.ensemble) {
            out.push(e.ensemble);
        }
    }
    out
}

/// All files of `ensemble`, concatenated over its entries.
pub fn member_files(entries: &[CatalogEntry], ensemble: u32) -> Vec<PathBuf> {
    entries
        .iter()
        .filter(|e| e.ensemble == ensemble)
        .flat_map(|e| e.files.iter().cloned())
        .collect()
}

/// In-memory catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Load from a `.yaml`/`.yml` or `.json` file.
    pub fn from_file(path: &Path) -> TseriesResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let catalog: Catalog = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&text)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&text)?,
            _ => {
                return Err(TseriesError::Config(format!(
                    "catalog must be .yaml, .yml or .json: {}",
                    path.display()
                )))
            }
        };
        info!(path = %path.display(), entries = catalog.entries.len(), "Loaded catalog");
        Ok(catalog)
    }

    pub fn to_yaml(&self) -> TseriesResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Build a catalog by scanning an archive.
    ///
    /// For every experiment, `cases[i]` is the case directory of ensemble
    /// member `i + 1`. Files are found under
    /// `{root}/{case}/{component}/proc/tseries/` at any depth and must be
    /// named `{case}.{stream}.{variable}.{dates}.nc`.
    pub fn scan(root: &Path, experiments: &BTreeMap<String, Vec<String>>) -> TseriesResult<Self> {
        let mut entries = Vec::new();
        for (experiment, cases) in experiments {
            for (member, case) in cases.iter().enumerate() {
                let ensemble = member as u32 + 1;
                for component in Component::ALL {
                    let dir = root.join(case).join(component.as_str()).join("proc").join("tseries");
                    if !dir.is_dir() {
                        continue;
                    }
                    entries.extend(scan_case_dir(&dir, case, component, experiment, ensemble)?);
                }
            }
        }
        info!(root = %root.display(), entries = entries.len(), "Scanned archive");
        Ok(Self { entries })
    }
}

/// `(stream, variable)` from `{case}.{stream}.{variable}.{dates}.nc`.
fn parse_file_name<'a>(name: &'a str, case: &str) -> Option<(&'a str, &'a str)> {
    let rest = name.strip_prefix(case)?.strip_prefix('.')?.strip_suffix(".nc")?;
    let (rest, _dates) = rest.rsplit_once('.')?;
    let (stream, variable) = rest.rsplit_once('.')?;
    if stream.is_empty() || variable.is_empty() {
        return None;
    }
    Some((stream, variable))
}

fn scan_case_dir(
    dir: &Path,
    case: &str,
    component: Component,
    experiment: &str,
    ensemble: u32,
) -> TseriesResult<Vec<CatalogEntry>> {
    let mut groups: BTreeMap<(String, String), Vec<PathBuf>> = BTreeMap::new();
    for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| TseriesError::Io(std::io::Error::other(e.to_string())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        match parse_file_name(name, case) {
            Some((stream, variable)) => groups
                .entry((stream.to_string(), variable.to_string()))
                .or_default()
                .push(entry.path().to_path_buf()),
            None => debug!(path = %entry.path().display(), "Skipping file outside naming convention"),
        }
    }
    Ok(groups
        .into_iter()
        .map(|((stream, variable), mut files)| {
            files.sort();
            CatalogEntry {
                variable,
                component,
                stream,
                experiment: experiment.to_string(),
                ensemble,
                files,
            }
        })
        .collect())
}

impl CatalogQuery for Catalog {
    fn find_in_index(
        &self,
        variables: &[String],
        component: Component,
        stream: &str,
        experiment: &str,
    ) -> TseriesResult<Vec<CatalogEntry>> {
        let found: Vec<CatalogEntry> = self
            .entries
            .iter()
            .filter(|e| {
                e.component == component
                    && e.stream == stream
                    && e.experiment == experiment
                    && variables.contains(&e.variable)
            })
            .cloned()
            .collect();
        debug!(
            variables = ?variables,
            component = %component,
            stream,
            experiment,
            matches = found.len(),
            "Catalog query"
        );
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(variable: &str, ensemble: u32, files: &[&str]) -> CatalogEntry {
        CatalogEntry {
            variable: variable.to_string(),
            component: Component::Ocn,
            stream: "pop.h".to_string(),
            experiment: "esm-hist".to_string(),
            ensemble,
            files: files.iter().map(PathBuf::from).collect(),
        }
    }

    #[test]
    fn test_parse_file_name() {
        assert_eq!(
            parse_file_name("b.e21.001.pop.h.FG_CO2.185001-189912.nc", "b.e21.001"),
            Some(("pop.h", "FG_CO2"))
        );
        assert_eq!(
            parse_file_name("b.e21.001.cam.h0.CO2.185001-189912.nc", "b.e21.001"),
            Some(("cam.h0", "CO2"))
        );
        assert_eq!(parse_file_name("other.pop.h.FG_CO2.185001-189912.nc", "b.e21.001"), None);
        assert_eq!(parse_file_name("b.e21.001.FG_CO2.nc", "b.e21.001"), None);
    }

    #[test]
    fn test_member_files_concatenate_entries_in_order() {
        let entries = vec![
            entry("FG_CO2", 1, &["a1", "a2"]),
            entry("FG_CO2", 2, &["b1"]),
            entry("FG_CO2", 1, &["a3"]),
        ];
        assert_eq!(ensembles(&entries), vec![1, 2]);
        assert_eq!(
            member_files(&entries, 1),
            vec![PathBuf::from("a1"), PathBuf::from("a2"), PathBuf::from("a3")]
        );
    }

    #[test]
    fn test_find_in_index_filters() {
        let mut other = entry("FG_CO2", 1, &["x"]);
        other.experiment = "piControl".to_string();
        let catalog = Catalog::new(vec![entry("FG_CO2", 1, &["a"]), entry("SST", 1, &["b"]), other]);
        let found = catalog
            .find_in_index(&["FG_CO2".to_string()], Component::Ocn, "pop.h", "esm-hist")
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].files, vec![PathBuf::from("a")]);
        assert!(catalog
            .find_in_index(&["FG_CO2".to_string()], Component::Atm, "pop.h", "esm-hist")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_yaml_roundtrip_and_scan() {
        let dir = tempfile::tempdir().unwrap();
        let tseries = dir.path().join("case.001/ocn/proc/tseries/month_1");
        std::fs::create_dir_all(&tseries).unwrap();
        for name in [
            "case.001.pop.h.FG_CO2.000101-001012.nc",
            "case.001.pop.h.FG_CO2.001101-002012.nc",
            "case.001.pop.h.SST.000101-001012.nc",
            "README",
        ] {
            std::fs::write(tseries.join(name), b"").unwrap();
        }
        let experiments = BTreeMap::from([("esm-hist".to_string(), vec!["case.001".to_string()])]);
        let catalog = Catalog::scan(dir.path(), &experiments).unwrap();
        assert_eq!(catalog.entries.len(), 2);
        let fg = &catalog.entries[0];
        assert_eq!(fg.variable, "FG_CO2");
        assert_eq!(fg.ensemble, 1);
        assert_eq!(fg.files.len(), 2);
        assert!(fg.files[0] < fg.files[1]);

        let path = dir.path().join("catalog.yaml");
        std::fs::write(&path, catalog.to_yaml().unwrap()).unwrap();
        assert_eq!(Catalog::from_file(&path).unwrap(), catalog);
    }
}
