//! Several files viewed as one dataset along a shared dimension.
//!
//! Opening reads only headers: variables without the concat dimension are
//! loaded in full from the first file, variables along it are kept as
//! zero-length templates. Data along the concat dimension is read on demand,
//! one half-open range at a time, so a caller iterating over blocks never
//! holds more than one block of the series.

use std::ops::Range;
use std::path::{Path, PathBuf};

use cesm_common::{TseriesError, TseriesResult};
use tracing::debug;

use super::{read_header, read_slice};
use crate::dataset::Dataset;
use crate::variable::Variable;

#[derive(Debug, Clone, PartialEq)]
struct MemberFile {
    path: PathBuf,
    /// Index of the file's first step in the combined axis.
    offset: usize,
    len: usize,
}

/// Lazily combined files, ordered along the concat dimension.
#[derive(Debug, Clone)]
pub struct MfDataset {
    concat_dim: String,
    files: Vec<MemberFile>,
    header: Dataset,
    len: usize,
}

/// Open several files as one dataset concatenated along `concat_dim`.
///
/// Files are ordered by the first value of the `concat_dim` coordinate when
/// every file has one, otherwise kept in the given order. Variables without
/// `concat_dim` are taken from the first file and never broadcast; global
/// attributes and encoding also come from the first file. `drop_variables`
/// are never read.
pub fn open_mfdataset<P: AsRef<Path>>(
    paths: &[P],
    concat_dim: &str,
    drop_variables: &[String],
) -> TseriesResult<MfDataset> {
    if paths.is_empty() {
        return Err(TseriesError::InvalidFormat("open_mfdataset called with no paths".into()));
    }

    let mut scanned = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let (header, len, first) = read_header(path, concat_dim)?;
        scanned.push((path.to_path_buf(), header, len, first));
    }

    if scanned.iter().all(|(_, _, _, first)| first.is_some()) {
        let unordered = scanned.windows(2).any(|w| w[1].3 < w[0].3);
        if unordered {
            debug!(concat_dim, "Reordering files by coordinate");
            scanned.sort_by(|a, b| a.3.unwrap_or(f64::NAN).total_cmp(&b.3.unwrap_or(f64::NAN)));
        }
    }

    let mut files = Vec::with_capacity(scanned.len());
    let mut offset = 0;
    let mut header = None;
    for (path, file_header, len, _) in scanned {
        files.push(MemberFile { path, offset, len });
        offset += len;
        if header.is_none() {
            header = Some(file_header);
        }
    }
    let mut header = header
        .ok_or_else(|| TseriesError::InvalidFormat("open_mfdataset found no readable files".into()))?
        .drop_vars(drop_variables);
    header.encoding.source = None;

    debug!(files = files.len(), len = offset, concat_dim, "Opened multi-file dataset");
    Ok(MfDataset {
        concat_dim: concat_dim.to_string(),
        files,
        header,
        len: offset,
    })
}

impl MfDataset {
    /// Length of the combined concat dimension.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn concat_dim(&self) -> &str {
        &self.concat_dim
    }

    /// Metadata of every variable; those along the concat dimension have
    /// length 0 there.
    pub fn header(&self) -> &Dataset {
        &self.header
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    /// Read `names` over `range` of the concat dimension.
    ///
    /// Variables without the concat dimension come from the header. Attrs
    /// and encoding of every variable are those of the first file.
    pub fn read<S: AsRef<str>>(&self, names: &[S], range: Range<usize>) -> TseriesResult<Dataset> {
        if range.start > range.end || range.end > self.len {
            return Err(TseriesError::InvalidFormat(format!(
                "range {:?} out of bounds for '{}' of length {}",
                range, self.concat_dim, self.len
            )));
        }
        let along: Vec<String> = names
            .iter()
            .map(AsRef::as_ref)
            .filter(|n| self.header.get(n).map_or(false, |v| v.has_dim(&self.concat_dim)))
            .map(str::to_string)
            .collect();

        let mut pieces = Vec::new();
        for file in &self.files {
            let start = range.start.max(file.offset);
            let end = range.end.min(file.offset + file.len);
            if start >= end {
                continue;
            }
            let local = start - file.offset..end - file.offset;
            debug!(path = %file.path.display(), start = local.start, end = local.end, "Reading slice");
            pieces.push(read_slice(&file.path, &along, &self.concat_dim, local)?);
        }

        let mut out = if pieces.is_empty() {
            self.header.select(&along)?
        } else {
            let refs: Vec<&Dataset> = pieces.iter().collect();
            Dataset::concat(&refs, &self.concat_dim)?
        };
        out.attrs = self.header.attrs.clone();
        out.encoding = self.header.encoding.clone();
        for (name, var) in out.iter_mut() {
            if let Some(template) = self.header.get(name) {
                var.attrs = template.attrs.clone();
                var.encoding = template.encoding.clone();
            }
        }
        for name in names {
            let name = name.as_ref();
            if !out.contains(name) {
                out.insert(name, self.header.var(name)?.clone())?;
            }
        }
        Ok(out)
    }

    /// One variable over `range`.
    pub fn read_var(&self, name: &str, range: Range<usize>) -> TseriesResult<Variable> {
        let mut ds = self.read(&[name], range)?;
        ds.remove(name)
            .ok_or_else(|| TseriesError::MissingVariable(name.to_string()))
    }

    /// Every variable over the whole concat dimension.
    pub fn load(&self) -> TseriesResult<Dataset> {
        let names: Vec<String> = self.header.names().map(str::to_string).collect();
        self.read(&names, 0..self.len)
    }
}
