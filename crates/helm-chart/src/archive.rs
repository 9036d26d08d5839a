//! Streaming reader for packaged charts
//!
//! A packaged chart is a gzip-compressed tarball whose entries all live under
//! a single root directory, normally named after the chart:
//!
//! ```text
//! alertmanager/Chart.yaml
//! alertmanager/values.yaml
//! alertmanager/templates/NOTES.txt
//! alertmanager/charts/...
//! ```
//!
//! The archive is never unpacked as a whole. Entries are decompressed one at a
//! time and the scan stops as soon as the caller has what it needs.

use std::collections::HashMap;
use std::io::Read;

use bytes::Bytes;
use flate2::read::GzDecoder;

use crate::{Error, Result};

/// Default upper bound for a single extracted file.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 2 * 1024 * 1024;

/// Default upper bound for a bundled sub-chart archive.
pub const DEFAULT_MAX_NESTED_ARCHIVE_BYTES: u64 = 16 * 1024 * 1024;

/// Well-known files inside a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartFile {
    /// `values.yaml`
    Values,
    /// `values.schema.json`
    Schema,
    /// `Chart.yaml`
    Metadata,
    /// `requirements.yaml` (apiVersion v1 charts)
    Requirements,
    /// `templates/NOTES.txt`
    Notes,
}

impl ChartFile {
    /// Path of the file relative to the chart root.
    pub fn path(self) -> &'static str {
        match self {
            ChartFile::Values => "values.yaml",
            ChartFile::Schema => "values.schema.json",
            ChartFile::Metadata => "Chart.yaml",
            ChartFile::Requirements => "requirements.yaml",
            ChartFile::Notes => "templates/NOTES.txt",
        }
    }

    fn matches(self, relative: &str) -> bool {
        match self {
            // Older charts occasionally ship NOTES.txt next to Chart.yaml.
            ChartFile::Notes => relative == "templates/NOTES.txt" || relative == "NOTES.txt",
            other => relative == other.path(),
        }
    }
}

/// Size limits applied while reading an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLimits {
    pub max_file_bytes: u64,
    pub max_nested_archive_bytes: u64,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_nested_archive_bytes: DEFAULT_MAX_NESTED_ARCHIVE_BYTES,
        }
    }
}

/// Whether a scan keeps reading after the current entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scan {
    Continue,
    Stop,
}

/// Raw bytes of a packaged chart.
///
/// Cloning is cheap; the bytes are reference counted and shared with the
/// artifact cache.
#[derive(Debug, Clone)]
pub struct ChartArchive {
    bytes: Bytes,
}

impl ChartArchive {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Read the requested files in a single pass.
    ///
    /// The scan stops once every requested file has been seen. Files that are
    /// absent from the archive are simply missing from the returned map.
    pub fn read_files(
        &self,
        wanted: &[ChartFile],
        limits: ExtractLimits,
    ) -> Result<HashMap<ChartFile, String>> {
        let mut found = HashMap::with_capacity(wanted.len());
        if wanted.is_empty() {
            return Ok(found);
        }

        self.scan(|relative, size, reader| {
            let Some(file) = wanted
                .iter()
                .copied()
                .find(|f| !found.contains_key(f) && f.matches(relative))
            else {
                return Ok(Scan::Continue);
            };

            let text = read_text(reader, relative, size, limits.max_file_bytes)?;
            found.insert(file, text);

            if found.len() == wanted.len() {
                Ok(Scan::Stop)
            } else {
                Ok(Scan::Continue)
            }
        })?;

        tracing::trace!(
            requested = wanted.len(),
            found = found.len(),
            "Scanned chart archive"
        );
        Ok(found)
    }

    /// Read a single file, failing with [`Error::FileNotFound`] when absent.
    pub fn read_file(&self, file: ChartFile, limits: ExtractLimits) -> Result<String> {
        self.read_files(&[file], limits)?
            .remove(&file)
            .ok_or_else(|| Error::file_not_found(file.path()))
    }

    /// Visit every regular file under the chart root.
    ///
    /// `visit` receives the path relative to the root directory, the declared
    /// entry size and a reader positioned at the entry contents.
    pub(crate) fn scan<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&str, u64, &mut dyn Read) -> Result<Scan>,
    {
        let mut archive = tar::Archive::new(GzDecoder::new(&self.bytes[..]));
        let entries = archive.entries().map_err(Error::invalid_archive)?;

        let mut root: Option<String> = None;
        for entry in entries {
            let mut entry = entry.map_err(Error::invalid_archive)?;
            if !entry.header().entry_type().is_file() {
                continue;
            }

            let path = entry
                .path()
                .map_err(Error::invalid_archive)?
                .to_string_lossy()
                .replace('\\', "/");
            let Some((entry_root, relative)) = split_root(&path) else {
                continue;
            };

            match &root {
                None => root = Some(entry_root.to_string()),
                Some(existing) if existing != entry_root => continue,
                Some(_) => {}
            }

            let size = entry.size();
            if visit(relative, size, &mut entry)? == Scan::Stop {
                break;
            }
        }

        if root.is_none() {
            return Err(Error::invalid_archive("archive contains no chart files"));
        }
        Ok(())
    }
}

/// Split `root/rest/of/path` into `("root", "rest/of/path")`.
fn split_root(path: &str) -> Option<(&str, &str)> {
    let mut path = path;
    while let Some(stripped) = path.strip_prefix("./") {
        path = stripped;
    }
    let (root, rest) = path.split_once('/')?;
    if root.is_empty() || rest.is_empty() {
        return None;
    }
    Some((root, rest))
}

/// Read an entry as UTF-8 text, never buffering more than `limit` bytes.
pub(crate) fn read_text(
    reader: &mut dyn Read,
    file: &str,
    size: u64,
    limit: u64,
) -> Result<String> {
    let bytes = read_bytes(reader, file, size, limit)?;
    String::from_utf8(bytes).map_err(|_| Error::parse(file, "file is not valid UTF-8"))
}

pub(crate) fn read_bytes(
    reader: &mut dyn Read,
    file: &str,
    size: u64,
    limit: u64,
) -> Result<Vec<u8>> {
    let too_large = |size| Error::OutputTooLarge {
        file: file.to_string(),
        size,
        limit,
    };
    if size > limit {
        return Err(too_large(size));
    }

    let mut buf = Vec::with_capacity(size as usize);
    Read::take(reader, limit + 1)
        .read_to_end(&mut buf)
        .map_err(Error::invalid_archive)?;
    if buf.len() as u64 > limit {
        return Err(too_large(buf.len() as u64));
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_test_utils::ChartBuilder;
    use rstest::rstest;

    fn archive(builder: ChartBuilder) -> ChartArchive {
        ChartArchive::new(builder.build())
    }

    #[rstest]
    #[case("mychart/values.yaml", Some(("mychart", "values.yaml")))]
    #[case("./mychart/templates/NOTES.txt", Some(("mychart", "templates/NOTES.txt")))]
    #[case("mychart/", None)]
    #[case("values.yaml", None)]
    fn split_root_cases(#[case] input: &str, #[case] expected: Option<(&str, &str)>) {
        assert_eq!(split_root(input), expected);
    }

    #[test]
    fn reads_values_from_nested_root() {
        let chart = archive(ChartBuilder::new("demo", "1.0.0").values("replicaCount: 1\n"));
        let text = chart
            .read_file(ChartFile::Values, ExtractLimits::default())
            .unwrap();
        assert_eq!(text, "replicaCount: 1\n");
    }

    #[test]
    fn missing_file_is_reported_by_name() {
        let chart = archive(ChartBuilder::new("demo", "1.0.0"));
        let err = chart
            .read_file(ChartFile::Notes, ExtractLimits::default())
            .unwrap_err();
        assert_eq!(err, Error::file_not_found("templates/NOTES.txt"));
    }

    #[test]
    fn read_files_returns_only_present_files() {
        let chart = archive(
            ChartBuilder::new("demo", "1.0.0")
                .values("a: 1\n")
                .schema(r#"{"type":"object"}"#),
        );
        let found = chart
            .read_files(
                &[ChartFile::Values, ChartFile::Schema, ChartFile::Notes],
                ExtractLimits::default(),
            )
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[&ChartFile::Schema], r#"{"type":"object"}"#);
        assert!(!found.contains_key(&ChartFile::Notes));
    }

    #[test]
    fn subchart_files_do_not_shadow_root_files() {
        let chart = archive(
            ChartBuilder::new("parent", "1.0.0")
                .values("owner: parent\n")
                .subchart(ChartBuilder::new("child", "0.1.0").values("owner: child\n")),
        );
        let text = chart
            .read_file(ChartFile::Values, ExtractLimits::default())
            .unwrap();
        assert_eq!(text, "owner: parent\n");
    }

    #[test]
    fn oversized_file_is_rejected() {
        let chart = archive(ChartBuilder::new("demo", "1.0.0").values("x".repeat(64)));
        let limits = ExtractLimits {
            max_file_bytes: 16,
            ..ExtractLimits::default()
        };
        let err = chart.read_file(ChartFile::Values, limits).unwrap_err();
        assert!(matches!(err, Error::OutputTooLarge { size: 64, limit: 16, .. }));
    }

    #[test]
    fn garbage_bytes_are_an_invalid_archive() {
        let chart = ChartArchive::new(b"definitely not gzip".to_vec());
        let err = chart
            .read_file(ChartFile::Values, ExtractLimits::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArchive { .. }));
    }

    #[test]
    fn notes_at_chart_root_are_accepted() {
        let chart = archive(
            ChartBuilder::new("demo", "1.0.0").file("NOTES.txt", "legacy notes location"),
        );
        let text = chart
            .read_file(ChartFile::Notes, ExtractLimits::default())
            .unwrap();
        assert_eq!(text, "legacy notes location");
    }
}
