//! Repository index (`index.yaml`) model
//!
//! Parsing is tolerant: entries without a version are skipped, numeric
//! scalars are read as strings, and timestamps that fail to parse are
//! dropped rather than failing the whole document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use helm_chart::yaml::{optional_scalar, scalar};
use serde::Deserialize;

use crate::version::sort_descending;
use crate::{Error, Result};

/// One published version of a chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartVersionEntry {
    pub name: String,
    pub version: String,
    pub app_version: Option<String>,
    pub description: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub deprecated: bool,
    /// Download URLs, absolute or relative to the repository
    pub urls: Vec<String>,
    /// sha256 of the archive, hex encoded
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawIndex {
    #[serde(default)]
    entries: Option<BTreeMap<String, Option<Vec<Option<RawEntry>>>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    #[serde(default, deserialize_with = "scalar")]
    name: String,
    #[serde(default, deserialize_with = "scalar")]
    version: String,
    #[serde(default, deserialize_with = "optional_scalar")]
    app_version: Option<String>,
    #[serde(default, deserialize_with = "optional_scalar")]
    description: Option<String>,
    #[serde(default, deserialize_with = "optional_scalar")]
    created: Option<String>,
    #[serde(default)]
    deprecated: Option<bool>,
    #[serde(default)]
    urls: Option<Vec<String>>,
    #[serde(default, deserialize_with = "optional_scalar")]
    digest: Option<String>,
}

impl RawEntry {
    fn into_entry(self, chart: &str) -> ChartVersionEntry {
        ChartVersionEntry {
            name: if self.name.is_empty() {
                chart.to_string()
            } else {
                self.name
            },
            version: self.version,
            app_version: self.app_version,
            description: self.description,
            created: self
                .created
                .and_then(|c| DateTime::parse_from_rfc3339(&c).ok())
                .map(|c| c.with_timezone(&Utc)),
            deprecated: self.deprecated.unwrap_or(false),
            urls: self
                .urls
                .unwrap_or_default()
                .into_iter()
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect(),
            digest: self.digest,
        }
    }
}

/// Parsed catalog of a chart repository.
///
/// Versions of each chart are unique and ordered newest first; versions
/// that compare equal keep the order the repository listed them in.
#[derive(Debug, Clone)]
pub struct RepositoryIndex {
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    charts: BTreeMap<String, Vec<ChartVersionEntry>>,
}

impl RepositoryIndex {
    pub fn parse(url: &str, text: &[u8]) -> Result<Self> {
        let raw: Option<RawIndex> = serde_yaml::from_slice(text)
            .map_err(|e| Error::repository_unavailable(url, format!("invalid index.yaml: {e}")))?;
        let entries = raw
            .and_then(|r| r.entries)
            .ok_or_else(|| Error::repository_unavailable(url, "index.yaml has no entries"))?;

        let mut charts = BTreeMap::new();
        for (name, versions) in entries {
            let mut seen = std::collections::HashSet::new();
            let mut list: Vec<ChartVersionEntry> = versions
                .unwrap_or_default()
                .into_iter()
                .flatten()
                .map(|raw| raw.into_entry(&name))
                .filter(|entry| !entry.version.is_empty())
                .filter(|entry| seen.insert(entry.version.clone()))
                .collect();
            if list.is_empty() {
                continue;
            }
            sort_descending(&mut list, |entry| entry.version.as_str());
            charts.insert(name, list);
        }

        Ok(Self {
            url: url.to_string(),
            fetched_at: Utc::now(),
            charts,
        })
    }

    /// An index of one chart whose only metadata is its version strings.
    pub fn from_versions(url: &str, chart: &str, versions: impl IntoIterator<Item = String>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut list: Vec<ChartVersionEntry> = versions
            .into_iter()
            .filter(|version| !version.is_empty() && seen.insert(version.clone()))
            .map(|version| ChartVersionEntry {
                name: chart.to_string(),
                version,
                app_version: None,
                description: None,
                created: None,
                deprecated: false,
                urls: Vec::new(),
                digest: None,
            })
            .collect();
        sort_descending(&mut list, |entry| entry.version.as_str());

        let mut charts = BTreeMap::new();
        if !list.is_empty() {
            charts.insert(chart.to_string(), list);
        }
        Self {
            url: url.to_string(),
            fetched_at: Utc::now(),
            charts,
        }
    }

    /// Chart names in ascending order.
    pub fn chart_names(&self) -> impl Iterator<Item = &str> {
        self.charts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }

    /// Versions of `chart`, newest first.
    pub fn versions(&self, chart: &str) -> Result<&[ChartVersionEntry]> {
        self.charts
            .get(chart)
            .map(Vec::as_slice)
            .ok_or_else(|| self.not_found(chart, None))
    }

    /// Pick a version of `chart`.
    ///
    /// With no explicit version the newest non-deprecated version wins,
    /// falling back to the newest if every version is deprecated. An explicit
    /// version must match a published version string exactly.
    pub fn select(&self, chart: &str, version: Option<&str>) -> Result<&ChartVersionEntry> {
        let versions = self.versions(chart)?;
        match version.map(str::trim).filter(|v| !v.is_empty()) {
            Some(wanted) => versions
                .iter()
                .find(|entry| entry.version == wanted)
                .ok_or_else(|| self.not_found(chart, Some(wanted))),
            None => versions
                .iter()
                .find(|entry| !entry.deprecated)
                .or_else(|| versions.first())
                .ok_or_else(|| self.not_found(chart, None)),
        }
    }

    fn not_found(&self, chart: &str, version: Option<&str>) -> Error {
        Error::ChartNotFound {
            repository: self.url.clone(),
            chart: chart.to_string(),
            version: version.map(str::to_string),
        }
    }
}
