//! Typed tool requests
//!
//! Tool arguments arrive as loose JSON. [`ToolRequest::parse`] turns them
//! into one variant per tool, rejecting missing or blank required
//! parameters, mistyped values and out-of-range limits before any network
//! work starts.

use helm_chart::collapse::{DEFAULT_MAX_ARRAY_ITEMS, DEFAULT_MAX_DEPTH};
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{GET_DEPENDENCIES, GET_NOTES, GET_VALUES, GET_VERSIONS, SEARCH_CHARTS};
use crate::{Error, Result};

/// Upper bound for `search_charts.limit`
pub const MAX_SEARCH_LIMIT: usize = 200;
/// Upper bound for `get_versions.limit`
pub const MAX_VERSIONS_LIMIT: usize = 100;

/// A chart in a repository, optionally pinned to a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRef {
    pub repository_url: String,
    pub chart_name: String,
    /// `None` selects the latest non-deprecated version
    pub chart_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCharts {
    pub repository_url: String,
    pub search: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetVersions {
    pub repository_url: String,
    pub chart_name: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetValues {
    pub chart: ChartRef,
    pub path: Option<String>,
    /// 0 is unlimited
    pub depth: usize,
    /// 0 is unlimited
    pub max_array_items: usize,
    pub show_defaults: bool,
    pub show_comments: bool,
    pub include_schema: bool,
}

/// A validated tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    SearchCharts(SearchCharts),
    GetVersions(GetVersions),
    GetValues(GetValues),
    GetDependencies(ChartRef),
    GetNotes(ChartRef),
}

#[derive(Debug, Default, Deserialize)]
struct RawArgs {
    repository_url: Option<String>,
    chart_name: Option<String>,
    chart_version: Option<String>,
    search: Option<String>,
    limit: Option<i64>,
    path: Option<String>,
    depth: Option<u64>,
    max_array_items: Option<u64>,
    show_defaults: Option<bool>,
    show_comments: Option<bool>,
    include_schema: Option<bool>,
}

impl RawArgs {
    fn required(value: &Option<String>, name: &str) -> Result<String> {
        match value.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => Ok(v.to_string()),
            Some(_) => Err(Error::InvalidParams(format!("{name} must not be blank"))),
            None => Err(Error::InvalidParams(format!("missing required parameter: {name}"))),
        }
    }

    fn optional(value: &Option<String>) -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn limit(&self, max: usize) -> Result<Option<usize>> {
        match self.limit {
            None => Ok(None),
            Some(n) if n < 1 => Err(Error::InvalidParams(format!(
                "limit must be at least 1, got {n}"
            ))),
            Some(n) => Ok(Some(usize::try_from(n).unwrap_or(max).min(max))),
        }
    }

    fn chart(&self) -> Result<ChartRef> {
        Ok(ChartRef {
            repository_url: Self::required(&self.repository_url, "repository_url")?,
            chart_name: Self::required(&self.chart_name, "chart_name")?,
            chart_version: Self::optional(&self.chart_version),
        })
    }
}

impl ToolRequest {
    pub fn parse(tool: &str, arguments: Value) -> Result<Self> {
        let raw = decode(tool, arguments)?;
        let request = match tool {
            SEARCH_CHARTS => ToolRequest::SearchCharts(SearchCharts {
                repository_url: RawArgs::required(&raw.repository_url, "repository_url")?,
                search: RawArgs::optional(&raw.search),
                limit: raw.limit(MAX_SEARCH_LIMIT)?,
            }),
            GET_VERSIONS => ToolRequest::GetVersions(GetVersions {
                repository_url: RawArgs::required(&raw.repository_url, "repository_url")?,
                chart_name: RawArgs::required(&raw.chart_name, "chart_name")?,
                limit: raw.limit(MAX_VERSIONS_LIMIT)?,
            }),
            GET_VALUES => ToolRequest::GetValues(GetValues {
                chart: raw.chart()?,
                path: RawArgs::optional(&raw.path),
                depth: to_usize(raw.depth, DEFAULT_MAX_DEPTH),
                max_array_items: to_usize(raw.max_array_items, DEFAULT_MAX_ARRAY_ITEMS),
                show_defaults: raw.show_defaults.unwrap_or(true),
                show_comments: raw.show_comments.unwrap_or(false),
                include_schema: raw.include_schema.unwrap_or(false),
            }),
            GET_DEPENDENCIES => ToolRequest::GetDependencies(raw.chart()?),
            GET_NOTES => ToolRequest::GetNotes(raw.chart()?),
            other => return Err(Error::UnknownTool(other.to_string())),
        };
        Ok(request)
    }

    /// Tool name this request was parsed for.
    pub fn tool(&self) -> &'static str {
        match self {
            ToolRequest::SearchCharts(_) => SEARCH_CHARTS,
            ToolRequest::GetVersions(_) => GET_VERSIONS,
            ToolRequest::GetValues(_) => GET_VALUES,
            ToolRequest::GetDependencies(_) => GET_DEPENDENCIES,
            ToolRequest::GetNotes(_) => GET_NOTES,
        }
    }
}

fn decode(tool: &str, arguments: Value) -> Result<RawArgs> {
    match arguments {
        Value::Null => Ok(RawArgs::default()),
        Value::Object(_) => serde_json::from_value(arguments)
            .map_err(|e| Error::InvalidParams(format!("invalid arguments for {tool}: {e}"))),
        _ => Err(Error::InvalidParams(format!(
            "arguments for {tool} must be an object"
        ))),
    }
}

fn to_usize(value: Option<u64>, default: usize) -> usize {
    value.map_or(default, |v| usize::try_from(v).unwrap_or(usize::MAX))
}
