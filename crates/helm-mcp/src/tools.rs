//! MCP Tool definitions
//!
//! Every tool is read-only and talks to remote chart repositories.
//!
//! - `search_charts` - List charts in a repository, optionally filtered
//! - `get_versions` - List a chart's versions, newest first
//! - `get_values` - Default values of a chart version, optionally a subtree
//! - `get_dependencies` - Dependencies declared by a chart version
//! - `get_notes` - Raw `NOTES.txt` template of a chart version

use serde::{Deserialize, Serialize};
use serde_json::json;

pub const SEARCH_CHARTS: &str = "search_charts";
pub const GET_VERSIONS: &str = "get_versions";
pub const GET_VALUES: &str = "get_values";
pub const GET_DEPENDENCIES: &str = "get_dependencies";
pub const GET_NOTES: &str = "get_notes";

/// Tool definition for MCP protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub annotations: ToolAnnotations,
}

/// Behaviour hints for clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    pub title: String,
    pub read_only_hint: bool,
    pub open_world_hint: bool,
}

/// Result from a tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(default)]
    pub is_error: bool,
}

/// Content types for tool results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

impl ToolResult {
    /// Create a successful text result
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: content.into(),
            }],
            is_error: false,
        }
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Text of the first content block.
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().map(|c| match c {
            ToolContent::Text { text } => text.as_str(),
        })
    }
}

fn repository_url_property() -> serde_json::Value {
    json!({
        "type": "string",
        "description": "Chart repository URL, e.g. https://prometheus-community.github.io/helm-charts, \
                        or an OCI registry such as oci://ghcr.io/traefik/helm"
    })
}

fn chart_name_property() -> serde_json::Value {
    json!({
        "type": "string",
        "description": "Chart name as listed in the repository index"
    })
}

fn chart_version_property() -> serde_json::Value {
    json!({
        "type": "string",
        "description": "Exact chart version (defaults to the latest non-deprecated version)"
    })
}

fn tool(
    name: &str,
    title: &str,
    description: &str,
    input_schema: serde_json::Value,
) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
        annotations: ToolAnnotations {
            title: title.to_string(),
            read_only_hint: true,
            open_world_hint: true,
        },
    }
}

/// Get all available tool definitions
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        tool(
            SEARCH_CHARTS,
            "Search charts",
            "List the charts published in a Helm chart repository. Returns chart names \
             sorted alphabetically and the total number of matches. OCI registries \
             cannot be browsed; name the chart in the other tools instead.",
            json!({
                "type": "object",
                "properties": {
                    "repository_url": repository_url_property(),
                    "search": {
                        "type": "string",
                        "description": "Case-insensitive substring to match against chart names"
                    },
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": crate::requests::MAX_SEARCH_LIMIT,
                        "description": "Maximum number of chart names to return"
                    }
                },
                "required": ["repository_url"]
            }),
        ),
        tool(
            GET_VERSIONS,
            "Get chart versions",
            "List the published versions of a chart, newest first, with app version, \
             creation date and deprecation flag.",
            json!({
                "type": "object",
                "properties": {
                    "repository_url": repository_url_property(),
                    "chart_name": chart_name_property(),
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": crate::requests::MAX_VERSIONS_LIMIT,
                        "description": "Maximum number of versions to return"
                    }
                },
                "required": ["repository_url", "chart_name"]
            }),
        ),
        tool(
            GET_VALUES,
            "Get chart values",
            "Get the default values.yaml of a chart as YAML text. By default two levels \
             are expanded and arrays show three items; deeper sections are summarised. \
             Use path to select a subtree (e.g. .image), depth 0 for everything, and \
             show_comments to keep the chart's documentation comments.",
            json!({
                "type": "object",
                "properties": {
                    "repository_url": repository_url_property(),
                    "chart_name": chart_name_property(),
                    "chart_version": chart_version_property(),
                    "path": {
                        "type": "string",
                        "description": "Dot-separated path into the values, e.g. .image or .ingress.hosts[0]"
                    },
                    "depth": {
                        "type": "integer",
                        "minimum": 0,
                        "default": helm_chart::collapse::DEFAULT_MAX_DEPTH,
                        "description": "Nesting levels to expand before summarising (0 = unlimited)"
                    },
                    "max_array_items": {
                        "type": "integer",
                        "minimum": 0,
                        "default": helm_chart::collapse::DEFAULT_MAX_ARRAY_ITEMS,
                        "description": "Array items to show before truncating (0 = unlimited)"
                    },
                    "show_defaults": {
                        "type": "boolean",
                        "default": true,
                        "description": "Show default values; false shows only their types"
                    },
                    "show_comments": {
                        "type": "boolean",
                        "default": false,
                        "description": "Keep the comment documenting each key"
                    },
                    "include_schema": {
                        "type": "boolean",
                        "description": "Also return values.schema.json when the chart has one"
                    }
                },
                "required": ["repository_url", "chart_name"]
            }),
        ),
        tool(
            GET_DEPENDENCIES,
            "Get chart dependencies",
            "List the dependencies a chart declares, including those of bundled sub-charts.",
            json!({
                "type": "object",
                "properties": {
                    "repository_url": repository_url_property(),
                    "chart_name": chart_name_property(),
                    "chart_version": chart_version_property()
                },
                "required": ["repository_url", "chart_name"]
            }),
        ),
        tool(
            GET_NOTES,
            "Get chart notes",
            "Get the raw, unrendered NOTES.txt template shown after installing a chart.",
            json!({
                "type": "object",
                "properties": {
                    "repository_url": repository_url_property(),
                    "chart_name": chart_name_property(),
                    "chart_version": chart_version_property()
                },
                "required": ["repository_url", "chart_name"]
            }),
        ),
    ]
}
