//! MCP Server for Helm chart repositories
//!
//! This crate exposes read-only Helm chart repository browsing via the Model
//! Context Protocol, so an agent can inspect charts without installing
//! anything.
//!
//! # Architecture
//!
//! ```text
//! [ MCP Client ]
//!        | (JSON-RPC over Streamable HTTP or stdio)
//!        v
//! [ helm-mcp (McpServer -> ToolDispatcher) ]
//!        | (ChartService)
//!        v
//! [ helm-repo (index resolver, artifact fetcher, caches) ]
//!        |
//!        v
//! [ helm-chart (archive extractor, navigator, collapse) ]
//! ```
//!
//! # Tools
//!
//! - `search_charts` - chart names in a repository
//! - `get_versions` - versions of a chart, newest first
//! - `get_values` - default values, optionally a subtree
//! - `get_dependencies` - declared dependencies
//! - `get_notes` - raw `NOTES.txt` template
//!
//! Malformed calls are JSON-RPC errors. A well-formed call that cannot be
//! satisfied (unreachable repository, unknown chart, missing file) is a tool
//! result with `isError: true`.

pub mod config;
pub mod error;
pub mod handlers;
pub mod http;
pub mod protocol;
pub mod requests;
pub mod server;
pub mod stdio;
pub mod tools;

pub use config::Config;
pub use error::{Error, Result};
pub use handlers::ToolDispatcher;
pub use server::McpServer;
pub use tools::{get_tool_definitions, ToolContent, ToolDefinition, ToolResult};
