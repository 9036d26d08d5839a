//! Packaged chart reading for the Helm MCP server
//!
//! This crate reads `.tgz` chart archives without unpacking them to disk and
//! exposes the pieces the server reports on:
//!
//! - [`ChartArchive`] - streaming access to files under the chart root
//! - [`metadata`] - `Chart.yaml` / `requirements.yaml` and bundled sub-charts
//! - [`navigate`] - dot-path lookups into parsed values
//! - [`collapse`] - depth-limited YAML rendering under a size budget
//! - [`comments`] - key comments recovered from values text
//! - [`ValuesDocument`] - a values file as text, tree and comments

pub mod archive;
pub mod collapse;
pub mod comments;
mod content;
pub mod error;
pub mod metadata;
pub mod navigate;
pub mod values;
pub mod yaml;

pub use archive::{ChartArchive, ChartFile, ExtractLimits};
pub use collapse::{CollapseOptions, Rendered};
pub use comments::KeyComments;
pub use error::{Error, Result};
pub use metadata::{ChartMetadata, ChartNode, Dependency};
pub use values::ValuesDocument;
