//! Shared test utilities for the Helm MCP workspace.
//!
//! This crate is a dev-dependency only and never published.
//!
//! # Modules
//!
//! - [`chart`] - [`ChartBuilder`] for in-memory `.tgz` chart archives
//! - [`index`] - [`IndexBuilder`] for repository `index.yaml` documents
//! - [`server`] - [`FixtureRepo`], a local HTTP chart repository and OCI
//!   registry that counts requests

pub mod chart;
pub mod index;
pub mod server;

pub use chart::{sha256_hex, ChartBuilder};
pub use index::{IndexBuilder, IndexEntry};
pub use server::FixtureRepo;

pub use axum::http::StatusCode;
