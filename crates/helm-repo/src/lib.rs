//! Helm chart repository client
//!
//! Resolves HTTP chart repositories to their `index.yaml` catalog, selects
//! chart versions, downloads chart archives and reads their content through
//! [`helm_chart`]. Charts in OCI registries (`oci://`) are looked up by name
//! through their tags.
//!
//! Both the repository indexes and the chart archives are held in TTL + LRU
//! caches shared by every caller, and concurrent requests for the same
//! repository or chart version share a single download.
//!
//! # Example
//!
//! ```rust,no_run
//! use helm_repo::{ChartService, ClientOptions, HelmClient};
//!
//! # async fn demo() -> helm_repo::Result<()> {
//! let client = HelmClient::new(ClientOptions::default())?;
//! let charts = client.list_charts("https://prometheus-community.github.io/helm-charts").await?;
//! let notes = client
//!     .notes("https://prometheus-community.github.io/helm-charts", "alertmanager", None)
//!     .await?;
//! println!("{} charts, notes for {}", charts.len(), notes.version);
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod cache;
pub mod error;
pub mod fetch;
pub mod index;
pub mod oci;
pub mod options;
pub mod resolver;
pub mod service;
pub mod singleflight;
pub mod validation;
pub mod version;

pub use cache::CacheStats;
pub use error::{Error, Result};
pub use index::{ChartVersionEntry, RepositoryIndex};
pub use options::ClientOptions;
pub use service::{ChartService, HelmClient, ServiceStats, Versioned};
pub use validation::ValidationOptions;
pub use version::compare_versions;
