//! Chart archive download and caching

use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use helm_chart::ChartArchive;
use sha2::{Digest, Sha256};

use crate::cache::{CacheStats, TtlCache};
use crate::fetch::{FetchError, HttpFetcher};
use crate::index::ChartVersionEntry;
use crate::oci::{OciReference, OciRegistry};
use crate::options::ClientOptions;
use crate::singleflight::{Role, SingleFlight};
use crate::validation::{is_oci, validate_chart_url, ValidationOptions};
use crate::{Error, Result};

/// Cache key for a chart archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub repository: String,
    pub chart: String,
    pub version: String,
}

/// Downloads chart archives, verifying size and digest, and caches them
/// independently of the repository index.
///
/// Archives of `oci://` repositories are pulled from the registry; all
/// others come from the URLs in their index entry.
pub struct ArtifactFetcher {
    fetcher: Arc<HttpFetcher>,
    oci: Arc<OciRegistry>,
    cache: Arc<TtlCache<ArtifactKey, ChartArchive>>,
    flights: SingleFlight<ArtifactKey, ChartArchive>,
    validation: Arc<ValidationOptions>,
    max_chart_bytes: u64,
}

impl ArtifactFetcher {
    pub fn new(fetcher: Arc<HttpFetcher>, oci: Arc<OciRegistry>, options: &ClientOptions) -> Self {
        Self {
            fetcher,
            oci,
            cache: Arc::new(TtlCache::new(options.chart_cache_size, options.chart_ttl)),
            flights: SingleFlight::new(),
            validation: Arc::new(options.validation.clone()),
            max_chart_bytes: options.max_chart_bytes,
        }
    }

    pub async fn fetch(&self, repository: &str, entry: &ChartVersionEntry) -> Result<ChartArchive> {
        let key = ArtifactKey {
            repository: repository.to_string(),
            chart: entry.name.clone(),
            version: entry.version.clone(),
        };
        if let Some(archive) = self.cache.get(&key) {
            tracing::debug!(chart = %key.chart, version = %key.version, "Chart cache hit");
            return Ok(archive);
        }

        let job = Download {
            fetcher: self.fetcher.clone(),
            oci: self.oci.clone(),
            cache: self.cache.clone(),
            validation: self.validation.clone(),
            max_bytes: self.max_chart_bytes,
            key: key.clone(),
            entry: entry.clone(),
        };
        let (role, result) = self
            .flights
            .run(key.clone(), move || job.run().boxed())
            .await;

        if role == Role::Follower {
            tracing::debug!(chart = %key.chart, version = %key.version, "Joined in-flight chart fetch");
        }
        result
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

/// Everything one download needs, owned so it can outlive the caller.
struct Download {
    fetcher: Arc<HttpFetcher>,
    oci: Arc<OciRegistry>,
    cache: Arc<TtlCache<ArtifactKey, ChartArchive>>,
    validation: Arc<ValidationOptions>,
    max_bytes: u64,
    key: ArtifactKey,
    entry: ChartVersionEntry,
}

impl Download {
    async fn run(self) -> Result<ChartArchive> {
        if let Some(archive) = self.cache.get_uncounted(&self.key) {
            return Ok(archive);
        }

        let bytes = if is_oci(&self.key.repository) {
            let reference = OciReference::new(&self.key.repository, &self.key.chart)?;
            self.oci.pull(&reference, &self.key.version, self.max_bytes).await?
        } else {
            self.download().await?
        };

        tracing::info!(
            chart = %self.key.chart,
            version = %self.key.version,
            bytes = bytes.len(),
            "Fetched chart archive"
        );
        let archive = ChartArchive::new(bytes);
        self.cache.insert(self.key, archive.clone());
        Ok(archive)
    }

    /// Fetch from the entry's first URL and check the index digest.
    async fn download(&self) -> Result<Bytes> {
        let raw_url = self
            .entry
            .urls
            .first()
            .ok_or_else(|| self.unavailable("index entry lists no download URLs"))?;
        let resolved = resolve_chart_url(&self.key.repository, raw_url);
        let url = validate_chart_url(&resolved, &self.validation).await?;

        let bytes = self
            .fetcher
            .get(&url, self.max_bytes)
            .await
            .map_err(|e| match e {
                FetchError::TooLarge { size, limit } => {
                    self.unavailable(format!("chart archive too large ({size} bytes, limit {limit})"))
                }
                other => self.unavailable(format!("failed to download {url}: {other}")),
            })?;

        if let Some(expected) = self.entry.digest.as_deref() {
            let actual = hex::encode(Sha256::digest(&bytes));
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                return Err(self.unavailable(format!(
                    "digest mismatch (expected {expected}, got {actual})"
                )));
            }
        }
        Ok(bytes)
    }

    fn unavailable(&self, message: impl ToString) -> Error {
        Error::ChartUnavailable {
            chart: self.key.chart.clone(),
            version: self.key.version.clone(),
            message: message.to_string(),
        }
    }
}

/// Resolve an index URL against the repository it came from.
fn resolve_chart_url(repository: &str, url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("{repository}/{}", url.trim_start_matches('/'))
    }
}
