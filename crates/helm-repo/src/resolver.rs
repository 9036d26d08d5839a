//! Repository index resolution with caching and request deduplication

use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use url::Url;

use crate::cache::{CacheStats, TtlCache};
use crate::fetch::HttpFetcher;
use crate::index::RepositoryIndex;
use crate::oci::{OciReference, OciRegistry};
use crate::options::ClientOptions;
use crate::singleflight::{Role, SingleFlight};
use crate::{Error, Result};

/// Resolves repository URLs to parsed indexes.
///
/// Indexes are cached per normalised repository URL until their TTL expires.
/// Failures are never cached.
pub struct IndexResolver {
    fetcher: Arc<HttpFetcher>,
    cache: Arc<TtlCache<String, Arc<RepositoryIndex>>>,
    flights: SingleFlight<String, Arc<RepositoryIndex>>,
    max_index_bytes: u64,
}

impl IndexResolver {
    pub fn new(fetcher: Arc<HttpFetcher>, options: &ClientOptions) -> Self {
        Self {
            fetcher,
            cache: Arc::new(TtlCache::new(options.index_cache_size, options.index_ttl)),
            flights: SingleFlight::new(),
            max_index_bytes: options.max_index_bytes,
        }
    }

    /// Resolve an already validated and normalised repository URL.
    pub async fn resolve(&self, repository: &str) -> Result<Arc<RepositoryIndex>> {
        let fetcher = self.fetcher.clone();
        let max_bytes = self.max_index_bytes;
        self.cached(repository.to_string(), move |key| {
            async move { fetch_index(&fetcher, &key, max_bytes).await }.boxed()
        })
        .await
    }

    /// Resolve the tags of a chart in an OCI registry.
    ///
    /// Tag lists share the index cache, keyed by the chart's reference.
    pub async fn resolve_tags(
        &self,
        registry: Arc<OciRegistry>,
        reference: OciReference,
    ) -> Result<Arc<RepositoryIndex>> {
        self.cached(reference.to_string(), move |_| {
            async move { registry.versions(&reference).await }.boxed()
        })
        .await
    }

    async fn cached<F>(&self, key: String, load: F) -> Result<Arc<RepositoryIndex>>
    where
        F: FnOnce(String) -> BoxFuture<'static, Result<RepositoryIndex>> + Send + 'static,
    {
        if let Some(index) = self.cache.get(&key) {
            tracing::debug!(repository = %key, "Index cache hit");
            return Ok(index);
        }

        let cache = self.cache.clone();
        let (role, result) = self
            .flights
            .run(key.clone(), {
                let key = key.clone();
                move || {
                    async move {
                        // A fetch that completed between our cache miss and
                        // registering this flight has already filled the cache.
                        if let Some(index) = cache.get_uncounted(&key) {
                            return Ok(index);
                        }
                        let index = Arc::new(load(key.clone()).await?);
                        tracing::info!(
                            repository = %key,
                            charts = index.len(),
                            "Fetched repository index"
                        );
                        cache.insert(key, index.clone());
                        Ok(index)
                    }
                    .boxed()
                }
            })
            .await;

        if role == Role::Follower {
            tracing::debug!(repository = %key, "Joined in-flight index fetch");
        }
        result
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

async fn fetch_index(fetcher: &HttpFetcher, repository: &str, max_bytes: u64) -> Result<RepositoryIndex> {
    let url = Url::parse(&format!("{repository}/index.yaml"))
        .map_err(|e| Error::invalid_url(repository, e))?;
    let body = fetcher
        .get(&url, max_bytes)
        .await
        .map_err(|e| Error::repository_unavailable(repository, format!("failed to fetch index: {e}")))?;
    parse_index(repository, body).await
}

/// Parse on the blocking pool; large indexes take long enough to stall a
/// runtime worker.
async fn parse_index(repository: &str, body: Bytes) -> Result<RepositoryIndex> {
    let owned = repository.to_string();
    tokio::task::spawn_blocking(move || RepositoryIndex::parse(&owned, &body))
        .await
        .map_err(|e| Error::repository_unavailable(repository, format!("index parse task failed: {e}")))?
}
