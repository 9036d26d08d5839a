//! High-level chart operations

use std::sync::Arc;

use async_trait::async_trait;
use helm_chart::{ChartArchive, Dependency, ExtractLimits, ValuesDocument};

use crate::artifact::ArtifactFetcher;
use crate::cache::CacheStats;
use crate::fetch::HttpFetcher;
use crate::index::{ChartVersionEntry, RepositoryIndex};
use crate::oci::{OciReference, OciRegistry};
use crate::options::ClientOptions;
use crate::resolver::IndexResolver;
use crate::validation::{is_oci, validate_registry_url, validate_repository_url, ValidationOptions};
use crate::{Error, Result};

/// Content read from a specific chart version.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    /// The version the content was read from
    pub version: String,
    pub content: T,
}

/// Hit/miss counters of both caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub index: CacheStats,
    pub charts: CacheStats,
}

/// Operations the tool layer needs from a chart repository backend.
///
/// `version` arguments are optional: `None` selects the newest
/// non-deprecated version.
#[async_trait]
pub trait ChartService: Send + Sync {
    /// Chart names in ascending order.
    async fn list_charts(&self, repository_url: &str) -> Result<Vec<String>>;

    /// Versions of a chart, newest first.
    async fn list_versions(&self, repository_url: &str, chart: &str) -> Result<Vec<ChartVersionEntry>>;

    async fn values(
        &self,
        repository_url: &str,
        chart: &str,
        version: Option<&str>,
    ) -> Result<Versioned<ValuesDocument>>;

    /// `values.schema.json` of an exact version, if present.
    async fn values_schema(&self, repository_url: &str, chart: &str, version: &str) -> Result<Option<String>>;

    async fn notes(&self, repository_url: &str, chart: &str, version: Option<&str>) -> Result<Versioned<String>>;

    async fn dependencies(
        &self,
        repository_url: &str,
        chart: &str,
        version: Option<&str>,
    ) -> Result<Versioned<Vec<Dependency>>>;

    fn stats(&self) -> ServiceStats;
}

/// [`ChartService`] backed by HTTP chart repositories and OCI registries.
///
/// OCI registries cannot be listed; every other operation works on a named
/// chart through its tags.
pub struct HelmClient {
    resolver: IndexResolver,
    artifacts: ArtifactFetcher,
    oci: Arc<OciRegistry>,
    validation: ValidationOptions,
    limits: ExtractLimits,
}

impl HelmClient {
    pub fn new(options: ClientOptions) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&options)?);
        let oci = Arc::new(OciRegistry::new(fetcher.clone(), &options));
        Ok(Self {
            resolver: IndexResolver::new(fetcher.clone(), &options),
            artifacts: ArtifactFetcher::new(fetcher, oci.clone(), &options),
            oci,
            validation: options.validation.clone(),
            limits: ExtractLimits {
                max_file_bytes: options.max_output_bytes,
                ..ExtractLimits::default()
            },
        })
    }

    async fn index(&self, repository_url: &str) -> Result<Arc<RepositoryIndex>> {
        let repository = validate_repository_url(repository_url, &self.validation).await?;
        self.resolver.resolve(&repository).await
    }

    /// The index holding `chart`: the repository index, or the chart's tags
    /// for an OCI registry.
    async fn chart_index(&self, repository_url: &str, chart: &str) -> Result<Arc<RepositoryIndex>> {
        if !is_oci(repository_url) {
            return self.index(repository_url).await;
        }
        let registry = validate_registry_url(repository_url, &self.validation).await?;
        let reference = OciReference::new(&registry, chart)?;
        self.resolver.resolve_tags(self.oci.clone(), reference).await
    }

    /// Resolve, select and download a chart version.
    async fn archive(
        &self,
        repository_url: &str,
        chart: &str,
        version: Option<&str>,
    ) -> Result<(ChartVersionEntry, ChartArchive)> {
        let index = self.chart_index(repository_url, chart).await?;
        let entry = index.select(chart, version)?.clone();
        let archive = self.artifacts.fetch(&index.url, &entry).await?;
        Ok((entry, archive))
    }

    /// Run CPU-bound extraction off the async workers.
    async fn extract<T, F>(&self, archive: ChartArchive, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&ChartArchive, ExtractLimits) -> helm_chart::Result<T> + Send + 'static,
    {
        let limits = self.limits;
        tokio::task::spawn_blocking(move || f(&archive, limits))
            .await
            .map_err(|e| Error::Internal(format!("extraction task failed: {e}")))?
            .map_err(Error::from)
    }
}

#[async_trait]
impl ChartService for HelmClient {
    async fn list_charts(&self, repository_url: &str) -> Result<Vec<String>> {
        if is_oci(repository_url) {
            let registry = validate_registry_url(repository_url, &self.validation).await?;
            return Err(Error::repository_unavailable(
                &registry,
                "OCI registries do not support listing charts; use get_versions or get_values with a chart name",
            ));
        }
        let index = self.index(repository_url).await?;
        Ok(index.chart_names().map(str::to_string).collect())
    }

    async fn list_versions(&self, repository_url: &str, chart: &str) -> Result<Vec<ChartVersionEntry>> {
        let index = self.chart_index(repository_url, chart).await?;
        Ok(index.versions(chart)?.to_vec())
    }

    async fn values(
        &self,
        repository_url: &str,
        chart: &str,
        version: Option<&str>,
    ) -> Result<Versioned<ValuesDocument>> {
        let (entry, archive) = self.archive(repository_url, chart, version).await?;
        let values = self.extract(archive, |a, limits| a.values(limits)).await?;
        Ok(Versioned {
            version: entry.version,
            content: values,
        })
    }

    async fn values_schema(&self, repository_url: &str, chart: &str, version: &str) -> Result<Option<String>> {
        let (_, archive) = self.archive(repository_url, chart, Some(version)).await?;
        self.extract(archive, |a, limits| a.schema(limits)).await
    }

    async fn notes(&self, repository_url: &str, chart: &str, version: Option<&str>) -> Result<Versioned<String>> {
        let (entry, archive) = self.archive(repository_url, chart, version).await?;
        let notes = self.extract(archive, |a, limits| a.notes(limits)).await?;
        Ok(Versioned {
            version: entry.version,
            content: notes,
        })
    }

    async fn dependencies(
        &self,
        repository_url: &str,
        chart: &str,
        version: Option<&str>,
    ) -> Result<Versioned<Vec<Dependency>>> {
        let (entry, archive) = self.archive(repository_url, chart, version).await?;
        let dependencies = self
            .extract(archive, |a, limits| a.dependencies(limits))
            .await?;
        Ok(Versioned {
            version: entry.version,
            content: dependencies,
        })
    }

    fn stats(&self) -> ServiceStats {
        ServiceStats {
            index: self.resolver.stats(),
            charts: self.artifacts.stats(),
        }
    }
}
