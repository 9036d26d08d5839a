//! Charts stored in OCI registries
//!
//! A chart pushed with `helm push` is an OCI artifact: its tags are the
//! chart versions, with `+` written as `_`, and its manifest carries one
//! layer holding the packaged chart. Registries are read through the
//! distribution API (`/v2/...`). When a registry answers `401` with a
//! bearer challenge an anonymous token is requested from its realm and
//! reused for later requests to the same repository.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use url::Url;

use crate::fetch::{FetchError, HttpFetcher};
use crate::index::RepositoryIndex;
use crate::options::ClientOptions;
use crate::validation::{validate_chart_url, ValidationOptions};
use crate::{Error, Result};

pub const CHART_LAYER_MEDIA_TYPE: &str = "application/vnd.cncf.helm.chart.content.v1.tar+gzip";
const LEGACY_CHART_LAYER_MEDIA_TYPE: &str = "application/tar+gzip";
const MANIFEST_MEDIA_TYPES: &str =
    "application/vnd.oci.image.manifest.v1+json, application/vnd.docker.distribution.manifest.v2+json";

/// Upper bound for tag lists, manifests and token responses.
const MAX_DOCUMENT_BYTES: u64 = 4 * 1024 * 1024;

/// A chart inside a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OciReference {
    registry: String,
    host: String,
    repository: String,
    chart: String,
}

impl OciReference {
    /// `registry` is a normalised `oci://host[:port][/path]` URL.
    pub fn new(registry: &str, chart: &str) -> Result<Self> {
        let location = registry
            .strip_prefix("oci://")
            .ok_or_else(|| Error::invalid_url(registry, "scheme must be oci"))?;
        let chart = chart.trim();
        if chart.is_empty() || chart.contains(['/', ':', '@']) {
            return Err(Error::invalid_url(
                &format!("{registry}/{chart}"),
                "chart name must be a single path segment",
            ));
        }

        let (host, path) = location.split_once('/').unwrap_or((location, ""));
        let repository = if path.is_empty() {
            chart.to_string()
        } else {
            format!("{path}/{chart}")
        };
        Ok(Self {
            registry: registry.to_string(),
            host: host.to_string(),
            repository,
            chart: chart.to_string(),
        })
    }

    /// The registry URL this chart was looked up in.
    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn chart(&self) -> &str {
        &self.chart
    }

    fn endpoint(&self, scheme: &str, suffix: &str) -> Result<Url> {
        let raw = format!("{scheme}://{}/v2/{}/{suffix}", self.host, self.repository);
        Url::parse(&raw).map_err(|e| Error::invalid_url(&raw, e))
    }

    fn not_found(&self, version: Option<&str>) -> Error {
        Error::ChartNotFound {
            repository: self.registry.clone(),
            chart: self.chart.clone(),
            version: version.map(str::to_string),
        }
    }
}

impl fmt::Display for OciReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "oci://{}/{}", self.host, self.repository)
    }
}

/// The chart version a tag names, if it is a semantic version.
pub fn tag_to_version(tag: &str) -> Option<String> {
    let version = tag.replace('_', "+");
    let bare = version.strip_prefix('v').unwrap_or(&version);
    semver::Version::parse(bare).ok().map(|_| version)
}

pub fn version_to_tag(version: &str) -> String {
    version.replace('+', "_")
}

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct Manifest {
    #[serde(default)]
    layers: Vec<Descriptor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor {
    media_type: String,
    digest: String,
    #[serde(default)]
    size: u64,
}

impl Manifest {
    fn chart_layer(&self) -> Option<&Descriptor> {
        self.layers
            .iter()
            .find(|l| l.media_type == CHART_LAYER_MEDIA_TYPE)
            .or_else(|| {
                self.layers
                    .iter()
                    .find(|l| l.media_type == LEGACY_CHART_LAYER_MEDIA_TYPE)
            })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Parameters of a `WWW-Authenticate: Bearer ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: String,
    pub service: Option<String>,
    pub scope: Option<String>,
}

impl BearerChallenge {
    /// Parse a challenge header; `None` unless it is a bearer challenge with
    /// a realm.
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, params) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        let mut rest = params.trim();
        while !rest.is_empty() {
            let (key, after) = rest.split_once('=')?;
            let after = after.trim_start();
            let (value, remaining) = match after.strip_prefix('"') {
                Some(quoted) => {
                    let end = quoted.find('"')?;
                    (&quoted[..end], &quoted[end + 1..])
                }
                None => after.split_once(',').unwrap_or((after, "")),
            };
            let value = Some(value.trim().to_string());
            match key.trim().to_ascii_lowercase().as_str() {
                "realm" => realm = value,
                "service" => service = value,
                "scope" => scope = value,
                _ => {}
            }
            rest = remaining.trim_start().trim_start_matches(',').trim_start();
        }

        Some(Self {
            realm: realm.filter(|r| !r.is_empty())?,
            service,
            scope,
        })
    }
}

/// Reads chart tags and chart layers from OCI registries.
pub struct OciRegistry {
    fetcher: Arc<HttpFetcher>,
    validation: Arc<ValidationOptions>,
    scheme: &'static str,
    /// Authorization header per repository
    tokens: Mutex<HashMap<String, HeaderValue>>,
}

impl OciRegistry {
    pub fn new(fetcher: Arc<HttpFetcher>, options: &ClientOptions) -> Self {
        Self {
            fetcher,
            validation: Arc::new(options.validation.clone()),
            scheme: if options.oci_plain_http { "http" } else { "https" },
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Versions published under the chart's tags, as a one-chart index.
    ///
    /// Tags that are not semantic versions are ignored; a chart without any
    /// is not found.
    pub async fn versions(&self, reference: &OciReference) -> Result<RepositoryIndex> {
        let url = reference.endpoint(self.scheme, "tags/list")?;
        let body = self
            .get(reference, &url, None, MAX_DOCUMENT_BYTES)
            .await
            .map_err(|e| match e {
                FetchError::NotFound => reference.not_found(None),
                other => Error::repository_unavailable(
                    reference.registry(),
                    format!("failed to list tags of {reference}: {other}"),
                ),
            })?;
        let list: TagList = serde_json::from_slice(&body).map_err(|e| {
            Error::repository_unavailable(reference.registry(), format!("invalid tag list: {e}"))
        })?;

        let versions: Vec<String> = list
            .tags
            .unwrap_or_default()
            .iter()
            .filter_map(|tag| tag_to_version(tag))
            .collect();
        if versions.is_empty() {
            return Err(reference.not_found(None));
        }
        Ok(RepositoryIndex::from_versions(
            reference.registry(),
            reference.chart(),
            versions,
        ))
    }

    /// Download the packaged chart of `version`, checked against the layer
    /// digest.
    pub async fn pull(&self, reference: &OciReference, version: &str, max_bytes: u64) -> Result<Bytes> {
        let unavailable = |message: String| Error::ChartUnavailable {
            chart: reference.chart().to_string(),
            version: version.to_string(),
            message,
        };

        let manifest_url = reference.endpoint(self.scheme, &format!("manifests/{}", version_to_tag(version)))?;
        let body = self
            .get(reference, &manifest_url, Some(MANIFEST_MEDIA_TYPES), MAX_DOCUMENT_BYTES)
            .await
            .map_err(|e| match e {
                FetchError::NotFound => reference.not_found(Some(version)),
                other => unavailable(format!("failed to fetch manifest: {other}")),
            })?;
        let manifest: Manifest =
            serde_json::from_slice(&body).map_err(|e| unavailable(format!("invalid manifest: {e}")))?;

        let layer = manifest
            .chart_layer()
            .ok_or_else(|| unavailable("manifest has no chart layer".to_string()))?;
        if layer.size > max_bytes {
            return Err(unavailable(format!(
                "chart archive too large ({} bytes, limit {max_bytes})",
                layer.size
            )));
        }
        let expected = layer
            .digest
            .strip_prefix("sha256:")
            .ok_or_else(|| unavailable(format!("unsupported layer digest {}", layer.digest)))?;

        let blob_url = reference.endpoint(self.scheme, &format!("blobs/{}", layer.digest))?;
        let bytes = self
            .get(reference, &blob_url, None, max_bytes)
            .await
            .map_err(|e| match e {
                FetchError::TooLarge { size, limit } => {
                    unavailable(format!("chart archive too large ({size} bytes, limit {limit})"))
                }
                other => unavailable(format!("failed to download chart layer: {other}")),
            })?;

        let actual = hex::encode(Sha256::digest(&bytes));
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(unavailable(format!(
                "digest mismatch (expected {expected}, got {actual})"
            )));
        }
        tracing::debug!(reference = %reference, version, bytes = bytes.len(), "Pulled chart layer");
        Ok(bytes)
    }

    /// GET with the repository's token, authorizing once on a challenge.
    async fn get(
        &self,
        reference: &OciReference,
        url: &Url,
        accept: Option<&'static str>,
        max_bytes: u64,
    ) -> std::result::Result<Bytes, FetchError> {
        let key = reference.to_string();
        let mut headers = HeaderMap::new();
        if let Some(accept) = accept {
            headers.insert(ACCEPT, HeaderValue::from_static(accept));
        }
        let cached = self.tokens.lock().get(&key).cloned();
        if let Some(token) = cached {
            headers.insert(AUTHORIZATION, token);
        }

        match self.fetcher.get_with(url, &headers, max_bytes).await {
            Err(FetchError::Unauthorized {
                challenge: Some(challenge),
            }) => {
                let token = self.authorize(reference, &challenge).await?;
                self.tokens.lock().insert(key, token.clone());
                headers.insert(AUTHORIZATION, token);
                self.fetcher.get_with(url, &headers, max_bytes).await
            }
            other => other,
        }
    }

    /// Request an anonymous pull token from the challenge's realm.
    async fn authorize(
        &self,
        reference: &OciReference,
        challenge: &str,
    ) -> std::result::Result<HeaderValue, FetchError> {
        let challenge = BearerChallenge::parse(challenge).ok_or_else(|| {
            FetchError::Permanent(format!("unsupported authentication challenge: {challenge}"))
        })?;
        let mut realm = validate_chart_url(&challenge.realm, &self.validation)
            .await
            .map_err(|e| FetchError::Permanent(format!("token realm rejected: {e}")))?;

        let scope = challenge
            .scope
            .unwrap_or_else(|| format!("repository:{}:pull", reference.repository));
        {
            let mut query = realm.query_pairs_mut();
            if let Some(service) = &challenge.service {
                query.append_pair("service", service);
            }
            query.append_pair("scope", &scope);
        }

        let body = self.fetcher.get(&realm, MAX_DOCUMENT_BYTES).await?;
        let response: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| FetchError::Permanent(format!("invalid token response: {e}")))?;
        let token = response
            .token
            .or(response.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FetchError::Permanent("token response carries no token".to_string()))?;
        tracing::debug!(reference = %reference, "Obtained registry token");
        HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| FetchError::Permanent("token is not a valid header value".to_string()))
    }
}
