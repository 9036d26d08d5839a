//! Client configuration

use std::time::Duration;

use crate::validation::ValidationOptions;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_INDEX_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_INDEX_CACHE_SIZE: usize = 100;
pub const DEFAULT_CHART_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_CHART_CACHE_SIZE: usize = 50;
pub const DEFAULT_MAX_CHART_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_MAX_OUTPUT_BYTES: u64 = 2 * 1024 * 1024;
pub const DEFAULT_MAX_INDEX_BYTES: u64 = 64 * 1024 * 1024;

/// Options for [`HelmClient`](crate::HelmClient).
///
/// Setters ignore zero durations and sizes, keeping the default instead.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Timeout for a single HTTP request
    pub timeout: Duration,
    /// Extra attempts after a transient failure
    pub max_retries: u32,
    pub index_ttl: Duration,
    pub index_cache_size: usize,
    pub chart_ttl: Duration,
    pub chart_cache_size: usize,
    /// Upper bound for a compressed chart archive
    pub max_chart_bytes: u64,
    /// Upper bound for a single file extracted from a chart
    pub max_output_bytes: u64,
    /// Upper bound for a repository index document
    pub max_index_bytes: u64,
    pub validation: ValidationOptions,
    /// Talk to OCI registries over plain HTTP
    pub oci_plain_http: bool,
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            index_ttl: DEFAULT_INDEX_TTL,
            index_cache_size: DEFAULT_INDEX_CACHE_SIZE,
            chart_ttl: DEFAULT_CHART_TTL,
            chart_cache_size: DEFAULT_CHART_CACHE_SIZE,
            max_chart_bytes: DEFAULT_MAX_CHART_BYTES,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            max_index_bytes: DEFAULT_MAX_INDEX_BYTES,
            validation: ValidationOptions::default(),
            oci_plain_http: false,
            user_agent: format!("helm-mcp/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_index_ttl(mut self, ttl: Duration) -> Self {
        if !ttl.is_zero() {
            self.index_ttl = ttl;
        }
        self
    }

    pub fn with_index_cache_size(mut self, size: usize) -> Self {
        if size > 0 {
            self.index_cache_size = size;
        }
        self
    }

    pub fn with_chart_ttl(mut self, ttl: Duration) -> Self {
        if !ttl.is_zero() {
            self.chart_ttl = ttl;
        }
        self
    }

    pub fn with_chart_cache_size(mut self, size: usize) -> Self {
        if size > 0 {
            self.chart_cache_size = size;
        }
        self
    }

    pub fn with_max_chart_bytes(mut self, bytes: u64) -> Self {
        if bytes > 0 {
            self.max_chart_bytes = bytes;
        }
        self
    }

    pub fn with_max_output_bytes(mut self, bytes: u64) -> Self {
        if bytes > 0 {
            self.max_output_bytes = bytes;
        }
        self
    }

    pub fn with_allow_private_ips(mut self, allow: bool) -> Self {
        self.validation.allow_private_ips = allow;
        self
    }

    pub fn with_allowed_hosts(mut self, hosts: Vec<String>) -> Self {
        self.validation.allowed_hosts = hosts;
        self
    }

    pub fn with_denied_hosts(mut self, hosts: Vec<String>) -> Self {
        self.validation.denied_hosts = hosts;
        self
    }

    pub fn with_oci_plain_http(mut self, plain_http: bool) -> Self {
        self.oci_plain_http = plain_http;
        self
    }
}
