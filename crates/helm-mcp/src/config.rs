//! Command-line and environment configuration
//!
//! Every flag can also be set through an `MCP_HELM_*` environment variable;
//! an explicit flag wins.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use helm_repo::ClientOptions;

use crate::{Error, Result};

/// MCP server for browsing Helm chart repositories
#[derive(Parser, Debug, Clone)]
#[command(name = "helm-mcp")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Transport to serve the MCP protocol on
    #[arg(long, env = "MCP_HELM_TRANSPORT", value_enum, default_value_t = Transport::Http)]
    pub transport: Transport,

    /// Address for the HTTP transport
    #[arg(long, env = "MCP_HELM_LISTEN", default_value = "0.0.0.0:8012")]
    pub listen: SocketAddr,

    /// Timeout for a single repository request (e.g. 30s, 2m)
    #[arg(long, env = "MCP_HELM_HELM_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    pub helm_timeout: Duration,

    /// Extra attempts after a transient network failure
    #[arg(long, env = "MCP_HELM_MAX_RETRIES", default_value_t = 2)]
    pub max_retries: u32,

    /// How long a repository index stays cached
    #[arg(long, env = "MCP_HELM_INDEX_TTL", default_value = "5m", value_parser = parse_duration)]
    pub index_ttl: Duration,

    /// Number of repository indexes to cache
    #[arg(long, env = "MCP_HELM_INDEX_CACHE_SIZE", default_value_t = 100)]
    pub index_cache_size: usize,

    /// Number of chart archives to cache
    #[arg(long, env = "MCP_HELM_CACHE_SIZE", default_value_t = 50)]
    pub cache_size: usize,

    /// How long a chart archive stays cached
    #[arg(long, env = "MCP_HELM_CHART_TTL", default_value = "1h", value_parser = parse_duration)]
    pub chart_ttl: Duration,

    /// Largest chart archive to download (e.g. 50MiB)
    #[arg(long, env = "MCP_HELM_MAX_CHART_SIZE", default_value = "50MiB", value_parser = parse_size)]
    pub max_chart_size: u64,

    /// Largest single file to extract from a chart (e.g. 2MiB)
    #[arg(long, env = "MCP_HELM_MAX_OUTPUT_SIZE", default_value = "2MiB", value_parser = parse_size)]
    pub max_output_size: u64,

    /// Allow repositories that resolve to private or loopback addresses
    #[arg(long, env = "MCP_HELM_ALLOW_PRIVATE_IPS")]
    pub allow_private_ips: bool,

    /// Only allow these repository hosts (comma separated)
    #[arg(long, env = "MCP_HELM_ALLOWED_HOSTS", value_delimiter = ',')]
    pub allowed_hosts: Vec<String>,

    /// Never allow these repository hosts (comma separated)
    #[arg(long, env = "MCP_HELM_DENIED_HOSTS", value_delimiter = ',')]
    pub denied_hosts: Vec<String>,

    /// Reach OCI registries over plain HTTP instead of HTTPS
    #[arg(long, env = "MCP_HELM_OCI_PLAIN_HTTP")]
    pub oci_plain_http: bool,

    #[arg(long, env = "MCP_HELM_LOG_LEVEL", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    #[arg(long, env = "MCP_HELM_LOG_FORMAT", value_enum, default_value_t = LogFormat::Console)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// Streamable HTTP on `--listen`
    Http,
    /// Line-delimited JSON-RPC on stdin/stdout
    Stdio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Console,
    /// One JSON object per event
    Json,
}

impl Config {
    /// Check values clap cannot, reporting every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        let durations = [
            ("--helm-timeout", self.helm_timeout),
            ("--index-ttl", self.index_ttl),
            ("--chart-ttl", self.chart_ttl),
        ];
        for (flag, value) in durations {
            if value.is_zero() {
                problems.push(format!("{flag} must be positive"));
            }
        }
        let sizes = [
            ("--index-cache-size", self.index_cache_size as u64),
            ("--cache-size", self.cache_size as u64),
            ("--max-chart-size", self.max_chart_size),
            ("--max-output-size", self.max_output_size),
        ];
        for (flag, value) in sizes {
            if value == 0 {
                problems.push(format!("{flag} must be positive"));
            }
        }
        for host in self.allowed_hosts.iter().chain(&self.denied_hosts) {
            if host.trim().contains(['/', ':', ' ']) {
                problems.push(format!("invalid host pattern {host:?}"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(problems.join("; ")))
        }
    }

    /// Options for the repository client.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions::new()
            .with_timeout(self.helm_timeout)
            .with_max_retries(self.max_retries)
            .with_index_ttl(self.index_ttl)
            .with_index_cache_size(self.index_cache_size)
            .with_chart_ttl(self.chart_ttl)
            .with_chart_cache_size(self.cache_size)
            .with_max_chart_bytes(self.max_chart_size)
            .with_max_output_bytes(self.max_output_size)
            .with_allow_private_ips(self.allow_private_ips)
            .with_allowed_hosts(host_list(&self.allowed_hosts))
            .with_denied_hosts(host_list(&self.denied_hosts))
            .with_oci_plain_http(self.oci_plain_http)
    }

    /// Default `EnvFilter` directives when `RUST_LOG` is unset.
    pub fn log_directives(&self) -> String {
        let level = self.log_level.as_str();
        ["helm_mcp", "helm_repo", "helm_chart", "tower_http"]
            .map(|target| format!("{target}={level}"))
            .join(",")
    }
}

fn host_list(hosts: &[String]) -> Vec<String> {
    hosts
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .collect()
}

/// Parse a human-readable duration such as `500ms`, `30s` or `1h`.
pub fn parse_duration(raw: &str) -> std::result::Result<Duration, String> {
    humantime::parse_duration(raw.trim()).map_err(|e| format!("invalid duration {raw:?}: {e}"))
}

/// Parse a byte size such as `1048576`, `512KiB`, `50MiB` or `2MB`.
pub fn parse_size(raw: &str) -> std::result::Result<u64, String> {
    let text = raw.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let number: u64 = number
        .parse()
        .map_err(|_| format!("invalid size {raw:?}: expected a number with an optional unit"))?;

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kib" => 1 << 10,
        "m" | "mib" => 1 << 20,
        "g" | "gib" => 1 << 30,
        "kb" => 1_000,
        "mb" => 1_000_000,
        "gb" => 1_000_000_000,
        other => return Err(format!("invalid size {raw:?}: unknown unit {other:?}")),
    };
    number
        .checked_mul(multiplier)
        .ok_or_else(|| format!("invalid size {raw:?}: too large"))
}
