//! URL validation for repository and chart downloads
//!
//! Every URL the server fetches comes from a caller (repository URLs) or from
//! a remote index (chart URLs), so both are checked before any request is
//! made: scheme, userinfo, host lists, and the addresses the host resolves
//! to.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use url::{Host, Position, Url};

use crate::{Error, Result};

/// Maximum accepted URL length.
pub const MAX_URL_LENGTH: usize = 4096;

const DNS_TIMEOUT: Duration = Duration::from_secs(5);

/// Host policy applied to every fetched URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Permit hosts resolving to private, loopback or link-local addresses
    pub allow_private_ips: bool,
    /// When non-empty, only matching hosts are accepted
    pub allowed_hosts: Vec<String>,
    /// Matching hosts are always rejected
    pub denied_hosts: Vec<String>,
}

/// Whether `raw` names an OCI registry.
pub fn is_oci(raw: &str) -> bool {
    raw.trim().to_ascii_lowercase().starts_with("oci://")
}

/// Validate a repository URL and return its normalised form.
///
/// Query strings and fragments are rejected and a trailing `/` is removed,
/// so `https://charts.example.com/` and `https://charts.example.com` share a
/// cache entry.
pub async fn validate_repository_url(raw: &str, opts: &ValidationOptions) -> Result<String> {
    let url = parse(raw)?;
    if url.fragment().is_some() {
        return Err(Error::invalid_url(url.as_str(), "URL must not contain a fragment"));
    }
    if url.query().is_some() {
        return Err(Error::invalid_url(url.as_str(), "URL must not contain a query"));
    }
    validate_host(&url, opts).await?;

    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Validate an `oci://` registry URL and return its normalised form,
/// `oci://host[:port]/path` without a trailing `/`.
///
/// The host is held to the same policy as HTTP repositories.
pub async fn validate_registry_url(raw: &str, opts: &ValidationOptions) -> Result<String> {
    let raw = raw.trim();
    let rest = match raw.get(..6) {
        Some(scheme) if scheme.eq_ignore_ascii_case("oci://") => &raw[6..],
        _ => return Err(Error::invalid_url(raw, "scheme must be oci")),
    };
    let reword = |err: Error| match err {
        Error::InvalidUrl { reason, .. } => Error::invalid_url(raw, reason),
        other => other,
    };

    let url = parse(&format!("https://{rest}")).map_err(reword)?;
    if url.fragment().is_some() {
        return Err(Error::invalid_url(raw, "URL must not contain a fragment"));
    }
    if url.query().is_some() {
        return Err(Error::invalid_url(raw, "URL must not contain a query"));
    }
    validate_host(&url, opts).await.map_err(reword)?;

    let location = &url[Position::BeforeHost..Position::AfterPath];
    Ok(format!("oci://{}", location.trim_end_matches('/')))
}

/// Validate a chart download URL.
///
/// Query strings are allowed here since some repositories serve signed URLs.
pub async fn validate_chart_url(raw: &str, opts: &ValidationOptions) -> Result<Url> {
    let url = parse(raw)?;
    validate_host(&url, opts).await?;
    Ok(url)
}

fn parse(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::invalid_url(raw, "URL is empty"));
    }
    if raw.len() > MAX_URL_LENGTH {
        let prefix: String = raw.chars().take(100).collect();
        return Err(Error::invalid_url(
            &format!("{prefix}..."),
            "URL exceeds maximum length",
        ));
    }

    let url = Url::parse(raw).map_err(|e| Error::invalid_url(raw, format!("invalid URL format: {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::invalid_url(raw, "scheme must be http or https"));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(Error::invalid_url(raw, "URL must not contain userinfo"));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::invalid_url(raw, "URL must include a host"));
    }
    Ok(url)
}

async fn validate_host(url: &Url, opts: &ValidationOptions) -> Result<()> {
    let reject = |reason: &str| Err(Error::invalid_url(url.as_str(), reason));

    let Some(host) = url.host() else {
        return reject("URL must include a host");
    };
    let name = match &host {
        Host::Domain(domain) => domain.to_ascii_lowercase(),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => ip.to_string(),
    };

    if name == "localhost" || name.ends_with(".local") {
        return reject("localhost and .local hosts are not allowed");
    }
    if matches_host_list(&name, &opts.denied_hosts) {
        return reject("host is in denylist");
    }
    if !opts.allowed_hosts.is_empty() && !matches_host_list(&name, &opts.allowed_hosts) {
        return reject("host is not in allowlist");
    }

    let addrs = match host {
        Host::Ipv4(ip) => vec![IpAddr::V4(ip)],
        Host::Ipv6(ip) => vec![IpAddr::V6(ip)],
        Host::Domain(domain) => {
            let port = url.port_or_known_default().unwrap_or(443);
            let lookup = tokio::net::lookup_host((domain, port));
            match tokio::time::timeout(DNS_TIMEOUT, lookup).await {
                Ok(Ok(addrs)) => addrs.map(|a| a.ip()).collect(),
                Ok(Err(e)) => return reject(&format!("failed to resolve host: {e}")),
                Err(_) => return reject("failed to resolve host: DNS lookup timed out"),
            }
        }
    };

    if addrs.is_empty() {
        return reject("host resolved to no addresses");
    }
    if !opts.allow_private_ips && addrs.iter().any(is_private_ip) {
        return reject("host resolves to a private IP address");
    }
    Ok(())
}

/// Match a host against a list of patterns.
///
/// Patterns are an exact host (which also matches its subdomains), a
/// `.suffix` (the domain itself and any subdomain) or `*`.
pub fn matches_host_list(host: &str, patterns: &[String]) -> bool {
    let host = host.to_ascii_lowercase();
    if host.is_empty() {
        return false;
    }
    patterns.iter().any(|pattern| {
        let pattern = pattern.trim().to_ascii_lowercase();
        match pattern.as_str() {
            "" => false,
            "*" => true,
            p if p.starts_with('.') => host == p[1..] || host.ends_with(p),
            p => host == p || host.ends_with(&format!(".{p}")),
        }
    })
}

/// Whether `ip` is outside the public unicast range.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ip) => is_private_v4(ip),
        IpAddr::V6(ip) => match ip.to_ipv4_mapped() {
            Some(v4) => is_private_v4(&v4),
            None => is_private_v6(ip),
        },
    }
}

fn is_private_v4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_multicast()
        || ip.is_broadcast()
}

fn is_private_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80
}
