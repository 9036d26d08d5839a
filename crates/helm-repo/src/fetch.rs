//! HTTP fetching with bounded retries and bounded bodies

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use backoff::ExponentialBackoffBuilder;
use bytes::{Bytes, BytesMut};
use reqwest::header::{HeaderMap, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use url::Url;

use crate::options::ClientOptions;
use crate::{Error, Result};

const RETRY_INITIAL_INTERVAL: Duration = Duration::from_millis(200);
const RETRY_MAX_INTERVAL: Duration = Duration::from_secs(2);

/// Why a single download failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Timeouts, connection failures, HTTP 5xx and 429
    #[error("{0}")]
    Transient(String),

    #[error("{0}")]
    Permanent(String),

    #[error("HTTP 404 Not Found")]
    NotFound,

    /// HTTP 401 with the server's `WWW-Authenticate` challenge, if any
    #[error("HTTP 401 Unauthorized")]
    Unauthorized { challenge: Option<String> },

    #[error("response too large ({size} bytes, limit {limit})")]
    TooLarge { size: u64, limit: u64 },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }

    fn from_status(status: StatusCode) -> Self {
        let message = format!("HTTP {status}");
        if status == StatusCode::NOT_FOUND {
            FetchError::NotFound
        } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            FetchError::Transient(message)
        } else {
            FetchError::Permanent(message)
        }
    }

    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            FetchError::Transient(format!(
                "request timed out after {}",
                humantime::format_duration(timeout)
            ))
        } else if err.is_connect() {
            FetchError::Transient(format!("connection failed: {}", root_cause(&err)))
        } else if err.is_body() || err.is_request() {
            FetchError::Transient(root_cause(&err))
        } else {
            FetchError::Permanent(root_cause(&err))
        }
    }
}

fn root_cause(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message = format!("{message}: {cause}");
        source = cause.source();
    }
    message
}

/// Shared HTTP client for index and chart downloads.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new(options: &ClientOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent.clone())
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            timeout: options.timeout,
            max_retries: options.max_retries,
        })
    }

    /// GET `url`, retrying transient failures with exponential backoff.
    ///
    /// At most `max_retries` extra attempts are made. Bodies larger than
    /// `max_bytes` are rejected without being buffered.
    pub async fn get(&self, url: &Url, max_bytes: u64) -> std::result::Result<Bytes, FetchError> {
        self.get_with(url, &HeaderMap::new(), max_bytes).await
    }

    /// [`get`](Self::get) with extra request headers.
    pub async fn get_with(
        &self,
        url: &Url,
        headers: &HeaderMap,
        max_bytes: u64,
    ) -> std::result::Result<Bytes, FetchError> {
        let started = Instant::now();
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(RETRY_INITIAL_INTERVAL)
            .with_max_interval(RETRY_MAX_INTERVAL)
            .with_max_elapsed_time(None)
            .build();

        let result = backoff::future::retry(policy, || async move {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            match self.get_once(url, headers, max_bytes).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.is_transient() && attempt <= self.max_retries => {
                    tracing::warn!(url = %url, attempt, error = %e, "Fetch failed, retrying");
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(bytes) => {
                tracing::debug!(url = %url, bytes = bytes.len(), elapsed_ms, "Fetched")
            }
            Err(e) => tracing::warn!(url = %url, elapsed_ms, error = %e, "Fetch failed"),
        }
        result
    }

    async fn get_once(
        &self,
        url: &Url,
        headers: &HeaderMap,
        max_bytes: u64,
    ) -> std::result::Result<Bytes, FetchError> {
        let mut response = self
            .client
            .get(url.clone())
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let challenge = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Err(FetchError::Unauthorized { challenge });
        }
        if !status.is_success() {
            return Err(FetchError::from_status(status));
        }

        if let Some(length) = response.content_length() {
            if length > max_bytes {
                return Err(FetchError::TooLarge {
                    size: length,
                    limit: max_bytes,
                });
            }
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))?
        {
            let size = (body.len() + chunk.len()) as u64;
            if size > max_bytes {
                return Err(FetchError::TooLarge {
                    size,
                    limit: max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(StatusCode::INTERNAL_SERVER_ERROR, true)]
    #[case(StatusCode::BAD_GATEWAY, true)]
    #[case(StatusCode::TOO_MANY_REQUESTS, true)]
    #[case(StatusCode::NOT_FOUND, false)]
    #[case(StatusCode::FORBIDDEN, false)]
    fn status_classification(#[case] status: StatusCode, #[case] transient: bool) {
        assert_eq!(FetchError::from_status(status).is_transient(), transient);
    }

    #[test]
    fn not_found_is_its_own_kind() {
        let err = FetchError::from_status(StatusCode::NOT_FOUND);
        assert_eq!(err, FetchError::NotFound);
        assert_eq!(err.to_string(), "HTTP 404 Not Found");
    }
}
