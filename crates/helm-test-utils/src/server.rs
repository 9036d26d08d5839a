//! [`FixtureRepo`], a local HTTP chart repository for tests.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::json;
use tokio::task::JoinHandle;

use crate::chart::{sha256_hex, ChartBuilder};
use crate::index::{IndexBuilder, IndexEntry};

#[derive(Default)]
struct FixtureState {
    files: Mutex<HashMap<String, Bytes>>,
    /// Remaining forced failures per path.
    failures: Mutex<HashMap<String, (usize, StatusCode)>>,
    hits: Mutex<HashMap<String, usize>>,
    delay: Mutex<Duration>,
    /// Registry token and the challenge sent without it.
    token: Mutex<Option<(String, String)>>,
}

/// Path of the registry token endpoint.
const TOKEN_PATH: &str = "token";

/// A chart repository served from memory on `127.0.0.1`.
///
/// Every request is counted per path so tests can assert how many outbound
/// fetches a client made. The server stops when the value is dropped.
///
/// # Example
///
/// ```rust,no_run
/// # async fn demo() {
/// use helm_test_utils::{ChartBuilder, FixtureRepo};
///
/// let repo = FixtureRepo::start().await;
/// repo.publish("stable", vec![ChartBuilder::new("alertmanager", "1.0.0")]);
/// let url = repo.url("stable");
/// assert_eq!(repo.hits("stable/index.yaml"), 0);
/// # }
/// ```
pub struct FixtureRepo {
    addr: SocketAddr,
    state: Arc<FixtureState>,
    handle: JoinHandle<()>,
}

impl FixtureRepo {
    pub async fn start() -> Self {
        let state = Arc::new(FixtureState::default());
        let router = Router::new().fallback(serve).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    /// Base URL of a repository served under `path`.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_matches('/');
        if path.is_empty() {
            format!("http://{}", self.addr)
        } else {
            format!("http://{}/{path}", self.addr)
        }
    }

    /// `oci://` URL of a registry repository served under `path`.
    pub fn oci_url(&self, path: &str) -> String {
        format!("oci://{}/{}", self.addr, path.trim_matches('/'))
    }

    /// Serve `body` at `path`.
    pub fn serve(&self, path: &str, body: impl Into<Bytes>) {
        self.state
            .files
            .lock()
            .insert(normalize(path), body.into());
    }

    /// Publish charts under `repo` with a generated `index.yaml`.
    ///
    /// Index entries follow the order given, carry a digest and use relative
    /// URLs.
    pub fn publish(&self, repo: &str, charts: Vec<ChartBuilder>) {
        let mut index = IndexBuilder::new();
        for chart in charts {
            let bytes = chart.build();
            index.push(IndexEntry::new(chart.name(), chart.version()).digest(&sha256_hex(&bytes)));
            self.serve(&format!("{repo}/{}", chart.file_name()), bytes);
        }
        self.serve(&format!("{repo}/index.yaml"), index.to_yaml());
    }

    /// Publish charts as OCI artifacts under `repo`, reachable at
    /// [`oci_url`](Self::oci_url).
    ///
    /// Versions are tagged the way `helm push` tags them, with `+` written
    /// as `_`.
    pub fn publish_oci(&self, repo: &str, charts: Vec<ChartBuilder>) {
        let mut tags: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for chart in charts {
            let base = format!("v2/{repo}/{}", chart.name());
            let bytes = chart.build();
            let digest = format!("sha256:{}", sha256_hex(&bytes));
            let tag = chart.version().replace('+', "_");
            let manifest = json!({
                "schemaVersion": 2,
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "config": {
                    "mediaType": "application/vnd.cncf.helm.config.v1+json",
                    "digest": format!("sha256:{}", sha256_hex(b"{}")),
                    "size": 2,
                },
                "layers": [{
                    "mediaType": "application/vnd.cncf.helm.chart.content.v1.tar+gzip",
                    "digest": digest,
                    "size": bytes.len(),
                }],
            });
            self.serve(&format!("{base}/manifests/{tag}"), manifest.to_string());
            self.serve(&format!("{base}/blobs/{digest}"), bytes);
            tags.entry(chart.name().to_string()).or_default().push(tag);
        }
        for (chart, tags) in tags {
            let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
            self.publish_oci_tags(repo, &chart, &tags);
        }
    }

    /// Replace the tag list of `chart` under `repo`.
    pub fn publish_oci_tags(&self, repo: &str, chart: &str, tags: &[&str]) {
        let list = json!({ "name": format!("{repo}/{chart}"), "tags": tags });
        self.serve(&format!("v2/{repo}/{chart}/tags/list"), list.to_string());
    }

    /// Require a bearer token for every registry request.
    ///
    /// Requests without it get a `401` challenge pointing at the token
    /// endpoint, which hands out `token` to anyone.
    pub fn require_token(&self, token: &str) {
        let challenge = format!(
            r#"Bearer realm="http://{}/{TOKEN_PATH}",service="fixture""#,
            self.addr
        );
        *self.state.token.lock() = Some((token.to_string(), challenge));
    }

    /// Publish a hand-built index under `repo`.
    pub fn publish_index(&self, repo: &str, index: &IndexBuilder) {
        self.serve(&format!("{repo}/index.yaml"), index.to_yaml());
    }

    /// Answer the next `times` requests for `path` with `status`.
    pub fn fail(&self, path: &str, times: usize, status: StatusCode) {
        self.state
            .failures
            .lock()
            .insert(normalize(path), (times, status));
    }

    /// Delay every response.
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock() = delay;
    }

    /// Requests received for `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.state
            .hits
            .lock()
            .get(&normalize(path))
            .copied()
            .unwrap_or(0)
    }

    /// Requests received for any path.
    pub fn total_hits(&self) -> usize {
        self.state.hits.lock().values().sum()
    }
}

impl Drop for FixtureRepo {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn normalize(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

async fn serve(State(state): State<Arc<FixtureState>>, uri: Uri, headers: HeaderMap) -> Response {
    let path = normalize(uri.path());
    *state.hits.lock().entry(path.clone()).or_default() += 1;

    let delay = *state.delay.lock();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let forced = {
        let mut failures = state.failures.lock();
        match failures.get_mut(&path) {
            Some((remaining, status)) if *remaining > 0 => {
                *remaining -= 1;
                Some(*status)
            }
            _ => None,
        }
    };
    if let Some(status) = forced {
        return status.into_response();
    }

    let token = state.token.lock().clone();
    if let Some((token, challenge)) = token {
        if path == TOKEN_PATH {
            return Response::new(Body::from(json!({ "token": token }).to_string()));
        }
        let presented = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        if path.starts_with("v2/") && presented != Some(format!("Bearer {token}").as_str()) {
            return (StatusCode::UNAUTHORIZED, [(WWW_AUTHENTICATE, challenge)]).into_response();
        }
    }

    let body = state.files.lock().get(&path).cloned();
    match body {
        Some(bytes) => Response::new(Body::from(bytes)),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
