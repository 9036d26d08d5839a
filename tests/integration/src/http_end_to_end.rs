//! End-to-end tests over the Streamable HTTP transport
//!
//! A real `helm-mcp` router is bound to a loopback port and backed by a
//! `HelmClient` talking to a fixture chart repository, so every request
//! crosses both HTTP hops.

use std::sync::Arc;
use std::time::Duration;

use helm_mcp::http::{self, MCP_PATH, SESSION_HEADER};
use helm_mcp::McpServer;
use helm_repo::{ClientOptions, HelmClient};
use helm_test_utils::{ChartBuilder, FixtureRepo, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct Harness {
    repo: FixtureRepo,
    base: String,
    http: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl Harness {
    async fn start() -> Self {
        let repo = FixtureRepo::start().await;
        repo.publish(
            "stable",
            vec![
                ChartBuilder::new("podinfo", "6.0.0")
                    .app_version("6.0.0")
                    .values("# -- Pods to run\nreplicaCount: 1\n")
                    .notes("podinfo 6.0.0\n"),
                ChartBuilder::new("podinfo", "6.1.0")
                    .app_version("6.1.0")
                    .values(
                        "replicaCount: 2\n\
                         image:\n  repository: ghcr.io/stefanprodan/podinfo\n  tag: 6.1.0\n\
                         ingress:\n  enabled: false\n  hosts:\n    - host: a.local\n      paths: [/]\n",
                    )
                    .schema(r#"{"type":"object"}"#)
                    .notes("Visit {{ .Values.ingress.hosts }}\n"),
                ChartBuilder::new("platform", "1.0.0")
                    .values("global: {}\n")
                    .dependency("redis", "^17.0.0", Some("https://charts.bitnami.com/bitnami"))
                    .dependency("podinfo", "6.x", None),
            ],
        );
        repo.publish_oci(
            "helm",
            vec![
                ChartBuilder::new("traefik", "30.0.0").values("# -- Deployment kind\nkind: Deployment\n"),
                ChartBuilder::new("traefik", "30.1.0")
                    .values("kind: DaemonSet\n")
                    .notes("traefik 30.1.0\n"),
            ],
        );

        let options = ClientOptions::new()
            .with_allow_private_ips(true)
            .with_timeout(Duration::from_secs(5))
            .with_max_retries(1)
            .with_oci_plain_http(true);
        let client = HelmClient::new(options).unwrap();
        let server = McpServer::new(Arc::new(client));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(http::serve(listener, server, async move {
            let _ = rx.await;
        }));

        Self {
            repo,
            base,
            http: reqwest::Client::new(),
            shutdown: Some(tx),
            task,
        }
    }

    fn repo_url(&self) -> String {
        self.repo.url("stable")
    }

    async fn post(&self, body: &Value) -> reqwest::Response {
        self.http
            .post(format!("{}{MCP_PATH}", self.base))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    async fn rpc(&self, method: &str, params: Value) -> Value {
        let response = self
            .post(&json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params}))
            .await;
        assert_eq!(response.status(), 200);
        response.json().await.unwrap()
    }

    /// Call a tool and return `(isError, parsed text payload)`.
    async fn call(&self, tool: &str, arguments: Value) -> (bool, Value) {
        let reply = self
            .rpc("tools/call", json!({"name": tool, "arguments": arguments}))
            .await;
        let result = &reply["result"];
        assert!(result.is_object(), "expected a tool result, got {reply}");
        let text = result["content"][0]["text"].as_str().unwrap();
        (
            result["isError"].as_bool().unwrap(),
            serde_json::from_str(text).unwrap(),
        )
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), &mut self.task)
            .await
            .expect("server did not drain")
            .unwrap()
            .unwrap();
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[tokio::test]
async fn session_lifecycle() {
    let harness = Harness::start().await;

    let response = harness
        .post(&json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "e2e", "version": "1.0"}
            }
        }))
        .await;
    assert_eq!(response.status(), 200);
    let session = response
        .headers()
        .get(SESSION_HEADER)
        .expect("initialize assigns a session")
        .to_str()
        .unwrap()
        .to_string();
    let reply: Value = response.json().await.unwrap();
    assert_eq!(reply["result"]["protocolVersion"], "2025-03-26");
    assert_eq!(reply["result"]["serverInfo"]["name"], "helm-mcp");
    assert_eq!(reply["result"]["capabilities"]["tools"]["listChanged"], false);

    let response = harness
        .http
        .post(format!("{}{MCP_PATH}", harness.base))
        .header(SESSION_HEADER, &session)
        .json(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED.as_u16());
    assert_eq!(response.headers()[SESSION_HEADER].to_str().unwrap(), session);

    let tools = harness.rpc("tools/list", json!({})).await;
    let names: Vec<&str> = tools["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "search_charts",
            "get_versions",
            "get_values",
            "get_dependencies",
            "get_notes"
        ]
    );

    let response = harness
        .http
        .delete(format!("{}{MCP_PATH}", harness.base))
        .header(SESSION_HEADER, &session)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT.as_u16());

    harness.stop().await;
}

#[tokio::test]
async fn search_and_versions() {
    let harness = Harness::start().await;
    let url = harness.repo_url();

    let (is_error, payload) = harness
        .call("search_charts", json!({"repository_url": url}))
        .await;
    assert!(!is_error);
    assert_eq!(payload, json!({"charts": ["platform", "podinfo"], "total": 2}));

    let (_, payload) = harness
        .call("search_charts", json!({"repository_url": url, "search": "POD"}))
        .await;
    assert_eq!(payload["charts"], json!(["podinfo"]));

    let (is_error, payload) = harness
        .call(
            "get_versions",
            json!({"repository_url": url, "chart_name": "podinfo", "limit": 1}),
        )
        .await;
    assert!(!is_error);
    assert_eq!(payload["total"], 2);
    assert_eq!(payload["versions"][0]["version"], "6.1.0");
    assert_eq!(payload["versions"][0]["deprecated"], false);

    assert_eq!(harness.repo.hits("stable/index.yaml"), 1);
    harness.stop().await;
}

#[tokio::test]
async fn values_schema_and_subtree() {
    let harness = Harness::start().await;
    let url = harness.repo_url();

    let (is_error, payload) = harness
        .call(
            "get_values",
            json!({
                "repository_url": url,
                "chart_name": "podinfo",
                "path": ".image.repository",
                "include_schema": true
            }),
        )
        .await;
    assert!(!is_error, "{payload}");
    assert_eq!(payload["version"], "6.1.0");
    assert_eq!(payload["path"], ".image.repository");
    assert_eq!(payload["values"], "ghcr.io/stefanprodan/podinfo\n");
    assert_eq!(payload["schema"], r#"{"type":"object"}"#);

    let (_, payload) = harness
        .call(
            "get_values",
            json!({"repository_url": url, "chart_name": "podinfo", "depth": 1}),
        )
        .await;
    assert_eq!(payload["collapsed"], true);
    let text = payload["values"].as_str().unwrap();
    assert!(text.contains("image: object (2 keys)"), "{text}");
    assert!(text.contains("ingress: object (2 keys)"), "{text}");

    let (_, payload) = harness
        .call(
            "get_values",
            json!({"repository_url": url, "chart_name": "podinfo", "chart_version": "6.0.0"}),
        )
        .await;
    assert_eq!(payload["version"], "6.0.0");
    assert_eq!(payload["values"], "replicaCount: 1\n");
    assert!(payload.get("schema").is_none());

    let (_, payload) = harness
        .call(
            "get_values",
            json!({
                "repository_url": url,
                "chart_name": "podinfo",
                "chart_version": "6.0.0",
                "show_comments": true
            }),
        )
        .await;
    assert_eq!(payload["values"], "# Pods to run\nreplicaCount: 1\n");

    assert_eq!(harness.repo.hits("stable/podinfo-6.1.0.tgz"), 1);
    harness.stop().await;
}

#[tokio::test]
async fn dependencies_and_notes() {
    let harness = Harness::start().await;
    let url = harness.repo_url();

    let (is_error, payload) = harness
        .call(
            "get_dependencies",
            json!({"repository_url": url, "chart_name": "platform"}),
        )
        .await;
    assert!(!is_error);
    assert_eq!(
        payload,
        json!({
            "version": "1.0.0",
            "dependencies": [
                {"name": "redis", "version": "^17.0.0", "repository": "https://charts.bitnami.com/bitnami"},
                {"name": "podinfo", "version": "6.x"}
            ]
        })
    );

    let (is_error, payload) = harness
        .call("get_notes", json!({"repository_url": url, "chart_name": "podinfo"}))
        .await;
    assert!(!is_error);
    assert_eq!(payload["notes"], "Visit {{ .Values.ingress.hosts }}\n");

    let (is_error, payload) = harness
        .call("get_notes", json!({"repository_url": url, "chart_name": "platform"}))
        .await;
    assert!(is_error);
    assert_eq!(payload["code"], "file_not_found");

    harness.stop().await;
}

#[tokio::test]
async fn domain_failures_are_tool_errors() {
    let harness = Harness::start().await;
    let url = harness.repo_url();

    let (is_error, payload) = harness
        .call("get_versions", json!({"repository_url": url, "chart_name": "ghost"}))
        .await;
    assert!(is_error);
    assert_eq!(payload["code"], "chart_not_found");

    let (is_error, payload) = harness
        .call(
            "search_charts",
            json!({"repository_url": harness.repo.url("missing")}),
        )
        .await;
    assert!(is_error);
    assert_eq!(payload["code"], "repository_unavailable");

    let (is_error, payload) = harness
        .call(
            "get_values",
            json!({"repository_url": url, "chart_name": "podinfo", "path": ".nope"}),
        )
        .await;
    assert!(is_error);
    assert_eq!(payload["code"], "path_not_found");

    let (is_error, payload) = harness
        .call("search_charts", json!({"repository_url": harness.repo.oci_url("helm")}))
        .await;
    assert!(is_error);
    assert_eq!(payload["code"], "repository_unavailable");

    let (is_error, payload) = harness
        .call("search_charts", json!({"repository_url": "oci://"}))
        .await;
    assert!(is_error);
    assert_eq!(payload["code"], "invalid_url");

    harness.stop().await;
}

#[tokio::test]
async fn oci_charts_are_served_by_name() {
    let harness = Harness::start().await;
    let url = harness.repo.oci_url("helm");

    let (is_error, payload) = harness
        .call("get_versions", json!({"repository_url": url, "chart_name": "traefik"}))
        .await;
    assert!(!is_error, "{payload}");
    assert_eq!(payload["total"], 2);
    assert_eq!(payload["versions"][0]["version"], "30.1.0");

    let (is_error, payload) = harness
        .call(
            "get_values",
            json!({
                "repository_url": url,
                "chart_name": "traefik",
                "chart_version": "30.0.0",
                "show_comments": true,
            }),
        )
        .await;
    assert!(!is_error, "{payload}");
    assert_eq!(payload["values"], "# Deployment kind\nkind: Deployment\n");

    let (is_error, payload) = harness
        .call("get_notes", json!({"repository_url": url, "chart_name": "traefik"}))
        .await;
    assert!(!is_error, "{payload}");
    assert_eq!(payload["notes"], "traefik 30.1.0\n");

    harness.stop().await;
}

#[tokio::test]
async fn transient_repository_failures_are_retried() {
    let harness = Harness::start().await;
    harness
        .repo
        .fail("stable/index.yaml", 1, StatusCode::SERVICE_UNAVAILABLE);

    let (is_error, payload) = harness
        .call("search_charts", json!({"repository_url": harness.repo_url()}))
        .await;
    assert!(!is_error, "{payload}");
    assert_eq!(harness.repo.hits("stable/index.yaml"), 2);

    harness.stop().await;
}

#[tokio::test]
async fn malformed_calls_are_protocol_errors() {
    let harness = Harness::start().await;

    let reply = harness
        .rpc(
            "tools/call",
            json!({"name": "get_values", "arguments": {"repository_url": harness.repo_url()}}),
        )
        .await;
    assert_eq!(reply["error"]["code"], -32602);
    assert!(reply.get("result").is_none());

    let reply = harness
        .rpc("tools/call", json!({"name": "helm_install", "arguments": {}}))
        .await;
    assert_eq!(reply["error"]["code"], -32602);

    let reply = harness.rpc("resources/list", json!({})).await;
    assert_eq!(reply["error"]["code"], -32601);

    let response = harness
        .http
        .post(format!("{}{MCP_PATH}", harness.base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST.as_u16());
    let reply: Value = response.json().await.unwrap();
    assert_eq!(reply["error"]["code"], -32700);
    assert_eq!(reply["id"], Value::Null);

    harness.stop().await;
}

#[tokio::test]
async fn batches_answer_requests_only() {
    let harness = Harness::start().await;
    let response = harness
        .post(&json!([
            {"jsonrpc": "2.0", "id": "a", "method": "ping"},
            {"jsonrpc": "2.0", "method": "notifications/initialized"},
            {"jsonrpc": "2.0", "id": "b", "method": "tools/call",
             "params": {"name": "search_charts", "arguments": {"repository_url": harness.repo_url()}}}
        ]))
        .await;
    assert_eq!(response.status(), 200);
    let replies: Vec<Value> = response.json().await.unwrap();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0]["id"], "a");
    assert_eq!(replies[1]["id"], "b");
    assert_eq!(replies[1]["result"]["isError"], false);

    harness.stop().await;
}

#[tokio::test]
async fn probes_and_unknown_routes() {
    let harness = Harness::start().await;

    let health: Value = harness
        .http
        .get(format!("{}/healthz", harness.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({"status": "ok"}));

    let ready: Value = harness
        .http
        .get(format!("{}/readyz", harness.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ready, json!({"status": "ready"}));

    let response = harness
        .http
        .get(format!("{}{MCP_PATH}", harness.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED.as_u16());

    let response = harness
        .http
        .get(format!("{}/metrics", harness.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND.as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["path"], "/metrics");

    assert_eq!(harness.repo.total_hits(), 0, "probes never touch repositories");
    harness.stop().await;
}
