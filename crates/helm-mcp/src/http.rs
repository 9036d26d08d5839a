//! Streamable HTTP transport
//!
//! `POST /mcp` carries JSON-RPC messages and answers with a JSON body. The
//! server never opens a server-to-client stream, so `GET /mcp` is refused.
//! `/healthz` and `/readyz` are plain probes for the hosting environment.

use std::any::Any;
use std::future::Future;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::server::{contains_initialize, parse_error, McpServer};

pub const MCP_PATH: &str = "/mcp";
pub const SESSION_HEADER: &str = "mcp-session-id";
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the HTTP application.
pub fn router(server: McpServer) -> Router {
    Router::new()
        .route(
            MCP_PATH,
            post(handle_post).get(handle_get).delete(handle_delete),
        )
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .fallback(not_found)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(server)
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn serve<F>(listener: TcpListener, server: McpServer, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, path = MCP_PATH, "MCP server listening");
    }
    axum::serve(listener, router(server))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn handle_post(State(server): State<McpServer>, headers: HeaderMap, body: Bytes) -> Response {
    let message: Value = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(parse_error(&e))).into_response(),
    };

    let session = if contains_initialize(&message) {
        Some(uuid::Uuid::new_v4().to_string())
    } else {
        headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let mut response = match server.handle_value(message).await {
        Some(reply) => Json(reply).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    };
    if let Some(value) = session.and_then(|s| HeaderValue::from_str(&s).ok()) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

async fn handle_get() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST, DELETE")],
        Json(json!({ "error": "server-initiated streams are not supported" })),
    )
        .into_response()
}

async fn handle_delete(headers: HeaderMap) -> StatusCode {
    if let Some(session) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
        tracing::debug!(session, "Session closed by client");
    }
    StatusCode::NO_CONTENT
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn readyz() -> Json<Value> {
    Json(json!({ "status": "ready" }))
}

async fn not_found(uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "not found", "path": uri.path() })),
    )
        .into_response()
}

fn panic_response(_: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("HTTP handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal server error" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request};
    use helm_repo::{ClientOptions, HelmClient};
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    fn app() -> Router {
        let client = HelmClient::new(ClientOptions::default()).unwrap();
        router(McpServer::new(Arc::new(client)))
    }

    fn post_json(body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(MCP_PATH)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn probes_report_status() {
        for (path, status) in [("/healthz", "ok"), ("/readyz", "ready")] {
            let response = app()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(json_body(response).await, json!({ "status": status }));
        }
    }

    #[tokio::test]
    async fn initialize_issues_session_id() {
        let response = app()
            .oneshot(post_json(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let session = response.headers().get(SESSION_HEADER).unwrap();
        assert_eq!(session.to_str().unwrap().len(), 36);
        assert_eq!(json_body(response).await["result"]["serverInfo"]["name"], "helm-mcp");
    }

    #[tokio::test]
    async fn session_id_is_echoed() {
        let mut request = post_json(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}));
        request
            .headers_mut()
            .insert(SESSION_HEADER, HeaderValue::from_static("abc"));
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.headers().get(SESSION_HEADER).unwrap().to_str().unwrap(), "abc");
    }

    #[tokio::test]
    async fn notifications_are_accepted_without_body() {
        let response = app()
            .oneshot(post_json(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn invalid_json_is_parse_error() {
        let request = Request::post(MCP_PATH)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{oops"))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn get_and_delete_on_mcp() {
        let response = app()
            .oneshot(Request::get(MCP_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let response = app()
            .oneshot(Request::delete(MCP_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn unknown_routes_are_json_404() {
        let response = app()
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["path"], "/nope");
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let padding = "x".repeat(MAX_BODY_BYTES + 1);
        let response = app()
            .oneshot(post_json(json!({"jsonrpc": "2.0", "id": 1, "method": "ping", "pad": padding})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
