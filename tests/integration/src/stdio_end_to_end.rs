//! End-to-end test over the line-delimited stdio transport

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use helm_mcp::{stdio, McpServer};
use helm_repo::{ClientOptions, HelmClient};
use helm_test_utils::{ChartBuilder, FixtureRepo};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn line(message: Value) -> String {
    format!("{message}\n")
}

#[tokio::test]
async fn conversation_over_stdio() {
    let repo = FixtureRepo::start().await;
    repo.publish(
        "charts",
        vec![
            ChartBuilder::new("redis", "17.3.0").values("architecture: replication\n"),
            ChartBuilder::new("redis", "17.10.1").values("architecture: standalone\n"),
        ],
    );
    let options = ClientOptions::new()
        .with_allow_private_ips(true)
        .with_timeout(Duration::from_secs(5));
    let server = McpServer::new(Arc::new(HelmClient::new(options).unwrap()));

    let url = repo.url("charts");
    let input = [
        line(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}})),
        line(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})),
        line(json!({
            "jsonrpc": "2.0", "id": 2, "method": "tools/call",
            "params": {"name": "get_values", "arguments": {"repository_url": url, "chart_name": "redis"}}
        })),
        "not json\n".to_string(),
        line(json!({
            "jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": {"name": "get_versions", "arguments": {"repository_url": url}}
        })),
    ]
    .concat();

    let mut output = Vec::new();
    stdio::serve(server, input.as_bytes(), &mut output)
        .await
        .unwrap();

    let replies: HashMap<String, Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str::<Value>(l).unwrap())
        .map(|reply| (reply["id"].to_string(), reply))
        .collect();
    assert_eq!(replies.len(), 4);

    assert_eq!(replies["1"]["result"]["protocolVersion"], "2025-06-18");

    let text = replies["2"]["result"]["content"][0]["text"].as_str().unwrap();
    let payload: Value = serde_json::from_str(text).unwrap();
    assert_eq!(payload["version"], "17.10.1", "semantic order, not lexical");
    assert_eq!(payload["values"], "architecture: standalone\n");

    assert_eq!(replies["null"]["error"]["code"], -32700);
    assert_eq!(replies["3"]["error"]["code"], -32602);
}
