//! MCP Tool Handlers
//!
//! [`ToolDispatcher`] validates a tool call, runs it against a
//! [`ChartService`] and shapes the outcome into a [`ToolResult`]. Domain
//! failures become results flagged `isError` whose text is
//! `{"error": message, "code": code}`; malformed calls are returned as
//! [`Error`]s for the JSON-RPC layer to reject.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use helm_chart::CollapseOptions;
use helm_repo::{ChartService, ChartVersionEntry};
use serde_json::{json, Value};

use crate::requests::{ChartRef, GetValues, GetVersions, SearchCharts, ToolRequest};
use crate::tools::ToolResult;
use crate::{Error, Result};

/// Largest tool payload, in bytes, returned to a client.
pub const RESPONSE_BUDGET_BYTES: usize = 40_000;

/// Runs tool calls against a chart service.
#[derive(Clone)]
pub struct ToolDispatcher {
    service: Arc<dyn ChartService>,
}

impl ToolDispatcher {
    pub fn new(service: Arc<dyn ChartService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<dyn ChartService> {
        &self.service
    }

    /// Handle a tool call.
    ///
    /// Returns `Err` only for protocol-level failures (unknown tool, invalid
    /// arguments). Everything else, including panics inside a handler, is an
    /// `Ok` result flagged as an error.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<ToolResult> {
        let request = ToolRequest::parse(name, arguments)?;
        let started = Instant::now();

        let outcome = AssertUnwindSafe(self.dispatch(&request))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(Error::Domain(helm_repo::Error::Internal(format!(
                    "{} handler panicked",
                    request.tool()
                ))))
            });

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(payload) => {
                tracing::info!(tool = request.tool(), elapsed_ms, "Tool call succeeded");
                Ok(ToolResult::text(payload.to_string()))
            }
            Err(e) if e.is_protocol() => Err(e),
            Err(e) => {
                let code = match &e {
                    Error::Domain(domain) => domain.code(),
                    _ => "internal",
                };
                tracing::warn!(
                    tool = request.tool(),
                    elapsed_ms,
                    code,
                    error = %e,
                    "Tool call failed"
                );
                Ok(ToolResult::error(error_payload(&e, code).to_string()))
            }
        }
    }

    async fn dispatch(&self, request: &ToolRequest) -> Result<Value> {
        match request {
            ToolRequest::SearchCharts(args) => self.search_charts(args).await,
            ToolRequest::GetVersions(args) => self.get_versions(args).await,
            ToolRequest::GetValues(args) => self.get_values(args).await,
            ToolRequest::GetDependencies(chart) => self.get_dependencies(chart).await,
            ToolRequest::GetNotes(chart) => self.get_notes(chart).await,
        }
    }

    async fn search_charts(&self, args: &SearchCharts) -> Result<Value> {
        let mut charts = self.service.list_charts(&args.repository_url).await?;
        if let Some(search) = &args.search {
            let needle = search.to_lowercase();
            charts.retain(|name| name.to_lowercase().contains(&needle));
        }
        let total = charts.len();
        if let Some(limit) = args.limit {
            charts.truncate(limit);
        }
        Ok(json!({ "charts": charts, "total": total }))
    }

    async fn get_versions(&self, args: &GetVersions) -> Result<Value> {
        let versions = self
            .service
            .list_versions(&args.repository_url, &args.chart_name)
            .await?;
        let total = versions.len();
        let limit = args.limit.unwrap_or(total);
        let versions: Vec<Value> = versions.iter().take(limit).map(version_json).collect();
        Ok(json!({ "versions": versions, "total": total }))
    }

    async fn get_values(&self, args: &GetValues) -> Result<Value> {
        let chart = &args.chart;
        let values = self
            .service
            .values(
                &chart.repository_url,
                &chart.chart_name,
                chart.chart_version.as_deref(),
            )
            .await?;

        let schema = if args.include_schema {
            self.schema(chart, &values.version).await
        } else {
            None
        };

        let options = CollapseOptions {
            max_depth: args.depth,
            max_array_items: args.max_array_items,
            show_defaults: args.show_defaults,
            show_comments: args.show_comments,
        };
        let reserved = schema.as_ref().map_or(0, String::len);
        let rendered = values.content.render(
            args.path.as_deref(),
            options,
            reserved,
            RESPONSE_BUDGET_BYTES,
        )?;

        let mut payload = json!({
            "version": values.version,
            "values": rendered.text,
        });
        if let Some(path) = &args.path {
            payload["path"] = json!(path);
        }
        if rendered.collapsed {
            payload["collapsed"] = json!(true);
        }
        if let Some(schema) = schema {
            payload["schema"] = json!(schema);
        }
        Ok(payload)
    }

    /// Schema text for a resolved version; failures only drop the schema.
    async fn schema(&self, chart: &ChartRef, version: &str) -> Option<String> {
        match self
            .service
            .values_schema(&chart.repository_url, &chart.chart_name, version)
            .await
        {
            Ok(schema) => schema,
            Err(e) => {
                tracing::warn!(
                    chart = %chart.chart_name,
                    version,
                    error = %e,
                    "Schema unavailable"
                );
                None
            }
        }
    }

    async fn get_dependencies(&self, chart: &ChartRef) -> Result<Value> {
        let dependencies = self
            .service
            .dependencies(
                &chart.repository_url,
                &chart.chart_name,
                chart.chart_version.as_deref(),
            )
            .await?;
        Ok(json!({
            "version": dependencies.version,
            "dependencies": dependencies.content,
        }))
    }

    async fn get_notes(&self, chart: &ChartRef) -> Result<Value> {
        let notes = self
            .service
            .notes(
                &chart.repository_url,
                &chart.chart_name,
                chart.chart_version.as_deref(),
            )
            .await?;
        if notes.content.len() > RESPONSE_BUDGET_BYTES {
            return Err(helm_chart::Error::OutputTooLarge {
                file: "NOTES.txt".to_string(),
                size: notes.content.len() as u64,
                limit: RESPONSE_BUDGET_BYTES as u64,
            }
            .into());
        }
        Ok(json!({ "version": notes.version, "notes": notes.content }))
    }
}

fn version_json(entry: &ChartVersionEntry) -> Value {
    let mut value = json!({
        "version": entry.version,
        "app_version": entry.app_version.clone().unwrap_or_default(),
        "deprecated": entry.deprecated,
    });
    if let Some(created) = entry.created {
        value["created"] = json!(created.format("%Y-%m-%dT%H:%M:%SZ").to_string());
    }
    if let Some(description) = &entry.description {
        value["description"] = json!(description);
    }
    value
}

fn error_payload(err: &Error, code: &str) -> Value {
    let mut payload = json!({ "error": err.to_string(), "code": code });
    if code == "output_too_large" {
        payload["hint"] = json!("narrow the request with path, depth or max_array_items");
    }
    payload
}
