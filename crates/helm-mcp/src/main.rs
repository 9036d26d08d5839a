//! Helm chart repository MCP server
//!
//! # Usage
//!
//! ```bash
//! helm-mcp [--transport http|stdio] [--listen 0.0.0.0:8012]
//! ```
//!
//! Every flag has an `MCP_HELM_*` environment equivalent; see `--help`.
//! `RUST_LOG` overrides `--log-level` when set.
//!
//! Logs always go to stderr so stdout stays free for the stdio transport.

use std::sync::Arc;

use clap::Parser;
use helm_mcp::config::{LogFormat, Transport};
use helm_mcp::{http, stdio, Config, McpServer};
use helm_repo::HelmClient;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    config.validate()?;
    init_tracing(&config)?;

    tracing::info!(
        transport = ?config.transport,
        timeout = %humantime::format_duration(config.helm_timeout),
        max_retries = config.max_retries,
        allow_private_ips = config.allow_private_ips,
        "Starting helm-mcp"
    );

    let client = HelmClient::new(config.client_options())?;
    let server = McpServer::new(Arc::new(client));

    match config.transport {
        Transport::Stdio => stdio::run(server).await?,
        Transport::Http => {
            let listener = tokio::net::TcpListener::bind(config.listen).await?;
            http::serve(listener, server, shutdown_signal()).await?;
        }
    }

    tracing::info!("helm-mcp stopped");
    Ok(())
}

fn init_tracing(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives)?,
        _ => EnvFilter::try_new(config.log_directives())?,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.log_format {
        LogFormat::Console => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, draining connections");
}
