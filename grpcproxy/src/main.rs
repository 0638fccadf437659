//! # grpcproxy
//!
//! HTTP+JSON gateway in front of arbitrary gRPC servers. This file drives the process lifecycle:
//!
//! 1. **Initialization**: Sets up logging and parses command-line arguments using [`cli::Cli`].
//! 2. **Serving**: Binds the HTTP listener and hands every request to the [`server`] router.
//! 3. **Shutdown**: Stops accepting connections on Ctrl-C and lets in-flight calls drain.
mod cli;
mod server;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use grpcproxy_core::gateway::Gateway;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Cli::parse();

    let listener = TcpListener::bind((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", args.host, args.port))?;

    let config = args.gateway_config();
    tracing::info!(
        address = %listener.local_addr()?,
        connect_timeout = ?config.connect_timeout,
        call_timeout = ?config.call_timeout,
        "grpcproxy listening"
    );

    axum::serve(listener, server::router(Gateway::new(config)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("grpcproxy stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
