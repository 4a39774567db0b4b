//! Fund dashboard service: entry point.
//!
//! Keeps a view of a crowdfunding contract (the active account's balance,
//! the owner and the aggregate funding statistics) in sync over Ethereum
//! JSON-RPC, drives fund and withdraw transactions to a terminal outcome
//! and exposes both through a small Axum REST API.

mod aggregator;
mod amount;
mod api;
mod config;
mod contract;
mod dashboard;
mod errors;
mod lifecycle;
mod notify;
mod ports;
mod prober;
mod rpc;
mod view;

#[cfg(test)]
mod testutil;

use std::sync::Arc;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use dashboard::{Dashboard, DashboardSettings};
use notify::Toasts;
use ports::Ports;
use rpc::RpcClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let rpc = Arc::new(RpcClient::new(
        client,
        config.rpc_url.clone(),
        config.chain_id,
        config.receipt_poll_interval,
        config.rate_limit_retries,
    ));

    // A mismatch is not fatal: every read and write is rejected locally
    // until the node is pointed at the right chain.
    match rpc.chain_id().await {
        Ok(id) if id == config.chain_id => info!("Connected to chain {id} at {}", config.rpc_url),
        Ok(id) => warn!(
            "RPC at {} serves chain {id}, expected {}",
            config.rpc_url, config.chain_id
        ),
        Err(e) => warn!("Could not query chain id from {}: {e}", config.rpc_url),
    }

    let shutdown = CancellationToken::new();
    let toasts = Arc::new(Toasts::new());

    // ─── Dashboard core ───────────────────────────────────
    let dashboard = Arc::new(Dashboard::new(
        Ports::from_backend(rpc),
        DashboardSettings::from_config(&config),
        toasts.clone(),
        shutdown.clone(),
    ));
    info!("Tracking contract {}", config.contract_address);

    tokio::spawn({
        let dashboard = Arc::clone(&dashboard);
        let account = config.default_account;
        async move { dashboard.set_account(account).await }
    });

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState { dashboard, toasts });

    let app = api::router(api_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {e}");
            }
            info!("Shutting down; abandoning pending confirmations");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
