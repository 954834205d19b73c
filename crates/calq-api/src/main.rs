// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! calqd - the calculation API daemon.
//!
//! Wires the operation store, the work queue producer, and the RPC server
//! together and serves until ctrl-c.

use std::sync::Arc;

use anyhow::Result;
use lapin::{Connection, ConnectionProperties};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use calq_api::config::Config;
use calq_api::{dispatch, CalculationsState};
use calq_core::kv;
use calq_core::store::CalculationStore;
use calq_core::workqueue::{Producer, QueueOptions};
use calq_protocol::messages::RpcRequest;
use calq_protocol::server::RpcServer;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("calq_api=info".parse()?)
                .add_directive("calq_core=info".parse()?)
                .add_directive("calq_protocol=info".parse()?),
        )
        .init();

    info!("Starting calqd");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        listen_addr = %config.listen_addr,
        amqp_addr = %config.amqp_addr,
        queue = %config.queue_name,
        "Configuration loaded"
    );

    // Connect to the operation store
    let store = kv::connect(&config.database_url).await?;
    let datastore = Arc::new(CalculationStore::new(store));
    info!("Operation store connected");

    // Connect to the broker and bring up the publisher
    let conn = Arc::new(Connection::connect(&config.amqp_url(), ConnectionProperties::default()).await?);
    info!(amqp_addr = %config.amqp_addr, "Broker connection established");

    let producer = Arc::new(Producer::new(conn, QueueOptions::new(config.queue_name.as_str())).await);
    info!(queue = %config.queue_name, "Work queue producer ready");

    let state = Arc::new(CalculationsState::new(datastore, producer));

    // Serve the RPC surface
    let server = RpcServer::bind(config.listen_addr).await?;
    let cancel = CancellationToken::new();

    let server_cancel = cancel.clone();
    let server_state = state.clone();
    let server_handle = tokio::spawn(async move {
        let handler = move |request: RpcRequest| {
            let state = server_state.clone();
            async move { dispatch(&state, request).await }
        };
        if let Err(e) = server.run(server_cancel, handler).await {
            error!("RPC server error: {}", e);
        }
    });

    info!(listen_addr = %config.listen_addr, "calqd running");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    cancel.cancel();
    let _ = server_handle.await;

    info!("Shutdown complete");
    Ok(())
}
