// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! calqw - the calculation worker daemon.
//!
//! Consumes calculation jobs from the work queue and persists their
//! outcomes. The consumer is supervised: when it terminates because the
//! broker closed the delivery stream or an acknowledgement failed, it is
//! restarted with a fresh channel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use lapin::{Connection, ConnectionProperties};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use calq_core::kv;
use calq_core::store::CalculationStore;
use calq_core::workqueue::{ConsumeError, Consumer, QueueOptions};
use calq_worker::config::Config;
use calq_worker::FibOfHandler;

/// Delay before restarting the consumer after a terminal error.
const CONSUMER_RESTART_DELAY: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("calq_worker=info".parse()?)
                .add_directive("calq_core=info".parse()?),
        )
        .init();

    info!("Starting calqw");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        amqp_addr = %config.amqp_addr,
        queue = %config.queue_name,
        "Configuration loaded"
    );

    // Connect to the operation store
    let store = kv::connect(&config.database_url).await?;
    let datastore = Arc::new(CalculationStore::new(store));
    info!("Operation store connected");

    // Connect to the broker
    let conn = Arc::new(Connection::connect(&config.amqp_url(), ConnectionProperties::default()).await?);
    info!(amqp_addr = %config.amqp_addr, "Broker connection established");

    let handler = Arc::new(FibOfHandler::new(datastore));
    let consumer = Consumer::new(conn, QueueOptions::new(config.queue_name.as_str()), handler);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    info!("calqw running");

    while !cancel.is_cancelled() {
        match consumer.run(cancel.clone()).await {
            Err(ConsumeError::Cancelled) => break,
            Err(error) => {
                error!(error = %error, "consumer stopped; restarting with a fresh channel");
                tokio::time::sleep(CONSUMER_RESTART_DELAY).await;
            }
            Ok(()) => break,
        }
    }

    info!("Shutdown complete");
    Ok(())
}
