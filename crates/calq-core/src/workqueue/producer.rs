// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Publishing side of the work queue, with a self-healing channel.
//!
//! A supervisor task owns the publish channel: it opens a channel, declares
//! the queue, installs the channel into a watch slot, and parks until asked
//! to reinitialize. Publishers read the slot without locking; a stale channel
//! merely produces a publish error, which requests another recovery.
//!
//! Re-init requests from N concurrent publishers flow through a single-slot
//! mailbox with drop-on-full semantics; a coalescer task forwards at most one
//! re-init signal per recovery and drops the requests that piled up while the
//! recovery was in flight, so publishers cannot stampede the supervisor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lapin::options::QueueDeclareOptions;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use super::{FibonacciOfJob, QueueOptions};

/// Delay between attempts to open and declare the publish channel.
const CHANNEL_INIT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Errors from publishing a message.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("unable to marshal message to JSON: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("unable to publish message: {0}")]
    Publish(#[source] lapin::Error),

    /// The publish channel is being recovered; retry shortly.
    #[error("publish channel is not available")]
    ChannelUnavailable,
}

/// The queue dependency of the API server.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn publish(&self, job: &FibonacciOfJob) -> Result<(), PublishError>;
}

/// AMQP publisher bound to one queue.
pub struct Producer {
    options: QueueOptions,
    channel_rx: watch::Receiver<Option<Channel>>,
    reinit_request_tx: mpsc::Sender<()>,
}

impl Producer {
    /// Create a producer and wait until its channel is ready for the first
    /// time. Channel setup failures are retried until they succeed.
    pub async fn new(conn: Arc<Connection>, options: QueueOptions) -> Self {
        let (channel_tx, channel_rx) = watch::channel(None);
        // Epoch counter: incremented each time a fresh channel is installed.
        let (epoch_tx, epoch_rx) = watch::channel(0u64);
        let (reinit_request_tx, reinit_request_rx) = mpsc::channel(1);
        let (reinit_tx, reinit_rx) = mpsc::channel(1);

        tokio::spawn(supervise_channel(
            conn,
            options.clone(),
            channel_tx,
            epoch_tx,
            reinit_rx,
        ));
        tokio::spawn(coalesce_reinit_requests(
            reinit_request_rx,
            reinit_tx,
            epoch_rx.clone(),
        ));

        let mut first_ready = epoch_rx;
        let _ = first_ready.wait_for(|epoch| *epoch > 0).await;

        Self {
            options,
            channel_rx,
            reinit_request_tx,
        }
    }

    /// Marshal the message to JSON and publish it to the bound queue.
    ///
    /// Does not wait for channel recovery: a publish that races a recovery
    /// fails and the caller retries at a higher layer.
    pub async fn publish_json<T: Serialize + Sync>(&self, message: &T) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(message)?;

        let channel = match self.channel_rx.borrow().as_ref() {
            Some(channel) => channel.clone(),
            None => {
                self.request_channel_reinitialization();
                return Err(PublishError::ChannelUnavailable);
            }
        };

        let properties = BasicProperties::default().with_content_type("application/json".into());
        if let Err(error) = channel
            .basic_publish(
                "",
                &self.options.name,
                Default::default(),
                &payload,
                properties,
            )
            .await
        {
            self.request_channel_reinitialization();
            return Err(PublishError::Publish(error));
        }

        Ok(())
    }

    fn request_channel_reinitialization(&self) {
        // A full mailbox means a re-init request is already pending.
        let _ = self.reinit_request_tx.try_send(());
    }
}

#[async_trait]
impl JobQueue for Producer {
    async fn publish(&self, job: &FibonacciOfJob) -> Result<(), PublishError> {
        self.publish_json(job).await
    }
}

async fn initialize_channel(
    conn: &Connection,
    options: &QueueOptions,
) -> Result<Channel, lapin::Error> {
    let channel = conn.create_channel().await?;
    channel
        .queue_declare(
            &options.name,
            QueueDeclareOptions {
                durable: options.durable,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    Ok(channel)
}

/// Owns the publish channel: installs a fresh one, then waits for a re-init
/// signal, closes the stale channel, and recovers.
async fn supervise_channel(
    conn: Arc<Connection>,
    options: QueueOptions,
    channel_tx: watch::Sender<Option<Channel>>,
    epoch_tx: watch::Sender<u64>,
    mut reinit_rx: mpsc::Receiver<()>,
) {
    loop {
        let channel = match initialize_channel(&conn, &options).await {
            Ok(channel) => channel,
            Err(error) => {
                warn!(queue = %options.name, error = %error, "error initializing publish channel");
                tokio::time::sleep(CHANNEL_INIT_RETRY_DELAY).await;
                continue;
            }
        };

        channel_tx.send_replace(Some(channel));
        epoch_tx.send_modify(|epoch| *epoch += 1);
        debug!(queue = %options.name, "publish channel ready");

        if reinit_rx.recv().await.is_none() {
            return;
        }

        if let Some(stale) = channel_tx.send_replace(None) {
            let _ = stale.close(200, "channel reinitializing").await;
        }
    }
}

/// Trims concurrent re-init requests down to one in-flight recovery.
async fn coalesce_reinit_requests(
    mut requests: mpsc::Receiver<()>,
    reinit_tx: mpsc::Sender<()>,
    mut epoch: watch::Receiver<u64>,
) {
    loop {
        if requests.recv().await.is_none() {
            return;
        }

        let observed = *epoch.borrow();
        if reinit_tx.send(()).await.is_err() {
            return;
        }
        if epoch.wait_for(|current| *current > observed).await.is_err() {
            return;
        }

        // Requests that arrived while the recovery was in flight are stale.
        while requests.try_recv().is_ok() {}
    }
}
