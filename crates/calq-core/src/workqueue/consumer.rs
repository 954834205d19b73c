// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Consuming side of the work queue.
//!
//! One consumer owns one receive channel and one delivery stream and
//! processes deliveries strictly in order, one at a time. Parallelism comes
//! from running multiple consumer instances; the broker distributes
//! round-robin across them.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicRejectOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::Connection;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::errors::{AckOperation, AcknowledgementError};
use super::QueueOptions;

/// A job handler invoked once per delivery.
///
/// Returning `Ok` acknowledges the delivery; returning an error rejects it
/// with requeue so the broker redelivers it.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, cancel: &CancellationToken, payload: &[u8]) -> anyhow::Result<()>;
}

/// Terminal consumer failures. Any of these means the channel state is
/// unknown or unusable; the supervisor restarts the consumer with a fresh
/// channel.
#[derive(Debug, Error)]
pub enum ConsumeError {
    #[error("error opening channel: {0}")]
    Channel(#[source] lapin::Error),

    #[error("error declaring queue: {0}")]
    QueueDeclare(#[source] lapin::Error),

    #[error("error establishing message delivery stream: {0}")]
    Consume(#[source] lapin::Error),

    #[error("error receiving delivery: {0}")]
    Delivery(#[source] lapin::Error),

    /// The broker closed the delivery stream.
    #[error("channel was closed")]
    ChannelClosed,

    /// The consumer was asked to stop. The in-flight delivery, if any, is
    /// not acknowledged and will be redelivered.
    #[error("consumer cancelled")]
    Cancelled,

    #[error(transparent)]
    Acknowledgement(#[from] AcknowledgementError),
}

/// AMQP consumer dispatching deliveries to a [`JobHandler`].
pub struct Consumer {
    conn: Arc<Connection>,
    options: QueueOptions,
    handler: Arc<dyn JobHandler>,
}

impl Consumer {
    pub fn new(conn: Arc<Connection>, options: QueueOptions, handler: Arc<dyn JobHandler>) -> Self {
        Self {
            conn,
            options,
            handler,
        }
    }

    /// Consume deliveries until cancellation or a terminal failure.
    ///
    /// Each call opens a fresh channel and delivery stream, so the function
    /// can simply be called again after an error return.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ConsumeError> {
        let channel = self
            .conn
            .create_channel()
            .await
            .map_err(ConsumeError::Channel)?;

        let queue = channel
            .queue_declare(
                &self.options.name,
                QueueDeclareOptions {
                    durable: self.options.durable,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(ConsumeError::QueueDeclare)?;

        let mut deliveries = channel
            .basic_consume(
                queue.name().as_str(),
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(ConsumeError::Consume)?;

        debug!(queue = %self.options.name, "consuming deliveries");

        loop {
            let delivery = tokio::select! {
                _ = cancel.cancelled() => return Err(ConsumeError::Cancelled),
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(error)) => return Err(ConsumeError::Delivery(error)),
                    None => return Err(ConsumeError::ChannelClosed),
                },
            };

            let outcome = self.handler.handle(&cancel, &delivery.data).await;
            finalize(&delivery.acker, outcome).await?;
        }
    }
}

/// Broker-side finalization of one delivery.
#[async_trait]
trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<(), lapin::Error>;
    async fn reject_requeue(&self) -> Result<(), lapin::Error>;
}

#[async_trait]
impl Acknowledger for Acker {
    async fn ack(&self) -> Result<(), lapin::Error> {
        Acker::ack(self, BasicAckOptions { multiple: false }).await
    }

    async fn reject_requeue(&self) -> Result<(), lapin::Error> {
        Acker::reject(self, BasicRejectOptions { requeue: true }).await
    }
}

/// Apply the per-message acknowledgement policy: success acks, failure
/// rejects with requeue so the broker redelivers.
async fn finalize<A: Acknowledger + ?Sized>(
    acker: &A,
    outcome: anyhow::Result<()>,
) -> Result<(), AcknowledgementError> {
    match outcome {
        Ok(()) => acker
            .ack()
            .await
            .map_err(|error| AcknowledgementError::new(AckOperation::Ack, error, None)),
        Err(handler_error) => {
            warn!(error = %handler_error, "handler failed; requeueing delivery");
            acker.reject_requeue().await.map_err(|error| {
                AcknowledgementError::new(AckOperation::Reject, error, Some(handler_error))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct AckerSpy {
        acks: Mutex<usize>,
        rejects: Mutex<usize>,
        fail_ack: bool,
        fail_reject: bool,
    }

    #[async_trait]
    impl Acknowledger for AckerSpy {
        async fn ack(&self) -> Result<(), lapin::Error> {
            *self.acks.lock().unwrap() += 1;
            if self.fail_ack {
                return Err(lapin::Error::ChannelsLimitReached);
            }
            Ok(())
        }

        async fn reject_requeue(&self) -> Result<(), lapin::Error> {
            *self.rejects.lock().unwrap() += 1;
            if self.fail_reject {
                return Err(lapin::Error::ChannelsLimitReached);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_successful_handler_acks_exactly_once() {
        let acker = AckerSpy::default();

        finalize(&acker, Ok(())).await.unwrap();

        assert_eq!(*acker.acks.lock().unwrap(), 1);
        assert_eq!(*acker.rejects.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_handler_rejects_exactly_once() {
        let acker = AckerSpy::default();

        finalize(&acker, Err(anyhow::anyhow!("no good")))
            .await
            .unwrap();

        assert_eq!(*acker.acks.lock().unwrap(), 0);
        assert_eq!(*acker.rejects.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_ack_is_an_acknowledgement_error() {
        let acker = AckerSpy {
            fail_ack: true,
            ..Default::default()
        };

        let err = finalize(&acker, Ok(())).await.unwrap_err();
        assert_eq!(err.operation(), AckOperation::Ack);
        assert!(err.original().is_none());
    }

    #[tokio::test]
    async fn test_failed_reject_wraps_the_handler_error() {
        let acker = AckerSpy {
            fail_reject: true,
            ..Default::default()
        };

        let err = finalize(&acker, Err(anyhow::anyhow!("handler exploded")))
            .await
            .unwrap_err();
        assert_eq!(err.operation(), AckOperation::Reject);
        let original = err.original().expect("original error should be carried");
        assert!(original.to_string().contains("handler exploded"));
    }
}
