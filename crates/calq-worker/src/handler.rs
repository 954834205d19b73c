// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The Fibonacci job handler.
//!
//! For each delivery: parse the job, mark the operation started, compute,
//! and persist the terminal state. The durable steps are retried until they
//! succeed or the consumer is cancelled; any failure out of this handler
//! sends the delivery back to the broker for redelivery.

use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::value::RawValue;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use calq_core::calculators::{Fibonacci, FibonacciError};
use calq_core::store::{Datastore, FibonacciOfResult};
use calq_core::workqueue::{FibonacciOfJob, JobHandler};
use calq_protocol::messages::{ErrorCode, RpcStatus};

use crate::retry::retry;

/// Consumer handler executing [`FibonacciOfJob`] messages.
pub struct FibOfHandler {
    datastore: Arc<dyn Datastore>,
}

impl FibOfHandler {
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self { datastore }
    }
}

#[async_trait]
impl JobHandler for FibOfHandler {
    async fn handle(&self, cancel: &CancellationToken, payload: &[u8]) -> anyhow::Result<()> {
        let job: FibonacciOfJob =
            serde_json::from_slice(payload).context("unable to unmarshal job payload")?;

        if job.operation_name.is_empty() {
            bail!("job has no operation name");
        }

        let datastore = self.datastore.as_ref();
        let name = job.operation_name.as_str();

        retry(cancel, || async move {
            if let Err(error) = datastore.set_started(name, Utc::now()).await {
                warn!(operation = name, error = %error, "error setting calculation started time");
                return Err(error);
            }
            Ok(())
        })
        .await
        .with_context(|| format!("error setting started time on {name:?}"))?;
        info!(operation = name, "calculation started");

        let calculator = Fibonacci::new(job.first, job.second);
        let solution = calculator.number_at_position(job.position);

        let mut calculation = datastore
            .get(name)
            .await
            .context("error getting calculation from store")?;

        calculation.done = true;

        match solution {
            Ok(solution) => {
                let result = FibonacciOfResult {
                    position: job.position,
                    first: job.first,
                    second: job.second,
                    result: solution,
                };
                let raw = serde_json::to_string(&result)
                    .and_then(RawValue::from_string)
                    .context("error marshaling calculation result")?;
                calculation.error = None;
                calculation.result = Some(raw);
            }
            Err(error) => {
                warn!(operation = name, error = %error, "calculation failed");
                let code = match error {
                    FibonacciError::PositionInvalid => ErrorCode::InvalidArgument,
                    FibonacciError::Overflow { .. } => ErrorCode::Internal,
                };
                calculation.result = None;
                calculation.error = Some(RpcStatus::new(code, error.to_string()));
            }
        }

        let terminal = &calculation;
        retry(cancel, || async move {
            if let Err(error) = datastore.save(terminal).await {
                warn!(operation = name, error = %error, "error saving calculation");
                return Err(error);
            }
            Ok(())
        })
        .await
        .with_context(|| format!("error saving calculation {name:?}"))?;
        info!(operation = name, done = true, "calculation saved");

        Ok(())
    }
}
