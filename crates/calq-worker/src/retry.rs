// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bounded-exponential retry around durable steps.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

const INITIAL_DELAY: Duration = Duration::from_millis(30);
const DELAY_CEILING: Duration = Duration::from_secs(10 * 60);

/// The retry loop was cancelled before the task succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("retry abandoned: operation cancelled")]
pub struct Cancelled;

/// Delay to wait after the given zero-indexed failed attempt: 30ms doubling
/// per failure, capped at 10 minutes.
pub fn delay_for_attempt(attempt: u32) -> Duration {
    let multiplier = 2u32.saturating_pow(attempt);
    INITIAL_DELAY
        .saturating_mul(multiplier)
        .min(DELAY_CEILING)
}

/// Run an idempotent task until it succeeds or the token is cancelled.
///
/// The first attempt runs immediately. After each failure the loop waits for
/// the scheduled delay or for cancellation, whichever comes first; a
/// cancellation observed during the wait still completes the wait but the
/// loop returns [`Cancelled`] before the next attempt.
pub async fn retry<F, Fut, E>(cancel: &CancellationToken, mut task: F) -> Result<(), Cancelled>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let mut attempt = 0;

    loop {
        if task().await.is_ok() {
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(delay_for_attempt(attempt)) => {}
            _ = cancel.cancelled() => {}
        }

        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        attempt += 1;
    }
}
