// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Calq Worker - calculation job execution
//!
//! The worker consumes [`calq_core::workqueue::FibonacciOfJob`] messages,
//! marks the operation started, computes, and persists the terminal state.
//! Every durable step is retried with bounded-exponential backoff until it
//! succeeds or shutdown is requested; a job that cannot be completed is
//! rejected back to the broker for redelivery.
//!
//! # Modules
//!
//! - [`config`]: worker configuration from environment variables
//! - [`handler`]: the Fibonacci job handler
//! - [`retry`]: retry utility wrapping durable store writes

pub mod config;
pub mod handler;
pub mod retry;

pub use handler::FibOfHandler;
