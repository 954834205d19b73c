// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Calq Core - Calculation Lifecycle Engine
//!
//! This crate provides the machinery shared by the API server (`calqd`) and
//! the worker (`calqw`): the operation store, the work queue, and the
//! calculators themselves.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   create/publish   ┌──────────────┐
//! │    calqd     │───────────────────►│  work queue  │
//! │ (API server) │                    │  (AMQP 0.9.1)│
//! └──────┬───────┘                    └──────┬───────┘
//!        │                                   │ consume
//!        │ get                               ▼
//!        │                            ┌──────────────┐
//!        │                            │    calqw     │
//!        │                            │   (worker)   │
//!        │                            └──────┬───────┘
//!        ▼                                   │ set_started / save
//! ┌──────────────────────────────────────────▼───────┐
//! │            operation store (revision-guarded KV) │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! # Operation lifecycle
//!
//! 1. The API mints an operation id, creates the store record, and publishes
//!    a job. Creation is guarded so an id can only ever be created once.
//! 2. A worker consumes the job, marks the record started, computes, and
//!    persists the terminal state (`done` plus exactly one of result/error).
//! 3. Every record update is a compare-and-swap on the record's version; a
//!    lost race surfaces as an update-unsuccessful error and the writer
//!    retries from a fresh read.
//!
//! # Modules
//!
//! - [`calculators`]: the Fibonacci calculation
//! - [`kv`]: revision-guarded key-value abstraction and its backends
//! - [`store`]: calculation records and the operation store
//! - [`workqueue`]: AMQP producer/consumer with ack/requeue discipline

pub mod calculators;
pub mod kv;
pub mod store;
pub mod workqueue;
