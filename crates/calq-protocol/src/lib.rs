// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Calq Protocol - TCP + JSON communication layer
//!
//! This crate provides the wire protocol between clients and the calculation
//! API server (`calqd`).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      calq-protocol                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RPC Layer: Request/Response                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Serialization: JSON (serde_json)                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: TCP (length-prefixed frames)                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Operations
//!
//! | Operation | Description |
//! |-----------|-------------|
//! | `FibonacciOf` | Submit a calculation, returns an operation handle |
//! | `GetOperation` | Poll an operation until `done` with response or error |

pub mod client;
pub mod frame;
pub mod messages;
pub mod server;

pub use client::{CalqClient, ClientError};
pub use frame::{Frame, FrameError, FramedStream, MessageType};
pub use server::{RpcServer, ServerError};
