// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message types for the calculation RPC surface.
//!
//! The service follows the long-running-operation shape: submitting a
//! calculation immediately returns an [`Operation`] handle, and clients poll
//! [`GetOperationRequest`] until `done` is true, at which point exactly one of
//! the error or response arms is populated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes carried by [`RpcStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The operation already exists (duplicate creation).
    AlreadyExists,
    /// The operation was not found.
    NotFound,
    /// The request (or the submitted calculation input) was invalid.
    InvalidArgument,
    /// Anything the service cannot attribute to the caller.
    Internal,
}

impl ErrorCode {
    /// The wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error, both on the wire and on stored calculation records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcStatus {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl RpcStatus {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Vec::new(),
        }
    }
}

impl fmt::Display for RpcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Request to start a Fibonacci calculation.
///
/// `nth_position` is 1-indexed: position 1 yields `first`, position 2 yields
/// `second`. Inputs are not validated at submission; an invalid position is
/// recorded as a failed operation by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FibonacciOfRequest {
    pub first: i64,
    pub second: i64,
    pub nth_position: i64,
}

/// Successful calculation payload returned under the operation response arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FibonacciOfResponse {
    pub first: i64,
    pub second: i64,
    pub nth_position: i64,
    pub result: i64,
}

/// Request to poll a previously submitted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetOperationRequest {
    /// The operation name returned at submission; always a UUID.
    pub name: String,
}

/// Operation metadata visible to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationMetadata {
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
}

/// Terminal outcome of an operation. Present only when `done` is true, and
/// exactly one arm is ever populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationResult {
    Error(RpcStatus),
    Response(FibonacciOfResponse),
}

/// The long-running-operation view of a calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    pub metadata: OperationMetadata,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<OperationResult>,
}

/// Request envelope carried in a request frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcRequest {
    FibonacciOf(FibonacciOfRequest),
    GetOperation(GetOperationRequest),
}

/// Response envelope carried in a response frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcResponse {
    Operation(Operation),
    Error(RpcStatus),
}
