// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the API surface.
//!
//! Provides a unified error type that maps to RPC error responses. Internal
//! details are logged where the error arises; only the coarse error code and
//! a stable message cross the API boundary.

use thiserror::Error;

use calq_protocol::messages::{ErrorCode, RpcStatus};

/// API errors that can occur during request processing.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The minted operation name collided with an existing record.
    #[error("operation {name:?} already exists")]
    AlreadyExists { name: String },

    /// No record exists for the requested operation name.
    #[error("could not find operation {name:?}")]
    NotFound { name: String },

    /// The request itself was malformed.
    #[error("{message}")]
    InvalidArgument { message: String },

    /// Anything the caller cannot fix. Details stay in the server logs.
    #[error("internal error")]
    Internal,
}

impl ApiError {
    /// The wire error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AlreadyExists { .. } => ErrorCode::AlreadyExists,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::Internal => ErrorCode::Internal,
        }
    }

    /// Convert this error to an RpcStatus for protocol responses.
    pub fn to_status(&self) -> RpcStatus {
        RpcStatus::new(self.code(), self.to_string())
    }
}
