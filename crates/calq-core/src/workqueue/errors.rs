// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Structured acknowledgement failures.

use std::fmt;

/// The broker acknowledgement operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOperation {
    Ack,
    Reject,
    Nack,
}

impl AckOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Reject => "reject",
            Self::Nack => "nack",
        }
    }
}

impl fmt::Display for AckOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ack/reject/nack failed against the broker.
///
/// Carries the broker error and, when the acknowledgement was a reaction to a
/// failed handler, the antecedent handler error as well, so upstream logging
/// can distinguish an application bug from a broker-side failure.
#[derive(Debug)]
pub struct AcknowledgementError {
    operation: AckOperation,
    source: lapin::Error,
    original: Option<anyhow::Error>,
}

impl AcknowledgementError {
    pub fn new(
        operation: AckOperation,
        source: lapin::Error,
        original: Option<anyhow::Error>,
    ) -> Self {
        Self {
            operation,
            source,
            original,
        }
    }

    /// Which acknowledgement operation failed.
    pub fn operation(&self) -> AckOperation {
        self.operation
    }

    /// The handler error that preceded the failed acknowledgement, if any.
    pub fn original(&self) -> Option<&anyhow::Error> {
        self.original.as_ref()
    }
}

impl fmt::Display for AcknowledgementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.original {
            None => write!(
                f,
                "an acknowledgement error occurred during {}: {}",
                self.operation, self.source
            ),
            Some(original) => write!(
                f,
                "while handling error {:?}, an acknowledgement error occurred during {}: {}",
                original.to_string(),
                self.operation,
                self.source
            ),
        }
    }
}

impl std::error::Error for AcknowledgementError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
