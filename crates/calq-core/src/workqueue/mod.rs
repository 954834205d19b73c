// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reliable work queue over AMQP 0.9.1.
//!
//! The producer and consumer sides declare the same queue and exchange
//! messages at-least-once: the producer publishes JSON jobs, the consumer
//! dispatches each delivery to a handler and acknowledges or requeues it
//! based on the outcome. Channel recovery on the producer side is handled by
//! a supervisor task so publishers never block on a broken channel.

use serde::{Deserialize, Serialize};

pub mod consumer;
pub mod errors;
pub mod producer;

pub use consumer::{Consumer, ConsumeError, JobHandler};
pub use errors::{AckOperation, AcknowledgementError};
pub use producer::{JobQueue, Producer, PublishError};

/// Queue declaration parameters, fixed at construction.
///
/// Both sides of the queue must declare with the same parameters; the broker
/// rejects mismatched redeclarations.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    pub name: String,
    pub durable: bool,
}

impl QueueOptions {
    /// Options for a non-durable queue with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: false,
        }
    }

    /// Declare the queue as durable.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }
}

/// Job message instructing a worker to run a Fibonacci calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FibonacciOfJob {
    /// The name of the operation in the data store.
    pub operation_name: String,
    /// The first number in the sequence.
    pub first: i64,
    /// The second number in the sequence.
    pub second: i64,
    /// Which number in the sequence to calculate; the first number in the
    /// sequence is position 1.
    pub position: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_wire_format() {
        let job = FibonacciOfJob {
            operation_name: "george".to_string(),
            first: 0,
            second: 1,
            position: 6,
        };

        let json = serde_json::to_string(&job).unwrap();
        assert_eq!(
            json,
            r#"{"operation_name":"george","first":0,"second":1,"position":6}"#
        );

        let parsed: FibonacciOfJob = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, job);
    }

    #[test]
    fn test_queue_options_defaults() {
        let options = QueueOptions::new("calculations");
        assert_eq!(options.name, "calculations");
        assert!(!options.durable);

        let durable = QueueOptions::new("calculations").durable();
        assert!(durable.durable);
    }
}
