// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;

/// API server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// RPC server listen address
    pub listen_addr: SocketAddr,
    /// SQLite or PostgreSQL connection URL for the operation store
    pub database_url: String,
    /// AMQP broker host:port
    pub amqp_addr: String,
    /// Name of the work queue to publish jobs to
    pub queue_name: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `CALQD_DATABASE_URL`: SQLite or PostgreSQL connection string
    ///
    /// Optional (with defaults):
    /// - `CALQD_LISTEN_ADDR`: RPC listen address (default: 0.0.0.0:8080)
    /// - `CALQD_AMQP_ADDR`: broker address (default: localhost:5672)
    /// - `CALQD_QUEUE`: work queue name (default: calculations)
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr: SocketAddr = std::env::var("CALQD_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("CALQD_LISTEN_ADDR", "must be a valid socket address")
            })?;

        let database_url = std::env::var("CALQD_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("CALQD_DATABASE_URL"))?;

        let amqp_addr =
            std::env::var("CALQD_AMQP_ADDR").unwrap_or_else(|_| "localhost:5672".to_string());

        let queue_name =
            std::env::var("CALQD_QUEUE").unwrap_or_else(|_| "calculations".to_string());

        Ok(Self {
            listen_addr,
            database_url,
            amqp_addr,
            queue_name,
        })
    }

    /// The broker URL. Credentials are read only from the environment
    /// (`CALQD_RABBIT_USER` / `CALQD_RABBIT_PASS`) so they never land in
    /// static configuration.
    pub fn amqp_url(&self) -> String {
        let user = std::env::var("CALQD_RABBIT_USER").unwrap_or_default();
        let pass = std::env::var("CALQD_RABBIT_PASS").unwrap_or_default();
        format!("amqp://{user}:{pass}@{}/", self.amqp_addr)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
