// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

/// Worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite or PostgreSQL connection URL for the operation store
    pub database_url: String,
    /// AMQP broker host:port
    pub amqp_addr: String,
    /// Name of the work queue to consume
    pub queue_name: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `CALQW_DATABASE_URL`: SQLite or PostgreSQL connection string
    ///
    /// Optional (with defaults):
    /// - `CALQW_AMQP_ADDR`: broker address (default: localhost:5672)
    /// - `CALQW_QUEUE`: work queue name (default: calculations)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("CALQW_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("CALQW_DATABASE_URL"))?;

        let amqp_addr =
            std::env::var("CALQW_AMQP_ADDR").unwrap_or_else(|_| "localhost:5672".to_string());

        let queue_name =
            std::env::var("CALQW_QUEUE").unwrap_or_else(|_| "calculations".to_string());

        Ok(Self {
            database_url,
            amqp_addr,
            queue_name,
        })
    }

    /// The broker URL. Credentials are read only from the environment
    /// (`CALQW_RABBIT_USER` / `CALQW_RABBIT_PASS`) so they never land in
    /// static configuration.
    pub fn amqp_url(&self) -> String {
        let user = std::env::var("CALQW_RABBIT_USER").unwrap_or_default();
        let pass = std::env::var("CALQW_RABBIT_PASS").unwrap_or_default();
        format!("amqp://{user}:{pass}@{}/", self.amqp_addr)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
}
