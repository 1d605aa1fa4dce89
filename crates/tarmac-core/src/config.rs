// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

/// Tarmac scheduler configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Maximum connections in the database pool
    pub db_max_connections: u32,
    /// Event broker buffer capacity, in events per subscriber
    pub event_buffer: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `TARMAC_DATABASE_URL`: PostgreSQL connection string
    ///
    /// Optional (with defaults):
    /// - `TARMAC_DB_MAX_CONNECTIONS`: Max pool connections (default: 10)
    /// - `TARMAC_EVENT_BUFFER`: Event buffer per subscriber (default: 1024)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("TARMAC_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("TARMAC_DATABASE_URL"))?;

        let db_max_connections: u32 = std::env::var("TARMAC_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("TARMAC_DB_MAX_CONNECTIONS", "must be a positive integer")
            })?;

        let event_buffer: usize = std::env::var("TARMAC_EVENT_BUFFER")
            .unwrap_or_else(|_| "1024".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("TARMAC_EVENT_BUFFER", "must be a positive integer"))?;
        if event_buffer == 0 {
            return Err(ConfigError::Invalid(
                "TARMAC_EVENT_BUFFER",
                "must be a positive integer",
            ));
        }

        Ok(Self {
            database_url,
            db_max_connections,
            event_buffer,
        })
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
