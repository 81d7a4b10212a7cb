// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of KVPool.
//
// KVPool is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// KVPool is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with KVPool. If not, see <https://www.gnu.org/licenses/>.

//! Error types for pool supervision and store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while supervising the pool or running work on it.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Script source could not be located
    #[error("Script resource not found: {0}")]
    ResourceNotFound(String),

    /// Script source was located but could not be read
    #[error("Failed to read script {script}: {source}")]
    ScriptRead {
        /// Script name
        script: String,
        /// Underlying read failure
        #[source]
        source: std::io::Error,
    },

    /// Store rejected the script body
    #[error("Script registration failed for {script}: {reason}")]
    ScriptRegistration {
        /// Script name
        script: String,
        /// Store-reported reason
        reason: String,
    },

    /// Script handle was issued by another pool generation
    #[error("Stale script handle: issued by generation {handle_generation}, current is {current_generation}")]
    StaleScriptHandle {
        /// Generation that issued the handle
        handle_generation: u64,
        /// Generation of the executor it was used against
        current_generation: u64,
    },

    /// No connection could be borrowed (exhausted, destroyed, unreachable)
    #[error("Pool unavailable: {0}")]
    PoolUnavailable(String),

    /// Connection-level failure while running a unit of work
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Store failure while running a unit of work
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Reply did not have the expected shape
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Lifecycle misuse
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Fatal startup failure
    #[error("Cannot activate redis executor: {0}")]
    ActivationFailed(#[source] Box<StoreError>),

    /// Pool teardown problem
    #[error("Teardown error: {0}")]
    TeardownError(String),
}

impl StoreError {
    /// Whether the connection that produced this error should be discarded
    /// instead of going back to the idle set.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, StoreError::ConnectionError(_))
    }
}

impl From<toml::de::Error> for StoreError {
    fn from(err: toml::de::Error) -> Self {
        StoreError::ConfigError(err.to_string())
    }
}

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
            StoreError::ConnectionError(format!("Redis error: {}", err))
        } else {
            StoreError::BackendError(format!("Redis error: {}", err))
        }
    }
}
