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

//! Connection contract shared by the Redis and in-memory backends.
//!
//! ## Purpose
//! The pool and executor only ever talk to a [`StoreConnection`]; a
//! [`ConnectionFactory`] opens new ones and a [`StoreBackend`] turns a
//! [`PoolConfig`] into a factory. This keeps the supervision logic
//! independent of the wire client.

use crate::{PoolConfig, StoreResult};
use async_trait::async_trait;
use std::sync::Arc;

/// Script result, independent of the wire client.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScriptReply {
    /// No value
    #[default]
    Nil,
    /// Integer reply
    Int(i64),
    /// Bulk string reply
    Data(Vec<u8>),
    /// Status reply
    Status(String),
    /// Multi-bulk reply
    Array(Vec<ScriptReply>),
}

impl ScriptReply {
    /// Integer value, if this is an integer reply.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ScriptReply::Int(n) => Some(*n),
            _ => None,
        }
    }
}

/// A live connection to the store.
///
/// Implementations are used by one borrower at a time.
#[async_trait]
pub trait StoreConnection: Send {
    /// Round-trip health check.
    async fn ping(&mut self) -> StoreResult<()>;

    /// Get value by key.
    async fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store value under key.
    async fn set(&mut self, key: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Delete key, returns whether it existed.
    async fn del(&mut self, key: &str) -> StoreResult<bool>;

    /// Check if key exists.
    async fn exists(&mut self, key: &str) -> StoreResult<bool>;

    /// Register script source, returns its SHA1 digest.
    async fn script_load(&mut self, source: &str) -> StoreResult<String>;

    /// Run a registered script by digest.
    async fn eval_sha(
        &mut self,
        sha: &str,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<ScriptReply>;
}

/// Opens connections for a pool.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open a new connection.
    async fn connect(&self) -> StoreResult<Box<dyn StoreConnection>>;

    /// Human-readable target, used in logs.
    fn describe(&self) -> String;
}

/// Builds connection factories from configuration.
pub trait StoreBackend: Send + Sync {
    /// Factory for connections described by `config`.
    fn connection_factory(&self, config: &PoolConfig) -> StoreResult<Arc<dyn ConnectionFactory>>;
}
