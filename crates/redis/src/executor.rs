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

//! Connection executor: runs units of work on a pooled connection.
//!
//! An executor is either [`ConnectionExecutor::Pooled`], backed by a live
//! [`ConnectionPool`], or [`ConnectionExecutor::Inert`]. The inert executor
//! never touches the network: work is not run and callers get the default
//! value of the result type. It stands in whenever Redis is disabled,
//! unconfigured, or shut down.

use crate::{ConnectionPool, ScriptHandle, ScriptReply, StoreConnection, StoreError, StoreResult};
use futures::future::BoxFuture;
use tracing::debug;

/// Generation reported by the inert executor.
pub const INERT_GENERATION: u64 = 0;

/// Runs units of work against the store.
pub enum ConnectionExecutor {
    /// No-op executor, returns defaults without running work
    Inert,
    /// Executor backed by a connection pool
    Pooled(ConnectionPool),
}

impl ConnectionExecutor {
    /// Wrap a pool.
    pub fn pooled(pool: ConnectionPool) -> Self {
        ConnectionExecutor::Pooled(pool)
    }

    /// Whether this executor talks to a real store.
    pub fn is_pooled(&self) -> bool {
        matches!(self, ConnectionExecutor::Pooled(_))
    }

    /// Backing pool, if any.
    pub fn pool(&self) -> Option<&ConnectionPool> {
        match self {
            ConnectionExecutor::Inert => None,
            ConnectionExecutor::Pooled(pool) => Some(pool),
        }
    }

    /// Generation of the backing pool, [`INERT_GENERATION`] when inert.
    pub fn generation(&self) -> u64 {
        self.pool()
            .map(ConnectionPool::generation)
            .unwrap_or(INERT_GENERATION)
    }

    /// Run `work` on a borrowed connection.
    ///
    /// The connection goes back to the pool when `work` finishes, or is
    /// dropped if `work` failed with a connection error. On the inert
    /// executor `work` is not called and `T::default()` is returned.
    ///
    /// ## Example
    /// ```rust
    /// # use kvpool_redis::*;
    /// # async fn example(executor: &ConnectionExecutor) -> StoreResult<()> {
    /// let value: Option<Vec<u8>> = executor
    ///     .execute(|conn| Box::pin(async move { conn.get("user:1").await }))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// ## Errors
    /// - [`StoreError::PoolUnavailable`]: no connection could be borrowed
    /// - whatever `work` returns
    pub async fn execute<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Default + Send,
        F: for<'c> FnOnce(&'c mut dyn StoreConnection) -> BoxFuture<'c, StoreResult<T>> + Send,
    {
        let pool = match self {
            ConnectionExecutor::Inert => return Ok(T::default()),
            ConnectionExecutor::Pooled(pool) => pool,
        };

        let mut conn = pool.borrow().await?;
        let result = work(&mut *conn).await;
        if let Err(e) = &result {
            if e.is_connection_error() {
                debug!(pool = %pool.name(), error = %e, "Discarding broken connection");
                conn.discard();
            }
        }
        result
    }

    /// Run a registered script.
    ///
    /// ## Errors
    /// - [`StoreError::StaleScriptHandle`]: `handle` was issued by another
    ///   pool generation
    pub async fn eval_script(
        &self,
        handle: &ScriptHandle,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<ScriptReply> {
        if self.is_pooled() && handle.generation != self.generation() {
            return Err(StoreError::StaleScriptHandle {
                handle_generation: handle.generation,
                current_generation: self.generation(),
            });
        }
        let sha = handle.sha.clone();
        let keys = keys.to_vec();
        let args = args.to_vec();
        self.execute(move |conn| Box::pin(async move { conn.eval_sha(&sha, &keys, &args).await }))
            .await
    }

    /// Release the backing pool. The inert executor has nothing to release.
    pub fn destroy(&self) -> StoreResult<()> {
        match self {
            ConnectionExecutor::Inert => Ok(()),
            ConnectionExecutor::Pooled(pool) => pool.destroy(),
        }
    }
}

impl std::fmt::Debug for ConnectionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionExecutor::Inert => f.write_str("ConnectionExecutor::Inert"),
            ConnectionExecutor::Pooled(pool) => {
                f.debug_tuple("ConnectionExecutor::Pooled").field(pool).finish()
            }
        }
    }
}
