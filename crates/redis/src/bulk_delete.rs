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

//! Pattern-based bulk delete.
//!
//! The `del-keys` script runs `KEYS` and `DEL` server-side, so the whole
//! clear is atomic with respect to other store commands: a key written
//! concurrently is either deleted or survives intact, never half-handled.

use crate::{ConnectionExecutor, ScriptHandle, ScriptReply, StoreError, StoreResult};
use tracing::debug;

/// Name of the bulk-delete script.
pub const DEL_KEYS_SCRIPT: &str = "del-keys";

/// Source of the bulk-delete script.
pub const DEL_KEYS_SOURCE: &str = include_str!("../scripts/del-keys.lua");

/// Delete every key matching `pattern`, returning how many were deleted.
///
/// `pattern` uses Redis glob syntax (`*`, `?`, `[...]`).
///
/// ## Errors
/// - [`StoreError::InvalidState`]: pooled executor but no registered script
/// - [`StoreError::UnexpectedReply`]: the script returned something other
///   than a non-negative integer
pub async fn clear(
    executor: &ConnectionExecutor,
    del_keys: Option<&ScriptHandle>,
    pattern: &str,
) -> StoreResult<u64> {
    if !executor.is_pooled() {
        return Ok(0);
    }
    let handle = del_keys.ok_or_else(|| {
        StoreError::InvalidState(format!("{} script is not registered", DEL_KEYS_SCRIPT))
    })?;

    let reply = executor
        .eval_script(handle, &[pattern.to_string()], &[])
        .await?;
    let deleted = match reply {
        ScriptReply::Nil => 0,
        ScriptReply::Int(n) if n >= 0 => n as u64,
        other => {
            return Err(StoreError::UnexpectedReply(format!(
                "{} returned {:?}",
                DEL_KEYS_SCRIPT, other
            )))
        }
    };
    debug!(pattern = %pattern, deleted, "Cleared keys");
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        BundleResources, ConnectionPool, MemoryData, MemoryStore, PoolSizing, ScriptLoader,
        SCRIPT_BUNDLE,
    };
    use std::sync::Arc;

    async fn pooled(store: &MemoryStore) -> (ConnectionExecutor, ScriptHandle) {
        let pool =
            ConnectionPool::new("clear", Arc::new(store.clone()), PoolSizing::default()).unwrap();
        let executor = ConnectionExecutor::pooled(pool);
        let handle = ScriptLoader::load(
            &executor,
            &BundleResources::builtin(),
            SCRIPT_BUNDLE,
            DEL_KEYS_SCRIPT,
        )
        .await
        .unwrap();
        (executor, handle)
    }

    #[test]
    fn test_script_batches_deletes() {
        assert!(DEL_KEYS_SOURCE.contains("KEYS[1]"));
        assert!(DEL_KEYS_SOURCE.contains("5000"));
    }

    #[tokio::test]
    async fn test_clear_inert_returns_zero() {
        let deleted = clear(&ConnectionExecutor::Inert, None, "*").await.unwrap();
        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn test_clear_matching_keys() {
        let store = MemoryStore::new();
        store.insert("test:a", vec![]);
        store.insert("test:b", vec![]);
        store.insert("other:key", vec![]);
        let (executor, handle) = pooled(&store).await;

        assert_eq!(clear(&executor, Some(&handle), "test:*").await.unwrap(), 2);
        assert_eq!(store.keys(), vec!["other:key".to_string()]);
        assert_eq!(clear(&executor, Some(&handle), "test:*").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_without_handle() {
        let store = MemoryStore::new();
        let (executor, _) = pooled(&store).await;
        let err = clear(&executor, None, "*").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_clear_rejects_non_integer_reply() {
        let store = MemoryStore::new();
        let (executor, handle) = pooled(&store).await;
        store.register_script(
            DEL_KEYS_SOURCE,
            |_: &mut MemoryData, _: &[String], _: &[String]| {
                Ok(ScriptReply::Status("OK".to_string()))
            },
        );

        let err = clear(&executor, Some(&handle), "*").await.unwrap_err();
        assert!(matches!(err, StoreError::UnexpectedReply(_)));
    }
}
