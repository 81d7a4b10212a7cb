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

//! In-memory store implementation.
//!
//! ## Purpose
//! Provides a HashMap-backed store that speaks the same [`StoreConnection`]
//! contract as the Redis backend, for tests and single-process use.
//!
//! ## Scripts
//! The in-memory store cannot run Lua. Instead it keeps a table of script
//! emulations keyed by the SHA1 digest of the normalized script source.
//! `SCRIPT LOAD` only accepts sources it has an emulation for, and an
//! emulation runs while holding the data lock, so it is atomic with respect
//! to every other command, like a server-side script. The bundled
//! `del-keys` script is emulated out of the box.
//!
//! ## Limitations
//! - Not persistent (data lost on restart)
//! - Not distributed (single process only)
//! - No TTL support

use crate::bulk_delete::DEL_KEYS_SOURCE;
use crate::pattern::glob_match;
use crate::pool::lock;
use crate::script::{normalize_source, script_digest};
use crate::{
    ConnectionFactory, PoolConfig, ScriptReply, StoreBackend, StoreConnection, StoreError,
    StoreResult,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Data map handed to script emulations.
pub type MemoryData = HashMap<String, Vec<u8>>;

/// Native stand-in for a server-side script: `(data, keys, args) -> reply`.
pub type ScriptEmulation =
    Arc<dyn Fn(&mut MemoryData, &[String], &[String]) -> StoreResult<ScriptReply> + Send + Sync>;

struct MemoryInner {
    data: Mutex<MemoryData>,
    emulations: Mutex<HashMap<String, ScriptEmulation>>,
    loaded: Mutex<HashSet<String>>,
    unreachable: AtomicBool,
    open_connections: AtomicUsize,
}

/// In-memory store.
///
/// Cloning is cheap; clones share the same data.
///
/// ## Example
/// ```rust
/// use kvpool_redis::MemoryStore;
///
/// let store = MemoryStore::new();
/// store.insert("session:1", b"alice".to_vec());
/// assert!(store.contains_key("session:1"));
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store that can run the bundled `del-keys` script.
    pub fn new() -> Self {
        let store = Self {
            inner: Arc::new(MemoryInner {
                data: Mutex::new(HashMap::new()),
                emulations: Mutex::new(HashMap::new()),
                loaded: Mutex::new(HashSet::new()),
                unreachable: AtomicBool::new(false),
                open_connections: AtomicUsize::new(0),
            }),
        };
        store.register_script(DEL_KEYS_SOURCE, del_keys);
        store
    }

    /// Teach the store how to run `source`.
    pub fn register_script<F>(&self, source: &str, emulation: F)
    where
        F: Fn(&mut MemoryData, &[String], &[String]) -> StoreResult<ScriptReply>
            + Send
            + Sync
            + 'static,
    {
        let sha = script_digest(&normalize_source(source));
        lock(&self.inner.emulations).insert(sha, Arc::new(emulation));
    }

    /// Forget every loaded script, like `SCRIPT FLUSH` or a server restart.
    pub fn flush_scripts(&self) {
        lock(&self.inner.loaded).clear();
    }

    /// Simulate an outage: new connections are refused and open ones fail.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of connections currently open against this store.
    pub fn open_connections(&self) -> usize {
        self.inner.open_connections.load(Ordering::SeqCst)
    }

    /// Store a value directly.
    pub fn insert(&self, key: impl Into<String>, value: Vec<u8>) {
        lock(&self.inner.data).insert(key.into(), value);
    }

    /// Read a value directly.
    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.inner.data).get(key).cloned()
    }

    /// Check if key exists.
    pub fn contains_key(&self, key: &str) -> bool {
        lock(&self.inner.data).contains_key(key)
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.inner.data).keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        lock(&self.inner.data).len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Emulation of `del-keys.lua`: delete every key matching `KEYS[1]`.
fn del_keys(data: &mut MemoryData, keys: &[String], _args: &[String]) -> StoreResult<ScriptReply> {
    let pattern = keys.first().ok_or_else(|| {
        StoreError::BackendError("ERR wrong number of keys for del-keys".to_string())
    })?;
    let before = data.len();
    data.retain(|key, _| !glob_match(pattern, key));
    Ok(ScriptReply::Int((before - data.len()) as i64))
}

impl StoreBackend for MemoryStore {
    fn connection_factory(&self, _config: &PoolConfig) -> StoreResult<Arc<dyn ConnectionFactory>> {
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl ConnectionFactory for MemoryStore {
    async fn connect(&self) -> StoreResult<Box<dyn StoreConnection>> {
        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::ConnectionError("connection refused".to_string()));
        }
        self.inner.open_connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            inner: self.inner.clone(),
        }))
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}

/// Connection to a [`MemoryStore`].
pub struct MemoryConnection {
    inner: Arc<MemoryInner>,
}

impl MemoryConnection {
    fn check_reachable(&self) -> StoreResult<()> {
        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::ConnectionError("connection reset by peer".to_string()));
        }
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.inner.open_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn ping(&mut self) -> StoreResult<()> {
        self.check_reachable()
    }

    async fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check_reachable()?;
        Ok(lock(&self.inner.data).get(key).cloned())
    }

    async fn set(&mut self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.check_reachable()?;
        lock(&self.inner.data).insert(key.to_string(), value);
        Ok(())
    }

    async fn del(&mut self, key: &str) -> StoreResult<bool> {
        self.check_reachable()?;
        Ok(lock(&self.inner.data).remove(key).is_some())
    }

    async fn exists(&mut self, key: &str) -> StoreResult<bool> {
        self.check_reachable()?;
        Ok(lock(&self.inner.data).contains_key(key))
    }

    async fn script_load(&mut self, source: &str) -> StoreResult<String> {
        self.check_reachable()?;
        let sha = script_digest(source);
        if !lock(&self.inner.emulations).contains_key(&sha) {
            return Err(StoreError::BackendError(format!(
                "ERR Error compiling script: no emulation for {}",
                sha
            )));
        }
        lock(&self.inner.loaded).insert(sha.clone());
        debug!(sha = %sha, "script loaded into memory store");
        Ok(sha)
    }

    async fn eval_sha(
        &mut self,
        sha: &str,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<ScriptReply> {
        self.check_reachable()?;
        if !lock(&self.inner.loaded).contains(sha) {
            return Err(StoreError::BackendError(
                "NOSCRIPT No matching script. Please use EVAL.".to_string(),
            ));
        }
        let emulation = lock(&self.inner.emulations).get(sha).cloned().ok_or_else(|| {
            StoreError::BackendError("NOSCRIPT No matching script. Please use EVAL.".to_string())
        })?;
        let mut data = lock(&self.inner.data);
        (*emulation)(&mut *data, keys, args)
    }
}
