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

//! # KVPool Redis
//!
//! ## Purpose
//! Supervises the process-wide Redis connection pool: builds it from
//! configuration at startup, hands out an executor that runs units of work
//! on pooled connections, registers Lua scripts, and tears the pool down when
//! the process is about to stop.
//!
//! ## Architecture
//!
//! ```text
//!   PoolConfig ──► PoolSupervisor ──► Generation { executor, del-keys handle }
//!                        │                     │ (ArcSwap)
//!                        │                     ▼
//!   RuntimeEvents ◄──────┘          ConnectionExecutor::{Inert, Pooled}
//!   (AboutToStop hook)                         │
//!                                              ▼
//!                              ConnectionPool ──► StoreBackend
//!                                                 (Redis / Memory)
//! ```
//!
//! ## Key Components
//!
//! - [`PoolSupervisor`]: configuration slot, start/stop, current executor
//! - [`ConnectionExecutor`]: runs work on a borrowed connection, or does
//!   nothing when Redis is disabled
//! - [`ConnectionPool`]: bounded pool with borrow timeout and idle eviction
//! - [`ScriptLoader`]: reads `<bundle>/<script>.lua` and registers it
//! - [`clear`]: atomic pattern delete through the `del-keys` script
//! - [`namespace`]: key namespaces under the configured prefix
//! - [`MemoryStore`]: in-process backend for tests
//!
//! ## Backend Support
//!
//! - **Memory**: always available
//! - **Redis**: feature `redis-backend` (default)
//!
//! ## Example
//! ```rust
//! use kvpool_redis::{MemoryStore, PoolConfig, PoolSupervisor, RuntimeEvents, StartContext};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//! store.insert("app:cache:1", b"x".to_vec());
//!
//! let supervisor = PoolSupervisor::new(Arc::new(store.clone()));
//! supervisor.register_config(PoolConfig::default().with_prefix("app:"));
//!
//! let events = Arc::new(RuntimeEvents::new());
//! supervisor.start(&StartContext::with_builtin_scripts(events)).await?;
//!
//! let pattern = format!("{}*", supervisor.namespace(&["cache"]));
//! assert_eq!(supervisor.clear(&pattern).await?, 1);
//!
//! supervisor.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//! ```bash
//! # Unit and in-memory integration tests
//! cargo test -p kvpool-redis
//!
//! # Include tests against a local Redis server
//! cargo test -p kvpool-redis -- --include-ignored
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bulk_delete;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod memory;
pub mod namespace;
pub mod pattern;
pub mod pool;
pub mod script;
pub mod supervisor;

#[cfg(feature = "redis-backend")]
pub mod redis;

pub use bulk_delete::{clear, DEL_KEYS_SCRIPT, DEL_KEYS_SOURCE};
pub use config::{PoolConfig, PoolSizing};
pub use connection::{ConnectionFactory, ScriptReply, StoreBackend, StoreConnection};
pub use error::{StoreError, StoreResult};
pub use executor::{ConnectionExecutor, INERT_GENERATION};
pub use lifecycle::{
    Component, ListenerId, RuntimeEvent, RuntimeEvents, RuntimeListener, StartContext,
    StartupSequence, DEFAULT_STARTUP_ORDER,
};
pub use memory::{MemoryData, MemoryStore, ScriptEmulation};
pub use namespace::{namespace, DEFAULT_PREFIX};
pub use pattern::glob_match;
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use script::{
    normalize_source, script_digest, BundleResources, DirectoryResources, ResourceLocator,
    ScriptHandle, ScriptLoader, SCRIPT_BUNDLE, SCRIPT_EXTENSION,
};
pub use supervisor::{PoolSupervisor, SupervisorState, COMPONENT_NAME, WORK_MANAGER_COMPONENT};

#[cfg(feature = "redis-backend")]
pub use crate::redis::{RedisBackend, RedisConnection, RedisConnectionFactory};
