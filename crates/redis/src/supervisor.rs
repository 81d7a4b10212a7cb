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

//! Pool supervisor.
//!
//! ## Purpose
//! Owns the process-wide Redis executor. Callers always get an executor:
//! the inert one until a pool is started, a pooled one while it runs, and
//! the inert one again after shutdown.
//!
//! ## State machine
//! ```text
//! Unconfigured <-> Configured --start--> Started --stop--> Stopped
//!        \              |                    \
//!         +--start------+--> PassivelyInert   +--(activation failure)--> Stopped
//! ```
//! `start` runs at most once. The executor and the handle of the
//! `del-keys` script are published together as one [`ArcSwap`] store, so a
//! reader never sees a pooled executor without its script handle.
//!
//! ## Shutdown
//! A successful start subscribes one listener with the runtime events. On
//! the first [`RuntimeEvent::AboutToStop`] it unsubscribes itself and stops
//! the supervisor.

use crate::bulk_delete::{self, DEL_KEYS_SCRIPT};
use crate::lifecycle::{
    Component, ListenerId, RuntimeEvent, RuntimeEvents, RuntimeListener, StartContext,
    StartupSequence, DEFAULT_STARTUP_ORDER,
};
use crate::{
    namespace, ConnectionExecutor, ConnectionPool, PoolConfig, ResourceLocator, ScriptHandle,
    ScriptLoader, StoreBackend, StoreError, StoreResult, SCRIPT_BUNDLE,
};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use crate::pool::lock;
use std::sync::{Arc, Mutex, RwLock, Weak};
use tracing::{debug, error, info, warn};

/// Component name of the supervisor.
pub const COMPONENT_NAME: &str = "redis-pool";

/// Component the supervisor must start before.
pub const WORK_MANAGER_COMPONENT: &str = "work-manager";

/// Observable supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Not started, no configuration registered
    Unconfigured,
    /// Not started, configuration registered
    Configured,
    /// Pool running
    Started,
    /// Started without configuration, or with a disabled one
    PassivelyInert,
    /// Pool shut down, or activation failed
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Started,
    PassivelyInert,
    Stopped,
}

/// Executor plus the script handle issued against it.
struct Generation {
    executor: Arc<ConnectionExecutor>,
    del_keys: Option<ScriptHandle>,
}

impl Generation {
    fn inert() -> Self {
        Self {
            executor: Arc::new(ConnectionExecutor::Inert),
            del_keys: None,
        }
    }
}

/// Supervises the Redis connection pool.
pub struct PoolSupervisor {
    backend: Arc<dyn StoreBackend>,
    config: RwLock<Option<PoolConfig>>,
    current: ArcSwap<Generation>,
    phase: Mutex<Phase>,
    lifecycle: tokio::sync::Mutex<()>,
    shutdown_hook: Mutex<Option<(Arc<RuntimeEvents>, ListenerId)>>,
}

impl PoolSupervisor {
    /// Supervisor that builds pools through `backend`.
    pub fn new(backend: Arc<dyn StoreBackend>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            config: RwLock::new(None),
            current: ArcSwap::from_pointee(Generation::inert()),
            phase: Mutex::new(Phase::Idle),
            lifecycle: tokio::sync::Mutex::new(()),
            shutdown_hook: Mutex::new(None),
        })
    }

    /// Supervisor backed by a real Redis server.
    #[cfg(feature = "redis-backend")]
    pub fn redis() -> Arc<Self> {
        Self::new(Arc::new(crate::redis::RedisBackend))
    }

    /// Reset the configuration slot to empty.
    pub fn activate(&self) {
        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    /// Record the active configuration, replacing any previous one.
    ///
    /// Only the configuration present when [`start`](Self::start) runs is
    /// used.
    pub fn register_config(&self, config: PoolConfig) {
        debug!(
            pool = %config.pool_name(),
            disabled = config.disabled,
            "Registered redis configuration"
        );
        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(config);
    }

    /// Clear the active configuration.
    pub fn unregister_config(&self) {
        self.activate();
    }

    /// Active configuration, if any.
    pub fn config(&self) -> Option<PoolConfig> {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Current state.
    pub fn state(&self) -> SupervisorState {
        match *lock(&self.phase) {
            Phase::Idle if self.config().is_some() => SupervisorState::Configured,
            Phase::Idle => SupervisorState::Unconfigured,
            Phase::Started => SupervisorState::Started,
            Phase::PassivelyInert => SupervisorState::PassivelyInert,
            Phase::Stopped => SupervisorState::Stopped,
        }
    }

    /// Start the pool from the active configuration.
    ///
    /// Without a configuration, or with a disabled one, the executor stays
    /// inert and this succeeds.
    ///
    /// ## Errors
    /// - [`StoreError::InvalidState`]: start was already attempted
    /// - [`StoreError::ActivationFailed`]: the configuration is invalid, the
    ///   pool could not be built, or `del-keys` could not be registered. The
    ///   executor is inert afterwards.
    pub async fn start(self: &Arc<Self>, ctx: &StartContext) -> StoreResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if *lock(&self.phase) != Phase::Idle {
            return Err(StoreError::InvalidState(
                "redis pool supervisor was already started".to_string(),
            ));
        }

        let config = match self.config() {
            Some(config) if !config.disabled => config,
            Some(_) => {
                info!("Redis is disabled, using inert executor");
                *lock(&self.phase) = Phase::PassivelyInert;
                return Ok(());
            }
            None => {
                info!("No redis configuration, using inert executor");
                *lock(&self.phase) = Phase::PassivelyInert;
                return Ok(());
            }
        };

        match self.build_generation(&config, ctx).await {
            Ok(generation) => {
                let pool_generation = generation.executor.generation();
                self.current.store(Arc::new(generation));

                let hook = Arc::new(ShutdownHook {
                    supervisor: Arc::downgrade(self),
                });
                let id = ctx.events().subscribe(hook);
                *lock(&self.shutdown_hook) = Some((ctx.events().clone(), id));
                *lock(&self.phase) = Phase::Started;

                info!(
                    pool = %config.pool_name(),
                    generation = pool_generation,
                    max_total = config.pool.max_total,
                    "Redis pool started"
                );
                Ok(())
            }
            Err(e) => {
                self.current.store(Arc::new(Generation::inert()));
                *lock(&self.phase) = Phase::Stopped;
                error!(pool = %config.pool_name(), error = %e, "Cannot activate redis executor");
                Err(StoreError::ActivationFailed(Box::new(e)))
            }
        }
    }

    async fn build_generation(
        &self,
        config: &PoolConfig,
        ctx: &StartContext,
    ) -> StoreResult<Generation> {
        config.validate()?;
        let factory = self.backend.connection_factory(config)?;
        let pool = ConnectionPool::new(config.pool_name(), factory, config.pool.clone())?;
        let executor = Arc::new(ConnectionExecutor::pooled(pool));

        match ScriptLoader::load(
            &executor,
            ctx.resources().as_ref(),
            SCRIPT_BUNDLE,
            DEL_KEYS_SCRIPT,
        )
        .await
        {
            Ok(handle) => Ok(Generation {
                executor,
                del_keys: Some(handle),
            }),
            Err(e) => {
                if let Err(teardown) = executor.destroy() {
                    warn!(error = %teardown, "Failed to destroy pool after activation failure");
                }
                Err(e)
            }
        }
    }

    /// Shut the pool down and fall back to the inert executor.
    ///
    /// Does nothing unless the pool is running. Teardown problems are
    /// logged, never returned.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        if *lock(&self.phase) != Phase::Started {
            return;
        }

        let previous = self.current.swap(Arc::new(Generation::inert()));
        if let Err(e) = previous.executor.destroy() {
            warn!(error = %e, "Redis pool teardown reported a problem");
        }

        if let Some((events, id)) = lock(&self.shutdown_hook).take() {
            events.unsubscribe(id);
        }
        *lock(&self.phase) = Phase::Stopped;
        info!(generation = previous.executor.generation(), "Redis pool stopped");
    }

    /// Executor to run work with. Never absent.
    pub fn current_executor(&self) -> Arc<ConnectionExecutor> {
        self.current.load().executor.clone()
    }

    /// Handle of the registered `del-keys` script, while the pool runs.
    pub fn del_keys_handle(&self) -> Option<ScriptHandle> {
        self.current.load().del_keys.clone()
    }

    /// Delete every key matching `pattern`. Returns 0 while inert.
    pub async fn clear(&self, pattern: &str) -> StoreResult<u64> {
        let generation = self.current.load_full();
        bulk_delete::clear(&generation.executor, generation.del_keys.as_ref(), pattern).await
    }

    /// Namespace under the configured prefix.
    pub fn namespace(&self, names: &[&str]) -> String {
        let prefix = self.config().and_then(|config| config.prefix);
        namespace(prefix.as_deref(), names)
    }

    /// Register a script with the current executor.
    pub async fn load(
        &self,
        locator: &dyn ResourceLocator,
        bundle: &str,
        script: &str,
    ) -> StoreResult<ScriptHandle> {
        let executor = self.current_executor();
        ScriptLoader::load(&executor, locator, bundle, script).await
    }
}

#[async_trait]
impl Component for PoolSupervisor {
    fn name(&self) -> &str {
        COMPONENT_NAME
    }

    /// One step before the work manager, so queued work finds the pool up.
    fn startup_order(&self, sequence: &StartupSequence) -> i32 {
        sequence
            .order_of(WORK_MANAGER_COMPONENT)
            .unwrap_or(DEFAULT_STARTUP_ORDER)
            - 1
    }

    async fn start_component(self: Arc<Self>, ctx: &StartContext) -> StoreResult<()> {
        self.start(ctx).await
    }
}

struct ShutdownHook {
    supervisor: Weak<PoolSupervisor>,
}

#[async_trait]
impl RuntimeListener for ShutdownHook {
    async fn handle_event(&self, events: &RuntimeEvents, id: ListenerId, event: RuntimeEvent) {
        if event != RuntimeEvent::AboutToStop {
            return;
        }
        events.unsubscribe(id);
        if let Some(supervisor) = self.supervisor.upgrade() {
            lock(&supervisor.shutdown_hook).take();
            supervisor.stop().await;
        }
    }
}
