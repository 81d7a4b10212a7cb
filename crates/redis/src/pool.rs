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

//! Bounded connection pool.
//!
//! ## Purpose
//! Hands out [`StoreConnection`]s to units of work and takes them back when
//! the work is done. At most `max_total` connections are borrowed at once;
//! further borrowers wait up to `max_wait` for one to come back.
//!
//! ## Design
//! - A [`Semaphore`] with `max_total` permits bounds concurrent borrows.
//! - Returned connections go to an idle deque (up to `max_idle`).
//! - An optional evictor task trims connections that sat idle too long and
//!   keeps `min_idle` warm. It stops on the pool's shutdown watch channel.
//! - [`ConnectionPool::destroy`] closes the semaphore, so waiting and future
//!   borrowers fail fast, and drops every idle connection. Connections still
//!   borrowed are dropped when their guards return them.
//!
//! Each pool gets a process-unique generation number, which script handles
//! use to detect that they were issued by an earlier pool.

use crate::{ConnectionFactory, PoolSizing, StoreConnection, StoreError, StoreResult};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Lock `mutex`, recovering the guard if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Configured borrow limit
    pub max_total: usize,
    /// Borrows that could start right now without waiting
    pub available: usize,
    /// Connections parked in the idle set
    pub idle: usize,
    /// Connections currently borrowed
    pub active: usize,
    /// Connections opened over the pool's lifetime
    pub created: u64,
    /// Connections dropped because they failed or exceeded limits
    pub discarded: u64,
}

struct IdleConnection {
    conn: Box<dyn StoreConnection>,
    since: Instant,
}

struct PoolInner {
    name: String,
    generation: u64,
    factory: Arc<dyn ConnectionFactory>,
    sizing: PoolSizing,
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleConnection>>,
    destroyed: AtomicBool,
    created: AtomicU64,
    discarded: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    evictor: Mutex<Option<JoinHandle<()>>>,
}

impl PoolInner {
    fn active(&self) -> usize {
        self.sizing
            .max_total
            .saturating_sub(self.permits.available_permits())
    }

    fn release(&self, conn: Box<dyn StoreConnection>, discard: bool) {
        let mut idle = lock(&self.idle);
        if discard || self.destroyed.load(Ordering::SeqCst) || idle.len() >= self.sizing.max_idle {
            drop(idle);
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }
        idle.push_back(IdleConnection {
            conn,
            since: Instant::now(),
        });
    }

    fn evict_idle(&self) -> usize {
        let min_age = self.sizing.min_evictable_idle();
        let mut idle = lock(&self.idle);
        let mut evicted = 0;
        while idle.len() > self.sizing.min_idle {
            match idle.front() {
                Some(oldest) if oldest.since.elapsed() >= min_age => {
                    idle.pop_front();
                    evicted += 1;
                }
                _ => break,
            }
        }
        if evicted > 0 {
            self.discarded.fetch_add(evicted as u64, Ordering::Relaxed);
        }
        evicted
    }

    async fn ensure_min_idle(&self) {
        loop {
            if self.destroyed.load(Ordering::SeqCst) {
                return;
            }
            let idle = lock(&self.idle).len();
            if idle >= self.sizing.min_idle || idle + self.active() >= self.sizing.max_total {
                return;
            }
            match self.factory.connect().await {
                Ok(conn) => {
                    self.created.fetch_add(1, Ordering::Relaxed);
                    self.release(conn, false);
                }
                Err(e) => {
                    warn!(pool = %self.name, error = %e, "Failed to open idle connection");
                    return;
                }
            }
        }
    }
}

/// Bounded pool of store connections.
///
/// Cloning is cheap; clones share the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create a pool that opens connections through `factory`.
    ///
    /// No connection is opened up front. When eviction is enabled the evictor
    /// task is spawned on the current Tokio runtime.
    ///
    /// ## Errors
    /// - [`StoreError::ConfigError`]: invalid sizing, or eviction enabled
    ///   outside a Tokio runtime
    pub fn new(
        name: impl Into<String>,
        factory: Arc<dyn ConnectionFactory>,
        sizing: PoolSizing,
    ) -> StoreResult<Self> {
        sizing.validate()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::new(PoolInner {
            name: name.into(),
            generation: NEXT_GENERATION.fetch_add(1, Ordering::SeqCst),
            factory,
            permits: Arc::new(Semaphore::new(sizing.max_total)),
            sizing,
            idle: Mutex::new(VecDeque::new()),
            destroyed: AtomicBool::new(false),
            created: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            shutdown_tx,
            evictor: Mutex::new(None),
        });

        if let Some(period) = inner.sizing.eviction_interval() {
            let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
                StoreError::ConfigError(
                    "pool eviction requires a running Tokio runtime".to_string(),
                )
            })?;
            let weak = Arc::downgrade(&inner);
            let handle = runtime.spawn(evictor_loop(weak, period, shutdown_rx));
            *lock(&inner.evictor) = Some(handle);
        }

        debug!(
            pool = %inner.name,
            generation = inner.generation,
            target = %inner.factory.describe(),
            max_total = inner.sizing.max_total,
            "Connection pool created"
        );
        Ok(Self { inner })
    }

    /// Pool name, used in logs.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Process-unique generation number of this pool.
    pub fn generation(&self) -> u64 {
        self.inner.generation
    }

    /// Whether [`destroy`](Self::destroy) has run.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Current counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            max_total: self.inner.sizing.max_total,
            available: self.inner.permits.available_permits(),
            idle: lock(&self.inner.idle).len(),
            active: self.inner.active(),
            created: self.inner.created.load(Ordering::Relaxed),
            discarded: self.inner.discarded.load(Ordering::Relaxed),
        }
    }

    /// Borrow a connection, waiting up to `max_wait` for one to free up.
    ///
    /// ## Errors
    /// - [`StoreError::PoolUnavailable`]: the pool is exhausted past the wait
    ///   limit, destroyed, or the store cannot be reached
    pub async fn borrow(&self) -> StoreResult<PooledConnection> {
        if self.is_destroyed() {
            return Err(StoreError::PoolUnavailable(format!(
                "pool {} is destroyed",
                self.inner.name
            )));
        }

        let max_wait = self.inner.sizing.max_wait();
        let acquire = self.inner.permits.clone().acquire_owned();
        let permit = match tokio::time::timeout(max_wait, acquire).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(StoreError::PoolUnavailable(format!(
                    "pool {} is destroyed",
                    self.inner.name
                )))
            }
            Err(_) => {
                return Err(StoreError::PoolUnavailable(format!(
                    "pool {} exhausted after waiting {:?}",
                    self.inner.name, max_wait
                )))
            }
        };

        loop {
            let candidate = lock(&self.inner.idle).pop_front();
            let Some(IdleConnection { mut conn, .. }) = candidate else {
                break;
            };
            if self.inner.sizing.test_on_borrow {
                if let Err(e) = conn.ping().await {
                    debug!(
                        pool = %self.inner.name,
                        error = %e,
                        "Dropping idle connection that failed validation"
                    );
                    self.inner.discarded.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            }
            return Ok(PooledConnection::new(conn, self.inner.clone(), permit));
        }

        let conn = self.inner.factory.connect().await.map_err(|e| {
            StoreError::PoolUnavailable(format!(
                "cannot connect to {}: {}",
                self.inner.factory.describe(),
                e
            ))
        })?;
        self.inner.created.fetch_add(1, Ordering::Relaxed);
        Ok(PooledConnection::new(conn, self.inner.clone(), permit))
    }

    /// Release every resource held by the pool.
    ///
    /// Idle connections are dropped now; borrowed ones when they come back.
    /// Waiting and later borrowers fail with [`StoreError::PoolUnavailable`].
    /// Calling it again is a no-op.
    ///
    /// ## Errors
    /// - [`StoreError::TeardownError`]: connections were still borrowed. The
    ///   pool is destroyed regardless.
    pub fn destroy(&self) -> StoreResult<()> {
        let drained = {
            let mut idle = lock(&self.inner.idle);
            if self.inner.destroyed.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            std::mem::take(&mut *idle)
        };
        let active = self.inner.active();
        self.inner.permits.close();
        let _ = self.inner.shutdown_tx.send(true);
        if let Some(handle) = lock(&self.inner.evictor).take() {
            handle.abort();
        }
        self.inner
            .discarded
            .fetch_add(drained.len() as u64, Ordering::Relaxed);

        info!(
            pool = %self.inner.name,
            generation = self.inner.generation,
            closed = drained.len(),
            in_use = active,
            "Connection pool destroyed"
        );
        drop(drained);

        if active > 0 {
            return Err(StoreError::TeardownError(format!(
                "pool {} destroyed with {} connection(s) still borrowed",
                self.inner.name, active
            )));
        }
        Ok(())
    }

    /// Run one eviction pass now. Returns the number of connections dropped.
    pub async fn evict(&self) -> usize {
        let evicted = self.inner.evict_idle();
        self.inner.ensure_min_idle().await;
        evicted
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("name", &self.inner.name)
            .field("generation", &self.inner.generation)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

async fn evictor_loop(
    pool: Weak<PoolInner>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        if *shutdown_rx.borrow_and_update() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {}
            Ok(_) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
        let Some(inner) = pool.upgrade() else {
            break;
        };
        let evicted = inner.evict_idle();
        if evicted > 0 {
            debug!(pool = %inner.name, evicted, "Evicted idle connections");
        }
        inner.ensure_min_idle().await;
    }
}

/// A borrowed connection. Returns to the pool when dropped.
pub struct PooledConnection {
    conn: Option<Box<dyn StoreConnection>>,
    pool: Arc<PoolInner>,
    discard: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    fn new(
        conn: Box<dyn StoreConnection>,
        pool: Arc<PoolInner>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            conn: Some(conn),
            pool,
            discard: false,
            _permit: permit,
        }
    }

    /// Drop the connection instead of returning it to the idle set.
    pub fn discard(&mut self) {
        self.discard = true;
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("pool", &self.pool.name)
            .field("generation", &self.pool.generation)
            .field("discard", &self.discard)
            .finish()
    }
}

impl Deref for PooledConnection {
    type Target = dyn StoreConnection;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_deref()
            .expect("connection is present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_deref_mut()
            .expect("connection is present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, self.discard);
        }
    }
}
