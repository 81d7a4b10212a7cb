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

//! Executor behavior under load and failure.

use kvpool_redis::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn executor(store: &MemoryStore, sizing: PoolSizing) -> Arc<ConnectionExecutor> {
    let pool = ConnectionPool::new("executor-tests", Arc::new(store.clone()), sizing).unwrap();
    Arc::new(ConnectionExecutor::pooled(pool))
}

#[tokio::test]
async fn test_failing_work_returns_connection() {
    let store = MemoryStore::new();
    let executor = executor(&store, PoolSizing::default());
    let pool = executor.pool().unwrap().clone();
    let available = pool.stats().available;

    let err = executor
        .execute(|_conn| {
            Box::pin(async move {
                Err::<(), _>(StoreError::BackendError("WRONGTYPE".to_string()))
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::BackendError(_)));
    let stats = pool.stats();
    assert_eq!(stats.available, available);
    assert_eq!(stats.idle, 1);
    assert_eq!(stats.discarded, 0);
}

#[tokio::test]
async fn test_borrow_beyond_max_total_times_out() {
    let store = MemoryStore::new();
    let executor = executor(
        &store,
        PoolSizing {
            max_total: 2,
            max_idle: 2,
            max_wait_ms: 150,
            ..Default::default()
        },
    );
    let (release_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let (ready_tx, mut ready_rx) = tokio::sync::mpsc::channel::<()>(2);

    let mut holders = Vec::new();
    for _ in 0..2 {
        let executor = executor.clone();
        let ready = ready_tx.clone();
        let mut release = release_tx.subscribe();
        holders.push(tokio::spawn(async move {
            executor
                .execute(move |_conn| {
                    Box::pin(async move {
                        let _ = ready.send(()).await;
                        let _ = release.recv().await;
                        Ok(())
                    })
                })
                .await
        }));
    }
    ready_rx.recv().await.unwrap();
    ready_rx.recv().await.unwrap();

    let started = Instant::now();
    let err = executor
        .execute(|conn| Box::pin(async move { conn.ping().await }))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::PoolUnavailable(_)));
    assert!(started.elapsed() >= Duration::from_millis(150));

    release_tx.send(()).unwrap();
    for holder in holders {
        holder.await.unwrap().unwrap();
    }
    executor
        .execute(|conn| Box::pin(async move { conn.ping().await }))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_concurrent_work_is_bounded() {
    let store = MemoryStore::new();
    let executor = executor(
        &store,
        PoolSizing {
            max_total: 3,
            max_idle: 3,
            max_wait_ms: 5_000,
            ..Default::default()
        },
    );

    let mut tasks = Vec::new();
    for i in 0..20 {
        let executor = executor.clone();
        tasks.push(tokio::spawn(async move {
            executor
                .execute(move |conn| {
                    Box::pin(async move {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        conn.set(&format!("k:{i}"), vec![i as u8]).await
                    })
                })
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(store.len(), 20);
    let stats = executor.pool().unwrap().stats();
    assert!(stats.created <= 3);
    assert_eq!(stats.active, 0);
}

#[tokio::test]
async fn test_destroyed_executor_rejects_work() {
    let store = MemoryStore::new();
    let executor = executor(&store, PoolSizing::default());

    executor.destroy().unwrap();
    executor.destroy().unwrap();

    let err = executor
        .execute(|conn| Box::pin(async move { conn.ping().await }))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::PoolUnavailable(_)));
}

#[tokio::test]
async fn test_inert_eval_returns_nil() {
    let handle = ScriptHandle::new("deadbeef", 42);
    let reply = ConnectionExecutor::Inert
        .eval_script(&handle, &[], &[])
        .await
        .unwrap();
    assert_eq!(reply, ScriptReply::Nil);
    assert!(ConnectionExecutor::Inert.destroy().is_ok());
}

#[tokio::test]
async fn test_evictor_trims_idle_connections() {
    let store = MemoryStore::new();
    let executor = executor(
        &store,
        PoolSizing {
            max_total: 4,
            max_idle: 4,
            eviction_interval_ms: 20,
            min_evictable_idle_ms: 10,
            ..Default::default()
        },
    );

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let executor = executor.clone();
        tasks.push(tokio::spawn(async move {
            executor
                .execute(|conn| {
                    Box::pin(async move {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        conn.ping().await
                    })
                })
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(executor.pool().unwrap().stats().idle, 0);
    assert_eq!(store.open_connections(), 0);

    executor.destroy().unwrap();
}
