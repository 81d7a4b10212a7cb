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

//! End-to-end lifecycle through the umbrella crate: ordered startup,
//! work on the pooled executor, shutdown notification back to inert.

use kvpool::{
    MemoryStore, PoolConfig, PoolSupervisor, RuntimeEvents, StartContext, StartupSequence,
    SupervisorState,
};
use std::sync::Arc;

#[tokio::test]
async fn test_startup_work_and_shutdown() {
    let store = MemoryStore::new();
    store.insert("app:sessions:1", b"a".to_vec());
    store.insert("app:sessions:2", b"b".to_vec());
    store.insert("app:users:1", b"c".to_vec());

    let supervisor = PoolSupervisor::new(Arc::new(store.clone()));
    supervisor.register_config(PoolConfig::default().with_prefix("app:"));

    let events = Arc::new(RuntimeEvents::new());
    let ctx = StartContext::with_builtin_scripts(events.clone());
    let mut sequence = StartupSequence::new();
    sequence.register(supervisor.clone());
    sequence.start_all(&ctx).await.unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Started);

    let sessions = format!("{}*", supervisor.namespace(&["sessions"]));
    assert_eq!(supervisor.clear(&sessions).await.unwrap(), 2);
    assert_eq!(store.keys(), vec!["app:users:1".to_string()]);

    sequence.shutdown(&events).await;

    assert_eq!(supervisor.state(), SupervisorState::Stopped);
    assert!(!supervisor.current_executor().is_pooled());
    assert_eq!(events.listener_count(), 0);
    assert_eq!(store.open_connections(), 0);
    assert_eq!(supervisor.clear("*").await.unwrap(), 0);
}

#[tokio::test]
async fn test_disabled_pool_never_connects() {
    let store = MemoryStore::new();
    let supervisor = PoolSupervisor::new(Arc::new(store.clone()));
    supervisor.register_config(PoolConfig::default().disabled());

    let events = Arc::new(RuntimeEvents::new());
    let mut sequence = StartupSequence::new();
    sequence.register(supervisor.clone());
    sequence
        .start_all(&StartContext::with_builtin_scripts(events.clone()))
        .await
        .unwrap();
    sequence.shutdown(&events).await;

    assert_eq!(supervisor.state(), SupervisorState::PassivelyInert);
    assert_eq!(store.open_connections(), 0);
}
