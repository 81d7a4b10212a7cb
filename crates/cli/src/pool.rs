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

//! Pool commands

use anyhow::{bail, Context, Result};
use kvpool::{
    DirectoryResources, PoolConfig, PoolSupervisor, RuntimeEvent, RuntimeEvents, StartContext,
    StartupSequence, SupervisorState,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Configuration from `path`, or from the environment when absent.
pub fn load_config(path: Option<&Path>) -> Result<PoolConfig> {
    match path {
        Some(path) => PoolConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => PoolConfig::from_env().context("Invalid KVPOOL_REDIS_* environment"),
    }
}

async fn start(config: PoolConfig) -> Result<(Arc<PoolSupervisor>, Arc<RuntimeEvents>)> {
    let supervisor = PoolSupervisor::redis();
    supervisor.register_config(config);
    let events = Arc::new(RuntimeEvents::new());
    supervisor
        .start(&StartContext::with_builtin_scripts(events.clone()))
        .await
        .context("Failed to start redis pool")?;
    Ok((supervisor, events))
}

fn require_started(supervisor: &PoolSupervisor) -> Result<()> {
    if supervisor.state() != SupervisorState::Started {
        bail!("Redis is disabled or not configured; nothing to do");
    }
    Ok(())
}

pub async fn clear(config: PoolConfig, pattern: &str) -> Result<()> {
    let (supervisor, _events) = start(config).await?;
    require_started(&supervisor)?;

    let result = supervisor.clear(pattern).await;
    supervisor.stop().await;

    let deleted = result.with_context(|| format!("Failed to clear {}", pattern))?;
    println!("Deleted {} key(s) matching {}", deleted, pattern);
    Ok(())
}

pub fn namespace(config: PoolConfig, names: &[String]) {
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    println!("{}", kvpool::namespace(config.prefix.as_deref(), &names));
}

pub async fn load_script(
    config: PoolConfig,
    dir: &Path,
    bundle: &str,
    script: &str,
) -> Result<()> {
    let (supervisor, _events) = start(config).await?;
    require_started(&supervisor)?;

    let locator = DirectoryResources::new(dir);
    let result = supervisor.load(&locator, bundle, script).await;
    supervisor.stop().await;

    let handle = result.with_context(|| format!("Failed to load {}/{}", bundle, script))?;
    println!("{} {}", script, handle.sha);
    Ok(())
}

pub async fn run(config: PoolConfig, stats_interval_secs: u64) -> Result<()> {
    let supervisor = PoolSupervisor::redis();
    supervisor.register_config(config);

    let events = Arc::new(RuntimeEvents::new());
    let ctx = StartContext::with_builtin_scripts(events.clone());
    let mut sequence = StartupSequence::new();
    sequence.register(supervisor.clone());

    let started = sequence
        .start_all(&ctx)
        .await
        .context("Failed to start components")?;
    info!(components = ?started, state = ?supervisor.state(), "Started");

    let mut signals = events.listen_for_signals();
    if stats_interval_secs > 0 {
        let mut ticker = tokio::time::interval(Duration::from_secs(stats_interval_secs));
        loop {
            tokio::select! {
                result = &mut signals => {
                    result.context("Signal listener failed")?;
                    break;
                }
                _ = ticker.tick() => {
                    if let Some(pool) = supervisor.current_executor().pool() {
                        let stats = pool.stats();
                        info!(
                            active = stats.active,
                            idle = stats.idle,
                            available = stats.available,
                            created = stats.created,
                            discarded = stats.discarded,
                            "Pool statistics"
                        );
                    }
                }
            }
        }
    } else {
        signals.await.context("Signal listener failed")?;
    }

    // AboutToStop already ran the pool's shutdown hook
    events.notify(RuntimeEvent::Stopped).await;
    info!(state = ?supervisor.state(), "Shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.toml");
        std::fs::write(
            &path,
            "host = \"cache.internal\"\nprefix = \"app:\"\n\n[pool]\nmax_total = 16\nmax_idle = 4\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.host, "cache.internal");
        assert_eq!(config.prefix.as_deref(), Some("app:"));
        assert_eq!(config.pool.max_total, 16);
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
