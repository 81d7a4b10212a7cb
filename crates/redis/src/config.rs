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

//! Configuration for the supervised Redis pool.
//!
//! ## Purpose
//! Describes where the store lives, how the pool is sized, which key prefix
//! the namespacer uses and whether the pool is enabled at all.
//!
//! ## Environment Variables
//! - `KVPOOL_REDIS_HOST`: Server host (default: "localhost")
//! - `KVPOOL_REDIS_PORT`: Server port (default: 6379)
//! - `KVPOOL_REDIS_USERNAME` / `KVPOOL_REDIS_PASSWORD`: ACL credentials
//! - `KVPOOL_REDIS_DATABASE`: Logical database index (default: 0)
//! - `KVPOOL_REDIS_TIMEOUT_MS`: Connect and response timeout (default: 2000)
//! - `KVPOOL_REDIS_PREFIX`: Key namespace prefix (default: "kvpool:")
//! - `KVPOOL_REDIS_DISABLED`: "true" keeps the executor inert
//! - `KVPOOL_REDIS_MAX_TOTAL`, `KVPOOL_REDIS_MAX_IDLE`, `KVPOOL_REDIS_MIN_IDLE`,
//!   `KVPOOL_REDIS_MAX_WAIT_MS`, `KVPOOL_REDIS_TEST_ON_BORROW`,
//!   `KVPOOL_REDIS_EVICTION_INTERVAL_MS`, `KVPOOL_REDIS_MIN_EVICTABLE_IDLE_MS`:
//!   pool sizing
//!
//! Blank values count as unset.
//!
//! ## TOML
//! ```toml
//! host = "redis.internal"
//! port = 6380
//! prefix = "myapp:"
//!
//! [pool]
//! max_total = 16
//! max_wait_ms = 1000
//! ```

use crate::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Connection pool sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSizing {
    /// Maximum number of connections borrowed at the same time
    pub max_total: usize,
    /// Maximum number of idle connections kept for reuse
    pub max_idle: usize,
    /// Idle connections the evictor keeps warm
    pub min_idle: usize,
    /// How long a borrow waits for a free connection before failing
    pub max_wait_ms: u64,
    /// PING idle connections before handing them out
    pub test_on_borrow: bool,
    /// Evictor period, 0 disables the evictor
    pub eviction_interval_ms: u64,
    /// Idle time after which the evictor drops a connection
    pub min_evictable_idle_ms: u64,
}

impl Default for PoolSizing {
    fn default() -> Self {
        Self {
            max_total: 8,
            max_idle: 8,
            min_idle: 0,
            max_wait_ms: 5_000,
            test_on_borrow: false,
            eviction_interval_ms: 0,
            min_evictable_idle_ms: 60_000,
        }
    }
}

impl PoolSizing {
    /// Borrow timeout.
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    /// Evictor period, `None` when eviction is disabled.
    pub fn eviction_interval(&self) -> Option<Duration> {
        (self.eviction_interval_ms > 0).then(|| Duration::from_millis(self.eviction_interval_ms))
    }

    /// Idle age at which a connection becomes evictable.
    pub fn min_evictable_idle(&self) -> Duration {
        Duration::from_millis(self.min_evictable_idle_ms)
    }

    /// Check sizing invariants.
    pub fn validate(&self) -> StoreResult<()> {
        if self.max_total == 0 {
            return Err(StoreError::ConfigError("pool.max_total must be at least 1".to_string()));
        }
        if self.max_idle > self.max_total {
            return Err(StoreError::ConfigError(
                "pool.max_idle cannot exceed pool.max_total".to_string(),
            ));
        }
        if self.min_idle > self.max_idle {
            return Err(StoreError::ConfigError(
                "pool.min_idle cannot exceed pool.max_idle".to_string(),
            ));
        }
        if self.max_wait_ms == 0 {
            return Err(StoreError::ConfigError(
                "pool.max_wait_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Redis pool configuration.
///
/// At most one configuration is active at a time; the
/// [`PoolSupervisor`](crate::PoolSupervisor) keeps it in a single slot.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// ACL username
    pub username: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Logical database index
    pub database: i64,
    /// Connect and response timeout in milliseconds
    pub timeout_ms: u64,
    /// Key namespace prefix, blank means the default prefix
    pub prefix: Option<String>,
    /// Keep the executor inert for the whole run
    pub disabled: bool,
    /// Pool sizing
    pub pool: PoolSizing,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            username: None,
            password: None,
            database: 0,
            timeout_ms: 2_000,
            prefix: None,
            disabled: false,
            pool: PoolSizing::default(),
        }
    }
}

impl std::fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("timeout_ms", &self.timeout_ms)
            .field("prefix", &self.prefix)
            .field("disabled", &self.disabled)
            .field("pool", &self.pool)
            .finish()
    }
}

impl PoolConfig {
    /// Configuration for `host:port` with defaults for everything else.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Set the namespace prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Mark the configuration disabled.
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Replace pool sizing.
    pub fn with_pool(mut self, pool: PoolSizing) -> Self {
        self.pool = pool;
        self
    }

    /// Create configuration from environment variables.
    ///
    /// ## Examples
    /// ```rust
    /// use kvpool_redis::PoolConfig;
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = PoolConfig::from_env()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_env() -> StoreResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create configuration from `lookup`, which maps `KVPOOL_REDIS_*`
    /// variable names to their values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StoreResult<Self> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();
        let pool_defaults = PoolSizing::default();

        let host = var("KVPOOL_REDIS_HOST").unwrap_or(defaults.host);
        let port = parse_var(&var, "KVPOOL_REDIS_PORT")?
            .unwrap_or(defaults.port);
        let username = var("KVPOOL_REDIS_USERNAME");
        let password = var("KVPOOL_REDIS_PASSWORD");
        let database = parse_var(&var, "KVPOOL_REDIS_DATABASE")?
            .unwrap_or(defaults.database);
        let timeout_ms = parse_var(&var, "KVPOOL_REDIS_TIMEOUT_MS")?
            .unwrap_or(defaults.timeout_ms);
        let prefix = var("KVPOOL_REDIS_PREFIX");
        let disabled = parse_var(&var, "KVPOOL_REDIS_DISABLED")?.unwrap_or(false);

        let pool = PoolSizing {
            max_total: parse_var(&var, "KVPOOL_REDIS_MAX_TOTAL")?
                .unwrap_or(pool_defaults.max_total),
            max_idle: parse_var(&var, "KVPOOL_REDIS_MAX_IDLE")?
                .unwrap_or(pool_defaults.max_idle),
            min_idle: parse_var(&var, "KVPOOL_REDIS_MIN_IDLE")?
                .unwrap_or(pool_defaults.min_idle),
            max_wait_ms: parse_var(&var, "KVPOOL_REDIS_MAX_WAIT_MS")?
                .unwrap_or(pool_defaults.max_wait_ms),
            test_on_borrow: parse_var(&var, "KVPOOL_REDIS_TEST_ON_BORROW")?
                .unwrap_or(pool_defaults.test_on_borrow),
            eviction_interval_ms: parse_var(&var, "KVPOOL_REDIS_EVICTION_INTERVAL_MS")?
                .unwrap_or(pool_defaults.eviction_interval_ms),
            min_evictable_idle_ms: parse_var(&var, "KVPOOL_REDIS_MIN_EVICTABLE_IDLE_MS")?
                .unwrap_or(pool_defaults.min_evictable_idle_ms),
        };

        Ok(Self {
            host,
            port,
            username,
            password,
            database,
            timeout_ms,
            prefix,
            disabled,
            pool,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            StoreError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check configuration invariants.
    pub fn validate(&self) -> StoreResult<()> {
        if self.host.trim().is_empty() {
            return Err(StoreError::ConfigError("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(StoreError::ConfigError("port must not be 0".to_string()));
        }
        if self.database < 0 {
            return Err(StoreError::ConfigError("database must not be negative".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(StoreError::ConfigError("timeout_ms must be positive".to_string()));
        }
        self.pool.validate()
    }

    /// Connect and response timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Pool name used in logs, never includes credentials.
    pub fn pool_name(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

fn parse_var<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> StoreResult<Option<T>> {
    match var(name) {
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            StoreError::ConfigError(format!("{} has an invalid value: {}", name, raw))
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = PoolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pool_name(), "localhost:6379/0");
        assert!(config.pool.eviction_interval().is_none());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = PoolConfig::from_toml_str(
            r#"
            host = "cache.internal"
            prefix = "app:"
            disabled = true

            [pool]
            max_total = 3
            max_idle = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.host, "cache.internal");
        assert_eq!(config.port, 6379);
        assert_eq!(config.prefix.as_deref(), Some("app:"));
        assert!(config.disabled);
        assert_eq!(config.pool.max_total, 3);
        assert_eq!(config.pool.max_idle, 2);
        assert_eq!(config.pool.max_wait_ms, 5_000);
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        let err = PoolConfig::from_toml_str("port = \"not a port\"").unwrap_err();
        assert!(matches!(err, StoreError::ConfigError(_)));
    }

    #[test]
    fn test_validate_sizing() {
        let mut sizing = PoolSizing::default();
        sizing.max_idle = sizing.max_total + 1;
        assert!(sizing.validate().is_err());

        let sizing = PoolSizing {
            max_total: 0,
            ..Default::default()
        };
        assert!(sizing.validate().is_err());

        let sizing = PoolSizing {
            max_wait_ms: 0,
            ..Default::default()
        };
        assert!(sizing.validate().is_err());

        let sizing = PoolSizing {
            min_idle: 4,
            max_idle: 2,
            ..Default::default()
        };
        assert!(sizing.validate().is_err());
    }

    #[test]
    fn test_validate_config() {
        assert!(PoolConfig::new("", 6379).validate().is_err());
        assert!(PoolConfig::new("localhost", 0).validate().is_err());
        let mut config = PoolConfig::default();
        config.database = -1;
        assert!(config.validate().is_err());
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_from_lookup_reads_sizing() {
        let config = PoolConfig::from_lookup(lookup(&[
            ("KVPOOL_REDIS_HOST", "cache.internal"),
            ("KVPOOL_REDIS_MAX_TOTAL", "4"),
            ("KVPOOL_REDIS_MAX_IDLE", "4"),
            ("KVPOOL_REDIS_MIN_EVICTABLE_IDLE_MS", "1500"),
        ]))
        .unwrap();

        assert_eq!(config.host, "cache.internal");
        assert_eq!(config.pool.max_total, 4);
        assert_eq!(config.pool.min_evictable_idle_ms, 1_500);
        assert_eq!(config.pool.min_evictable_idle(), Duration::from_millis(1_500));
    }

    #[test]
    fn test_from_lookup_ignores_blank_values() {
        let config = PoolConfig::from_lookup(lookup(&[
            ("KVPOOL_REDIS_USERNAME", ""),
            ("KVPOOL_REDIS_PASSWORD", "  "),
            ("KVPOOL_REDIS_PREFIX", ""),
            ("KVPOOL_REDIS_PORT", ""),
        ]))
        .unwrap();

        assert_eq!(config.username, None);
        assert_eq!(config.password, None);
        assert_eq!(config.prefix, None);
        assert_eq!(config.port, 6379);
    }

    #[test]
    fn test_from_lookup_rejects_bad_number() {
        let err =
            PoolConfig::from_lookup(lookup(&[("KVPOOL_REDIS_PORT", "http")])).unwrap_err();
        assert!(matches!(err, StoreError::ConfigError(_)));
    }

    #[test]
    fn test_debug_redacts_password() {
        let mut config = PoolConfig::default();
        config.password = Some("hunter2".to_string());

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("localhost"));
    }

    #[test]
    fn test_builders() {
        let config = PoolConfig::new("h", 1).with_prefix("p:").disabled();
        assert_eq!(config.prefix.as_deref(), Some("p:"));
        assert!(config.disabled);
    }
}
