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

//! Redis backend.
//!
//! ## Purpose
//! Opens multiplexed Redis connections for the
//! [`ConnectionPool`](crate::ConnectionPool).
//! Each pooled connection is its own multiplexed tokio connection; the pool
//! bounds how many units of work use the server at once.
//!
//! ## Timeouts
//! `timeout_ms` bounds both connecting and every individual command. A
//! command that exceeds it fails with [`StoreError::ConnectionError`], so
//! the executor discards that connection.

use crate::{
    ConnectionFactory, PoolConfig, ScriptReply, StoreBackend, StoreConnection, StoreError,
    StoreResult,
};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Builds [`RedisConnectionFactory`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisBackend;

impl StoreBackend for RedisBackend {
    fn connection_factory(&self, config: &PoolConfig) -> StoreResult<Arc<dyn ConnectionFactory>> {
        Ok(Arc::new(RedisConnectionFactory::new(config)?))
    }
}

/// Opens connections to one Redis server.
pub struct RedisConnectionFactory {
    client: Client,
    timeout: Duration,
    target: String,
}

impl RedisConnectionFactory {
    /// Factory for the server described by `config`.
    ///
    /// ## Errors
    /// - [`StoreError::ConfigError`]: the connection info was rejected
    pub fn new(config: &PoolConfig) -> StoreResult<Self> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: RedisConnectionInfo {
                db: config.database,
                username: config.username.clone(),
                password: config.password.clone(),
                ..Default::default()
            },
        };
        let client = Client::open(info).map_err(|e| StoreError::ConfigError(e.to_string()))?;
        Ok(Self {
            client,
            timeout: config.timeout(),
            target: format!("redis://{}", config.pool_name()),
        })
    }
}

#[async_trait]
impl ConnectionFactory for RedisConnectionFactory {
    async fn connect(&self) -> StoreResult<Box<dyn StoreConnection>> {
        let conn = bounded(self.timeout, self.client.get_multiplexed_async_connection()).await?;
        Ok(Box::new(RedisConnection {
            conn,
            timeout: self.timeout,
        }))
    }

    fn describe(&self) -> String {
        self.target.clone()
    }
}

/// Run a Redis future, failing with a connection error past `limit`.
async fn bounded<T, F>(limit: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(StoreError::ConnectionError(format!(
            "no reply within {:?}",
            limit
        ))),
    }
}

/// Pooled Redis connection.
pub struct RedisConnection {
    conn: MultiplexedConnection,
    timeout: Duration,
}

#[async_trait]
impl StoreConnection for RedisConnection {
    async fn ping(&mut self) -> StoreResult<()> {
        let pong: String =
            bounded(self.timeout, redis::cmd("PING").query_async(&mut self.conn)).await?;
        if pong != "PONG" {
            return Err(StoreError::UnexpectedReply(format!("PING returned {}", pong)));
        }
        Ok(())
    }

    async fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> = bounded(self.timeout, self.conn.get(key)).await?;
        Ok(value)
    }

    async fn set(&mut self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        let _: () = bounded(self.timeout, self.conn.set(key, value)).await?;
        Ok(())
    }

    async fn del(&mut self, key: &str) -> StoreResult<bool> {
        let removed: i64 = bounded(self.timeout, self.conn.del(key)).await?;
        Ok(removed > 0)
    }

    async fn exists(&mut self, key: &str) -> StoreResult<bool> {
        let exists: bool = bounded(self.timeout, self.conn.exists(key)).await?;
        Ok(exists)
    }

    async fn script_load(&mut self, source: &str) -> StoreResult<String> {
        let sha: String = bounded(
            self.timeout,
            redis::cmd("SCRIPT")
                .arg("LOAD")
                .arg(source)
                .query_async(&mut self.conn),
        )
        .await?;
        Ok(sha)
    }

    async fn eval_sha(
        &mut self,
        sha: &str,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<ScriptReply> {
        let mut cmd = redis::cmd("EVALSHA");
        cmd.arg(sha).arg(keys.len()).arg(keys).arg(args);
        let value: Value = bounded(self.timeout, cmd.query_async(&mut self.conn)).await?;
        Ok(reply_from_value(value))
    }
}

/// Convert a raw reply.
pub(crate) fn reply_from_value(value: Value) -> ScriptReply {
    match value {
        Value::Nil => ScriptReply::Nil,
        Value::Int(n) => ScriptReply::Int(n),
        Value::BulkString(bytes) => ScriptReply::Data(bytes),
        Value::SimpleString(status) => ScriptReply::Status(status),
        Value::Okay => ScriptReply::Status("OK".to_string()),
        Value::Boolean(flag) => ScriptReply::Int(i64::from(flag)),
        Value::Array(items) | Value::Set(items) => {
            ScriptReply::Array(items.into_iter().map(reply_from_value).collect())
        }
        other => ScriptReply::Status(format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> PoolConfig {
        PoolConfig::new("localhost", 6379)
    }

    #[test]
    fn test_reply_conversion() {
        assert_eq!(reply_from_value(Value::Nil), ScriptReply::Nil);
        assert_eq!(reply_from_value(Value::Int(3)), ScriptReply::Int(3));
        assert_eq!(
            reply_from_value(Value::Array(vec![Value::Int(1), Value::BulkString(b"x".to_vec())])),
            ScriptReply::Array(vec![ScriptReply::Int(1), ScriptReply::Data(b"x".to_vec())])
        );
        assert_eq!(reply_from_value(Value::Okay), ScriptReply::Status("OK".to_string()));
    }

    #[test]
    fn test_factory_describes_target() {
        let factory = RedisConnectionFactory::new(&local_config()).unwrap();
        assert_eq!(factory.describe(), "redis://localhost:6379/0");
    }

    #[tokio::test]
    #[ignore] // Requires running Redis instance
    async fn test_redis_roundtrip() {
        let factory = RedisConnectionFactory::new(&local_config()).unwrap();
        let mut conn = factory.connect().await.unwrap();

        conn.ping().await.unwrap();
        conn.set("kvpool:test:roundtrip", b"v".to_vec()).await.unwrap();
        assert_eq!(
            conn.get("kvpool:test:roundtrip").await.unwrap(),
            Some(b"v".to_vec())
        );
        assert!(conn.del("kvpool:test:roundtrip").await.unwrap());
        assert!(!conn.exists("kvpool:test:roundtrip").await.unwrap());
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_unknown_script() {
        let factory = RedisConnectionFactory::new(&local_config()).unwrap();
        let mut conn = factory.connect().await.unwrap();

        let err = conn
            .eval_sha("0000000000000000000000000000000000000000", &[], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("NOSCRIPT"));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let factory = RedisConnectionFactory::new(&PoolConfig {
            timeout_ms: 200,
            ..PoolConfig::new("127.0.0.1", 1)
        })
        .unwrap();
        assert!(factory.connect().await.is_err());
    }
}
