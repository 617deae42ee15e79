//! Redis task store.
//!
//! Each record is stored as a JSON string under `{prefix}:task:{id}` and
//! written with `SET ... PX <ttl>`, so Redis itself enforces retention.

use std::time::Duration;

use ::redis::aio::MultiplexedConnection;
use ::redis::AsyncCommands;
use async_trait::async_trait;

use super::{StoreError, TaskStore};
use crate::task::{TaskId, TaskRecord};

/// Task store backed by Redis.
///
/// Holds a [`MultiplexedConnection`]; clones share one TCP connection, so
/// each call clones it for concurrent use.
#[derive(Clone)]
pub struct RedisTaskStore {
    conn: MultiplexedConnection,
    key_prefix: String,
}

impl RedisTaskStore {
    /// Connect to Redis at `url` (`redis://[:<password>@]<host>:<port>[/<db>]`).
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let client = ::redis::Client::open(url)
            .map_err(|e| StoreError::Unavailable(format!("invalid Redis URL: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to connect to Redis: {e}")))?;
        Ok(Self {
            conn,
            key_prefix: "price-scout".to_string(),
        })
    }

    /// Use a custom key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn task_key(&self, id: TaskId) -> String {
        format!("{}:task:{}", self.key_prefix, id)
    }
}

fn map_redis_error(err: ::redis::RedisError, key: &str) -> StoreError {
    StoreError::Unavailable(format!("Redis error for key {key}: {err}"))
}

#[async_trait]
impl TaskStore for RedisTaskStore {
    async fn put(&self, id: TaskId, record: &TaskRecord, ttl: Duration) -> Result<(), StoreError> {
        let key = self.task_key(id);
        let data = serde_json::to_string(record)?;
        // PX rejects 0
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let mut conn = self.conn.clone();
        let _: () = ::redis::cmd("SET")
            .arg(&key)
            .arg(data)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error(e, &key))?;
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        let key = self.task_key(id);
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(&key).await.map_err(|e| map_redis_error(e, &key))?;
        match raw {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }
}
