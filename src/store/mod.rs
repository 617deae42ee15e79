//! Task record persistence.
//!
//! The [`TaskStore`] trait is a passive ledger keyed by [`TaskId`]. Every
//! `put` carries a time-to-live; once it has elapsed `get` returns `None`,
//! which callers cannot tell apart from a task that never existed.
//!
//! Stores hold no task semantics. The orchestrator decides what is written
//! and when.

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryTaskStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisTaskStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::task::{TaskId, TaskRecord};

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation.
    #[error("task store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be encoded or decoded.
    #[error("task record encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Key/value store for task records with per-entry expiry.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Store `record` under `id`, replacing any previous value. The entry
    /// expires `ttl` after this call.
    async fn put(&self, id: TaskId, record: &TaskRecord, ttl: Duration) -> Result<(), StoreError>;

    /// Fetch the live record for `id`.
    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError>;
}

pub type SharedTaskStore = Arc<dyn TaskStore>;

/// Build the store selected by configuration.
///
/// Falls back to the in-memory store when no Redis URL is configured. The
/// in-memory store gets a background sweeper for expired entries.
pub async fn connect(redis_url: Option<&str>) -> anyhow::Result<SharedTaskStore> {
    match redis_url {
        #[cfg(feature = "redis")]
        Some(url) => {
            let store = RedisTaskStore::new(url).await?;
            tracing::info!("Task store: redis");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => anyhow::bail!("REDIS_URL requires the `redis` feature"),
        None => {
            let store = Arc::new(MemoryTaskStore::new());
            MemoryTaskStore::spawn_sweeper(&store, Duration::from_secs(60));
            tracing::info!("Task store: in-memory");
            Ok(store)
        }
    }
}
