//! In-process task store.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{StoreError, TaskStore};
use crate::task::{TaskId, TaskRecord};

#[derive(Debug, Clone)]
struct Entry {
    record: TaskRecord,
    expires_at: Instant,
}

/// Task store backed by a `HashMap`.
///
/// Expired entries are hidden from `get` immediately and dropped lazily, or
/// in bulk by [`purge_expired`](Self::purge_expired).
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    entries: RwLock<HashMap<TaskId, Entry>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    /// Number of entries currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Periodically purge expired entries until the store is dropped.
    pub fn spawn_sweeper(store: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = weak.upgrade() else {
                    break;
                };
                let removed = store.purge_expired().await;
                if removed > 0 {
                    tracing::debug!("Purged {} expired task records", removed);
                }
            }
        })
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn put(&self, id: TaskId, record: &TaskRecord, ttl: Duration) -> Result<(), StoreError> {
        let entry = Entry {
            record: record.clone(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(id, entry);
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(&id) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.record.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: drop it unless a fresh put raced in.
        let mut entries = self.entries.write().await;
        if entries.get(&id).is_some_and(|e| e.expires_at <= now) {
            entries.remove(&id);
        }
        Ok(None)
    }
}
