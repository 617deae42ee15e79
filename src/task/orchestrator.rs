//! Task orchestration: submission, the background pipeline, terminal writes.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;

use super::record::{ProductCandidate, Query, TaskId, TaskRecord, TaskStatus};
use crate::aggregate::aggregate;
use crate::discovery::SourceDiscovery;
use crate::extract::{panic_message, ExtractionStatsSnapshot, Extractor};
use crate::store::{SharedTaskStore, StoreError};

/// Why a pipeline ended in `Failed`. The display text is what clients see.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("No sources found: could not find any potential sources for the given query.")]
    NoSourcesFound,
    #[error(
        "No valid results: could not extract valid product information from any of the \
         discovered sources; they may be blocked or not be standard e-commerce pages."
    )]
    NoValidResults,
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Retention window of a task, counted from submission.
    pub ttl: Duration,
    /// Pipelines allowed to run at once. Extra tasks stay pending until a
    /// slot frees up.
    pub max_concurrent_tasks: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(crate::config::DEFAULT_TASK_TTL_SECS),
            max_concurrent_tasks: crate::config::DEFAULT_MAX_CONCURRENT_TASKS,
        }
    }
}

/// Lifetime task counters.
#[derive(Debug, Default)]
pub struct TaskCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCountersSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub in_flight: u64,
}

/// Handle to a submitted task.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    join: JoinHandle<TaskStatus>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Wait for the pipeline to end. Returns the terminal status it
    /// produced, or `None` if the worker was torn down.
    pub async fn finished(self) -> Option<TaskStatus> {
        self.join.await.ok()
    }
}

/// Owns the task lifecycle. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    discovery: Arc<dyn SourceDiscovery>,
    extractor: Extractor,
    store: SharedTaskStore,
    ttl: Duration,
    permits: Semaphore,
    tracker: TaskTracker,
    counters: TaskCounters,
}

impl Orchestrator {
    pub fn new(
        discovery: Arc<dyn SourceDiscovery>,
        extractor: Extractor,
        store: SharedTaskStore,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                discovery,
                extractor,
                store,
                ttl: settings.ttl,
                permits: Semaphore::new(settings.max_concurrent_tasks.max(1)),
                tracker: TaskTracker::new(),
                counters: TaskCounters::default(),
            }),
        }
    }

    /// Register a task and start its pipeline in the background.
    ///
    /// The pending record is stored before this returns. If that write
    /// fails nothing is spawned.
    pub async fn submit(&self, query: Query) -> Result<TaskHandle, StoreError> {
        let id = TaskId::new();
        let record = TaskRecord::pending(id);
        let created = Instant::now();

        self.inner.store.put(id, &record, self.inner.ttl).await?;
        self.inner.counters.submitted.fetch_add(1, Ordering::Relaxed);
        tracing::info!(task_id = %id, query = %query.text, region = %query.region, "Task submitted");

        let inner = Arc::clone(&self.inner);
        let join = self
            .inner
            .tracker
            .spawn(async move { inner.run(record, query, created).await });

        Ok(TaskHandle { id, join })
    }

    /// Current record of a task, `None` when unknown or expired.
    pub async fn status(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        self.inner.store.get(id).await
    }

    pub fn counters(&self) -> TaskCountersSnapshot {
        let c = &self.inner.counters;
        TaskCountersSnapshot {
            submitted: c.submitted.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            in_flight: self.inner.tracker.len() as u64,
        }
    }

    pub fn extraction_stats(&self) -> ExtractionStatsSnapshot {
        self.inner.extractor.stats().snapshot()
    }

    /// Close the worker tracker and wait up to `grace` for running pipelines.
    /// Returns whether everything finished in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.inner.tracker.close();
        let pending = self.inner.tracker.len();
        if pending > 0 {
            tracing::info!("Waiting for {} in-flight task(s)", pending);
        }
        tokio::time::timeout(grace, self.inner.tracker.wait())
            .await
            .is_ok()
    }
}

impl Inner {
    async fn run(&self, pending: TaskRecord, query: Query, created: Instant) -> TaskStatus {
        // The semaphore is never closed.
        let _permit = self.permits.acquire().await.ok();

        let status = match AssertUnwindSafe(self.pipeline(pending.id, &query))
            .catch_unwind()
            .await
        {
            Ok(Ok(offers)) => TaskStatus::Completed(offers),
            Ok(Err(e)) => TaskStatus::Failed(e.to_string()),
            Err(panic) => {
                let msg = panic_message(panic.as_ref());
                tracing::error!(task_id = %pending.id, panic = %msg, "Pipeline panicked");
                TaskStatus::Failed(
                    PipelineError::Internal(format!("pipeline panicked: {}", msg)).to_string(),
                )
            }
        };

        let status = self.finish(&pending, status, created).await;
        match &status {
            TaskStatus::Completed(_) => self.counters.completed.fetch_add(1, Ordering::Relaxed),
            _ => self.counters.failed.fetch_add(1, Ordering::Relaxed),
        };
        status
    }

    async fn pipeline(
        &self,
        id: TaskId,
        query: &Query,
    ) -> Result<Vec<ProductCandidate>, PipelineError> {
        let urls = self.discovery.discover(&query.text, &query.region).await;
        if urls.is_empty() {
            return Err(PipelineError::NoSourcesFound);
        }
        tracing::debug!(task_id = %id, sources = urls.len(), "Extracting from sources");

        let outcomes = join_all(
            urls.iter()
                .map(|url| self.extractor.extract(url, &query.text)),
        )
        .await;

        aggregate(outcomes).map_err(|_| PipelineError::NoValidResults)
    }

    /// Write the terminal record inside what is left of the retention window.
    ///
    /// Returns the status actually written (or meant to be written).
    async fn finish(&self, pending: &TaskRecord, status: TaskStatus, created: Instant) -> TaskStatus {
        let id = pending.id;
        match &status {
            TaskStatus::Completed(offers) => {
                tracing::info!(task_id = %id, offers = offers.len(), "Task completed")
            }
            TaskStatus::Failed(reason) => tracing::warn!(task_id = %id, %reason, "Task failed"),
            TaskStatus::Pending => {}
        }

        if let Err(e) = self.write_terminal(pending, &status, created).await {
            tracing::error!(task_id = %id, error = %e, "Failed to store task result");
            if !matches!(status, TaskStatus::Completed(_)) {
                return status;
            }
            let fallback = TaskStatus::Failed(format!("Failed to persist search results: {}", e));
            if let Err(e) = self.write_terminal(pending, &fallback, created).await {
                tracing::error!(task_id = %id, error = %e, "Failed to store task failure");
            }
            return fallback;
        }
        status
    }

    async fn write_terminal(
        &self,
        pending: &TaskRecord,
        status: &TaskStatus,
        created: Instant,
    ) -> Result<(), StoreError> {
        let remaining = self.ttl.saturating_sub(created.elapsed());
        if remaining.is_zero() {
            tracing::warn!(task_id = %pending.id, "Retention window elapsed, dropping result");
            return Ok(());
        }
        let record = pending
            .transition(status.clone())
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        self.store.put(pending.id, &record, remaining).await
    }
}
