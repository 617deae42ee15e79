//! Task records and the values they carry.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an id received over the wire.
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(Self)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("query text cannot be empty")]
    EmptyText,
    #[error("region cannot be empty")]
    EmptyRegion,
}

/// A free-text product query biased towards a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    /// Short locale code, e.g. "US" or "in".
    pub region: String,
}

impl Query {
    pub fn new(text: impl Into<String>, region: impl Into<String>) -> Result<Self, QueryError> {
        let text = text.into().trim().to_string();
        let region = region.into().trim().to_string();
        if text.is_empty() {
            return Err(QueryError::EmptyText);
        }
        if region.is_empty() {
            return Err(QueryError::EmptyRegion);
        }
        Ok(Self { text, region })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CandidateError {
    #[error("price {0} is not a finite non-negative number")]
    InvalidPrice(f64),
    #[error("currency {0:?} is not a 3-letter uppercase code")]
    InvalidCurrency(String),
}

/// A product offer extracted from one source page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCandidate {
    pub source_url: String,
    pub name: String,
    pub price: f64,
    pub currency: String,
}

impl ProductCandidate {
    /// Build a candidate, rejecting invalid prices and currency codes.
    pub fn new(
        source_url: impl Into<String>,
        name: impl Into<String>,
        price: f64,
        currency: impl Into<String>,
    ) -> Result<Self, CandidateError> {
        if !price.is_finite() || price < 0.0 {
            return Err(CandidateError::InvalidPrice(price));
        }
        // -0.0 passes the check above; store it as 0.0
        let price = if price == 0.0 { 0.0 } else { price };
        let currency = currency.into();
        if !is_currency_code(&currency) {
            return Err(CandidateError::InvalidCurrency(currency));
        }
        Ok(Self {
            source_url: source_url.into(),
            name: name.into(),
            price,
            currency,
        })
    }
}

fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

/// Status of a task and its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Pending,
    /// Offers sorted by ascending price.
    Completed(Vec<ProductCandidate>),
    /// Human-readable failure reason.
    Failed(String),
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed(_) => "completed",
            TaskStatus::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("task {id} is already {from} and cannot become {to}")]
pub struct TransitionError {
    pub id: TaskId,
    pub from: &'static str,
    pub to: &'static str,
}

/// The stored state of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "StoredRecord", try_from = "StoredRecord")]
pub struct TaskRecord {
    pub id: TaskId,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// A fresh pending record.
    pub fn pending(id: TaskId) -> Self {
        Self {
            id,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Move a pending record to a terminal status.
    ///
    /// Terminal records never change again, and a record cannot be moved back
    /// to pending.
    pub fn transition(&self, status: TaskStatus) -> Result<Self, TransitionError> {
        if self.status.is_terminal() || !status.is_terminal() {
            return Err(TransitionError {
                id: self.id,
                from: self.status.label(),
                to: status.label(),
            });
        }
        Ok(Self {
            id: self.id,
            status,
            created_at: self.created_at,
            finished_at: Some(Utc::now()),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StoredStatus {
    Pending,
    Completed,
    Failed,
}

/// Flat persisted form of a [`TaskRecord`].
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    id: TaskId,
    status: StoredStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Vec<ProductCandidate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
}

impl From<TaskRecord> for StoredRecord {
    fn from(record: TaskRecord) -> Self {
        let (status, result, error) = match record.status {
            TaskStatus::Pending => (StoredStatus::Pending, None, None),
            TaskStatus::Completed(offers) => (StoredStatus::Completed, Some(offers), None),
            TaskStatus::Failed(reason) => (StoredStatus::Failed, None, Some(reason)),
        };
        Self {
            id: record.id,
            status,
            result,
            error,
            created_at: record.created_at,
            finished_at: record.finished_at,
        }
    }
}

impl TryFrom<StoredRecord> for TaskRecord {
    type Error = String;

    fn try_from(stored: StoredRecord) -> Result<Self, Self::Error> {
        let status = match stored.status {
            StoredStatus::Pending => TaskStatus::Pending,
            StoredStatus::Completed => TaskStatus::Completed(
                stored
                    .result
                    .ok_or_else(|| format!("completed task {} has no result", stored.id))?,
            ),
            StoredStatus::Failed => TaskStatus::Failed(stored.error.unwrap_or_default()),
        };
        Ok(Self {
            id: stored.id,
            status,
            created_at: stored.created_at,
            finished_at: stored.finished_at,
        })
    }
}
