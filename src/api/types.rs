//! API request and response types.

use serde::{Deserialize, Serialize};

use crate::extract::ExtractionStatsSnapshot;
use crate::task::{ProductCandidate, TaskCountersSnapshot, TaskId, TaskStatus};

/// Request to start a price search.
#[derive(Debug, Clone, Deserialize)]
pub struct StartSearchRequest {
    /// What to look for, e.g. "red sneakers"
    #[serde(default)]
    pub query: String,
    /// Region code used to bias discovery, e.g. "US"
    #[serde(default)]
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSearchResponse {
    pub task_id: TaskId,
}

/// One ranked offer as clients see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub link: String,
    pub price: f64,
    pub currency: String,
    #[serde(rename = "productName")]
    pub product_name: String,
}

impl From<ProductCandidate> for Offer {
    fn from(c: ProductCandidate) -> Self {
        Self {
            link: c.source_url,
            price: c.price,
            currency: c.currency,
            product_name: c.name,
        }
    }
}

/// Payload of a status response: offers when completed, a reason when failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchData {
    Offers(Vec<Offer>),
    Reason(String),
}

/// `{"status": ..., "data": ...}`; `data` is `null` while pending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchStatusResponse {
    pub status: &'static str,
    pub data: Option<SearchData>,
}

impl From<TaskStatus> for SearchStatusResponse {
    fn from(status: TaskStatus) -> Self {
        let label = status.label();
        let data = match status {
            TaskStatus::Pending => None,
            TaskStatus::Completed(offers) => Some(SearchData::Offers(
                offers.into_iter().map(Offer::from).collect(),
            )),
            TaskStatus::Failed(reason) => Some(SearchData::Reason(reason)),
        };
        Self {
            status: label,
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Lifetime task and per-source extraction counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub tasks: TaskCountersSnapshot,
    pub extraction: ExtractionStatsSnapshot,
}
