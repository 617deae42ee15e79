//! Extraction adapter: turn one source URL into at most one product offer.
//!
//! Every per-source failure stops here. The adapter reports an
//! [`ExtractionOutcome`] and never returns an error to the orchestrator:
//! - fetch errors, timeouts, panics and invalid offers are `Failed`
//! - pages without body text or without a relevant product are `Absent`
//! - oracle replies that break the contract are `Absent` too, but logged and
//!   counted separately
//!
//! Nothing is retried.

mod fetch;
mod oracle;
mod stats;

pub use fetch::{clean_html, FetchedPage, HttpFetcher, PageFetcher, MAX_BODY_CHARS};
pub use oracle::{interpret_reply, ExtractionOracle, LlmOracle, OracleVerdict, ProductFields};
pub use stats::{ExtractionStats, ExtractionStatsSnapshot};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;

use crate::task::{CandidateError, ProductCandidate};

/// Why a source produced no candidate without failing.
#[derive(Debug, Clone, PartialEq)]
pub enum AbsentReason {
    /// The page had no meaningful body content.
    NotProductPage,
    /// The oracle said the page has no relevant product.
    NoRelevantProduct,
    /// The oracle reply broke the contract; treated as absent.
    MalformedOracleOutput(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionError {
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("oracle failed: {0}")]
    Oracle(String),
    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid candidate: {0}")]
    InvalidCandidate(#[from] CandidateError),
    #[error("extraction panicked: {0}")]
    Panicked(String),
}

/// Result of extracting from one source.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Found(ProductCandidate),
    Absent(AbsentReason),
    Failed(ExtractionError),
}

impl ExtractionOutcome {
    pub fn into_candidate(self) -> Option<ProductCandidate> {
        match self {
            ExtractionOutcome::Found(candidate) => Some(candidate),
            _ => None,
        }
    }
}

/// Fetch + oracle pipeline for a single source.
pub struct Extractor {
    fetcher: Arc<dyn PageFetcher>,
    oracle: Arc<dyn ExtractionOracle>,
    timeout: Duration,
    stats: Arc<ExtractionStats>,
}

impl Extractor {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        oracle: Arc<dyn ExtractionOracle>,
        timeout: Duration,
        stats: Arc<ExtractionStats>,
    ) -> Self {
        Self {
            fetcher,
            oracle,
            timeout,
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<ExtractionStats> {
        &self.stats
    }

    /// Extract a candidate from `url` for `query`.
    ///
    /// The whole attempt is bounded by the extractor's timeout.
    pub async fn extract(&self, url: &str, query: &str) -> ExtractionOutcome {
        let attempt = AssertUnwindSafe(self.attempt(url, query)).catch_unwind();
        let outcome = match tokio::time::timeout(self.timeout, attempt).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(panic)) => {
                ExtractionOutcome::Failed(ExtractionError::Panicked(panic_message(panic.as_ref())))
            }
            Err(_) => ExtractionOutcome::Failed(ExtractionError::Timeout(self.timeout)),
        };

        match &outcome {
            ExtractionOutcome::Found(c) => {
                tracing::info!(url, price = c.price, currency = %c.currency, "Extracted product");
            }
            ExtractionOutcome::Absent(AbsentReason::MalformedOracleOutput(why)) => {
                tracing::warn!(url, reason = %why, "Oracle returned malformed output, skipping source");
            }
            ExtractionOutcome::Absent(reason) => {
                tracing::info!(url, ?reason, "No product on source");
            }
            ExtractionOutcome::Failed(e) => {
                tracing::warn!(url, error = %e, "Extraction failed");
            }
        }
        self.stats.record(&outcome);
        outcome
    }

    async fn attempt(&self, url: &str, query: &str) -> ExtractionOutcome {
        tracing::debug!("Processing URL: {}", url);

        let page = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => return ExtractionOutcome::Failed(ExtractionError::Fetch(format!("{:#}", e))),
        };
        if !page.has_text {
            return ExtractionOutcome::Absent(AbsentReason::NotProductPage);
        }

        let verdict = match self.oracle.judge(&page, query).await {
            Ok(verdict) => verdict,
            Err(e) => {
                return ExtractionOutcome::Failed(ExtractionError::Oracle(format!("{:#}", e)))
            }
        };

        match verdict {
            OracleVerdict::NoRelevantProduct => {
                ExtractionOutcome::Absent(AbsentReason::NoRelevantProduct)
            }
            OracleVerdict::Malformed(why) => {
                ExtractionOutcome::Absent(AbsentReason::MalformedOracleOutput(why))
            }
            OracleVerdict::Product(fields) => {
                match ProductCandidate::new(url, fields.product_name, fields.price, fields.currency) {
                    Ok(candidate) => ExtractionOutcome::Found(candidate),
                    Err(e) => ExtractionOutcome::Failed(e.into()),
                }
            }
        }
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
