//! Process-wide extraction outcome counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::{AbsentReason, ExtractionOutcome};

/// Counts per-source outcomes so operators can tell "no product on the
/// page" apart from "oracle returned garbage".
#[derive(Debug, Default)]
pub struct ExtractionStats {
    found: AtomicU64,
    not_product_page: AtomicU64,
    no_relevant_product: AtomicU64,
    malformed: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`ExtractionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStatsSnapshot {
    pub found: u64,
    pub not_product_page: u64,
    pub no_relevant_product: u64,
    pub malformed: u64,
    pub failed: u64,
}

impl ExtractionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: &ExtractionOutcome) {
        let counter = match outcome {
            ExtractionOutcome::Found(_) => &self.found,
            ExtractionOutcome::Absent(AbsentReason::NotProductPage) => &self.not_product_page,
            ExtractionOutcome::Absent(AbsentReason::NoRelevantProduct) => &self.no_relevant_product,
            ExtractionOutcome::Absent(AbsentReason::MalformedOracleOutput(_)) => &self.malformed,
            ExtractionOutcome::Failed(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ExtractionStatsSnapshot {
        ExtractionStatsSnapshot {
            found: self.found.load(Ordering::Relaxed),
            not_product_page: self.not_product_page.load(Ordering::Relaxed),
            no_relevant_product: self.no_relevant_product.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
