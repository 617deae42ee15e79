//! Combine per-source outcomes into the final offer list.

use thiserror::Error;

use crate::extract::ExtractionOutcome;
use crate::task::ProductCandidate;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("no source produced a valid candidate")]
    NoValidResults,
}

/// Keep the found candidates and order them by ascending price.
///
/// Absent and failed outcomes are dropped. Offers with equal prices keep the
/// order of `outcomes`.
pub fn aggregate(
    outcomes: Vec<ExtractionOutcome>,
) -> Result<Vec<ProductCandidate>, AggregationError> {
    let mut offers: Vec<ProductCandidate> = outcomes
        .into_iter()
        .filter_map(ExtractionOutcome::into_candidate)
        .collect();

    if offers.is_empty() {
        return Err(AggregationError::NoValidResults);
    }

    // `sort_by` is stable
    offers.sort_by(|a, b| a.price.total_cmp(&b.price));
    Ok(offers)
}
