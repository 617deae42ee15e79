//! Source discovery: find candidate retailer pages for a query.
//!
//! Discovery never fails from the caller's point of view. Provider errors
//! are logged and reported as "no sources", which the orchestrator treats as
//! a terminal condition for the task.

mod google;

pub use google::GoogleSearchDiscovery;

use async_trait::async_trait;

/// Finds candidate source URLs for a query.
#[async_trait]
pub trait SourceDiscovery: Send + Sync {
    /// Ordered candidate URLs, best first. Empty on any internal error.
    ///
    /// The order is kept downstream as the tie-break for equal prices.
    async fn discover(&self, query: &str, region: &str) -> Vec<String>;
}

/// Keep absolute http(s) links, in order, up to `max`.
pub(crate) fn sanitize_links<I>(links: I, max: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    links
        .into_iter()
        .filter(|link| match url::Url::parse(link) {
            Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
            Err(_) => {
                tracing::debug!("Skipping unparsable source link: {}", link);
                false
            }
        })
        .take(max)
        .collect()
}
