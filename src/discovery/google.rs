use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{sanitize_links, SourceDiscovery};

const CUSTOM_SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// Google Programmable Search (Custom Search JSON API) discovery.
pub struct GoogleSearchDiscovery {
    client: reqwest::Client,
    api_key: String,
    engine_id: String,
    max_results: usize,
    endpoint: String,
}

/// Custom Search API response (only the fields we use)
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    link: Option<String>,
}

impl GoogleSearchDiscovery {
    pub fn new(api_key: String, engine_id: String, max_results: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            engine_id,
            max_results,
            endpoint: CUSTOM_SEARCH_URL.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn search(&self, query: &str, region: &str) -> Result<Vec<String>> {
        let q = format!("buy {}", query);
        let gl = region.to_lowercase();
        // The API caps `num` at 10.
        let num = self.max_results.clamp(1, 10).to_string();

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", q.as_str()),
                ("cx", self.engine_id.as_str()),
                ("key", self.api_key.as_str()),
                ("gl", gl.as_str()),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .context("Failed to send search request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Custom Search API error {}: {}", status, body);
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .context("Failed to parse search response")?;

        Ok(sanitize_links(
            parsed.items.into_iter().filter_map(|item| item.link),
            self.max_results,
        ))
    }
}

#[async_trait]
impl SourceDiscovery for GoogleSearchDiscovery {
    async fn discover(&self, query: &str, region: &str) -> Vec<String> {
        tracing::info!("Discovering sources for '{}' in region '{}'", query, region);
        match self.search(query, region).await {
            Ok(urls) => {
                tracing::info!("Found {} potential sources", urls.len());
                urls
            }
            Err(e) => {
                tracing::error!("Source discovery failed: {:#}", e);
                Vec::new()
            }
        }
    }
}
