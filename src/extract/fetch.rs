//! Page fetching and HTML cleanup.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};

/// Maximum characters of cleaned body HTML handed to the oracle.
pub const MAX_BODY_CHARS: usize = 50_000;

/// Subtrees that never carry the product offer.
const NOISE_SELECTORS: &[&str] = &["script", "style", "nav", "footer", "header", "svg", "iframe"];

/// A fetched and cleaned page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    /// Cleaned `<body>` HTML, truncated to [`MAX_BODY_CHARS`].
    pub body_html: String,
    /// Whether the body has any visible text left after cleanup.
    pub has_text: bool,
}

impl FetchedPage {
    /// Clean raw HTML into a page.
    pub fn from_html(url: impl Into<String>, raw_html: &str) -> Self {
        let (body_html, has_text) = clean_html(raw_html);
        Self {
            url: url.into(),
            body_html,
            has_text,
        }
    }
}

/// Fetches raw page content.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

/// Fetcher over plain HTTP with a browser-like user agent.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        // Browser-like User-Agent; many retailers reject obvious bots
        let user_agent = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("en-US,en;q=0.5"),
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {} for {}", status, url);
        }

        let html = response
            .text()
            .await
            .context("Failed to read response body")?;

        Ok(FetchedPage::from_html(url, &html))
    }
}

/// Strip noise subtrees and keep the `<body>`.
///
/// Returns the truncated body HTML and whether any visible text remains.
pub fn clean_html(raw_html: &str) -> (String, bool) {
    let mut document = Html::parse_document(raw_html);

    let mut noise = Vec::new();
    for selector_str in NOISE_SELECTORS {
        if let Ok(selector) = Selector::parse(selector_str) {
            noise.extend(document.select(&selector).map(|el| (*el).id()));
        }
    }
    for id in noise {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    let Ok(body_selector) = Selector::parse("body") else {
        return (String::new(), false);
    };
    let Some(body) = document.select(&body_selector).next() else {
        return (String::new(), false);
    };

    let has_text = body.text().any(|t| !t.trim().is_empty());
    let html: String = body.html().chars().take(MAX_BODY_CHARS).collect();
    (html, has_text)
}
