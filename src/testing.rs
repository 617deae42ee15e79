//! Fake collaborators for unit tests.
//!
//! Each fake is cheap to clone; clones share their recorded calls so a test
//! can keep one copy and hand the other to the code under test.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::discovery::SourceDiscovery;
use crate::extract::{ExtractionOracle, FetchedPage, OracleVerdict, PageFetcher, ProductFields};
use crate::store::{MemoryTaskStore, StoreError, TaskStore};
use crate::task::{TaskId, TaskRecord, TaskStatus};

const PRODUCT_PAGE: &str = "<html><body><h1>Product</h1><p>In stock</p></body></html>";

// =============================================================================
// Discovery
// =============================================================================

#[derive(Clone, Default)]
pub struct FakeDiscovery {
    urls: Vec<String>,
    delay: Option<Duration>,
    panics: bool,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeDiscovery {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    /// `(query, region)` of every call.
    pub fn calls(&self) -> Arc<Mutex<Vec<(String, String)>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl SourceDiscovery for FakeDiscovery {
    async fn discover(&self, query: &str, region: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), region.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panics {
            panic!("discovery exploded");
        }
        self.urls.clone()
    }
}

// =============================================================================
// Fetcher
// =============================================================================

#[derive(Clone)]
enum FetchBehavior {
    Fail(String),
    Empty,
    Delay(Duration),
}

/// Serves a small product page for every URL unless told otherwise.
#[derive(Clone, Default)]
pub struct FakeFetcher {
    behaviors: HashMap<String, FetchBehavior>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, url: impl Into<String>, error: impl Into<String>) -> Self {
        self.behaviors.insert(url.into(), FetchBehavior::Fail(error.into()));
        self
    }

    /// Serve a page whose body has no visible text.
    pub fn empty(mut self, url: impl Into<String>) -> Self {
        self.behaviors.insert(url.into(), FetchBehavior::Empty);
        self
    }

    pub fn delayed(mut self, url: impl Into<String>, delay: Duration) -> Self {
        self.behaviors.insert(url.into(), FetchBehavior::Delay(delay));
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<FetchedPage> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.behaviors.get(url).cloned() {
            Some(FetchBehavior::Fail(error)) => anyhow::bail!("{}", error),
            Some(FetchBehavior::Empty) => Ok(FetchedPage::from_html(
                url,
                "<html><body><script>x()</script></body></html>",
            )),
            Some(FetchBehavior::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(FetchedPage::from_html(url, PRODUCT_PAGE))
            }
            None => Ok(FetchedPage::from_html(url, PRODUCT_PAGE)),
        }
    }
}

// =============================================================================
// Oracle
// =============================================================================

#[derive(Clone)]
enum OracleBehavior {
    Verdict(OracleVerdict),
    Error(String),
    Panic,
}

/// Answers per page URL; "no relevant product" for anything unscripted.
#[derive(Clone, Default)]
pub struct FakeOracle {
    behaviors: HashMap<String, OracleBehavior>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verdict(mut self, url: impl Into<String>, verdict: OracleVerdict) -> Self {
        self.behaviors.insert(url.into(), OracleBehavior::Verdict(verdict));
        self
    }

    pub fn with_product(
        self,
        url: impl Into<String>,
        name: &str,
        price: f64,
        currency: &str,
    ) -> Self {
        self.with_verdict(
            url,
            OracleVerdict::Product(ProductFields {
                product_name: name.to_string(),
                price,
                currency: currency.to_string(),
            }),
        )
    }

    pub fn erroring(mut self, url: impl Into<String>, error: impl Into<String>) -> Self {
        self.behaviors.insert(url.into(), OracleBehavior::Error(error.into()));
        self
    }

    pub fn panicking(mut self, url: impl Into<String>) -> Self {
        self.behaviors.insert(url.into(), OracleBehavior::Panic);
        self
    }

    /// URLs of every judged page.
    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl ExtractionOracle for FakeOracle {
    async fn judge(&self, page: &FetchedPage, _query: &str) -> anyhow::Result<OracleVerdict> {
        self.calls.lock().unwrap().push(page.url.clone());
        match self.behaviors.get(&page.url).cloned() {
            Some(OracleBehavior::Verdict(verdict)) => Ok(verdict),
            Some(OracleBehavior::Error(error)) => anyhow::bail!("{}", error),
            Some(OracleBehavior::Panic) => panic!("oracle exploded on {}", page.url),
            None => Ok(OracleVerdict::NoRelevantProduct),
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// Which puts a [`FlakyStore`] rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutFailure {
    Never,
    All,
    /// Completed and failed records.
    Terminal,
    Completed,
}

/// Memory store that can be told to reject writes. Records every put
/// attempt as `(id, status label, ttl)`.
pub struct FlakyStore {
    inner: MemoryTaskStore,
    failure: PutFailure,
    puts: Mutex<Vec<(TaskId, &'static str, Duration)>>,
}

impl FlakyStore {
    pub fn new(failure: PutFailure) -> Self {
        Self {
            inner: MemoryTaskStore::new(),
            failure,
            puts: Mutex::new(Vec::new()),
        }
    }

    pub fn puts(&self) -> Vec<(TaskId, &'static str, Duration)> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskStore for FlakyStore {
    async fn put(&self, id: TaskId, record: &TaskRecord, ttl: Duration) -> Result<(), StoreError> {
        self.puts
            .lock()
            .unwrap()
            .push((id, record.status.label(), ttl));
        let reject = match self.failure {
            PutFailure::Never => false,
            PutFailure::All => true,
            PutFailure::Terminal => record.status.is_terminal(),
            PutFailure::Completed => matches!(record.status, TaskStatus::Completed(_)),
        };
        if reject {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        self.inner.put(id, record, ttl).await
    }

    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        self.inner.get(id).await
    }
}
