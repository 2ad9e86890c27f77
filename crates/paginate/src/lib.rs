//! Pagination driver.
//!
//! Walks an [`Upstream`] page by page, retrying transient failures a fixed
//! number of times, and accumulates normalized records in server order.
//! `ScrapeSession` holds the state a caller keeps between operations.

use std::time::Duration;

use physdir_model::{Dataset, PageResult, SearchQuery};
use physdir_npi::{enrich, NpiLookup};
use physdir_upstream::{Upstream, UpstreamError};
use thiserror::Error;

/// A failed fetch; partial results are not kept.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to fetch page {page}: {source}")]
    Page { page: u32, source: UpstreamError },
}

impl FetchError {
    pub fn page(&self) -> u32 {
        match self {
            Self::Page { page, .. } => *page,
        }
    }
}

/// Retry and pacing policy for page requests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per page, including the first
    pub max_attempts: u32,
    /// Pause between attempts after a transient failure
    pub retry_delay: Duration,
    /// Pause between consecutive pages
    pub page_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            page_delay: Duration::from_millis(100),
        }
    }
}

/// Fetch one page, retrying transient failures up to `max_attempts` calls.
pub async fn fetch_page_with_retry<U: Upstream>(
    upstream: &U,
    query: &SearchQuery,
    page: u32,
    page_size: u32,
    policy: &RetryPolicy,
) -> Result<PageResult, UpstreamError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match upstream.fetch_page(query, page, page_size).await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    upstream = upstream.name(),
                    page,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Page request failed, retrying"
                );
                tokio::time::sleep(policy.retry_delay).await;
            }
            Err(e) => {
                tracing::error!(
                    upstream = upstream.name(),
                    page,
                    attempt,
                    error = %e,
                    "Page request failed permanently"
                );
                return Err(e);
            }
        }
    }
}

/// Fetch every page of a query.
///
/// Stops when the accumulated count reaches the reported total, when a page
/// comes back shorter than `page_size`, or when a page is empty. Every record
/// received is kept, even past the reported total. Any page failure fails the
/// whole run.
pub async fn fetch_all<U: Upstream>(
    upstream: &U,
    query: &SearchQuery,
    page_size: u32,
    policy: &RetryPolicy,
) -> Result<Dataset, FetchError> {
    let mut page = 1u32;
    let mut records = Vec::new();
    let mut total_available: Option<u64> = None;

    loop {
        let result = fetch_page_with_retry(upstream, query, page, page_size, policy)
            .await
            .map_err(|source| FetchError::Page { page, source })?;

        let total = *total_available.get_or_insert(result.total_available);
        if result.is_empty() {
            tracing::debug!(page, "Upstream returned an empty page");
            break;
        }
        if page == 1 {
            tracing::info!(total, page_size, "Starting full download");
        }

        let page_record_count = result.page_record_count;
        records.extend(result.records);
        tracing::info!(page, fetched = records.len(), total, "Fetched page");

        if records.len() as u64 >= total || page_record_count < page_size as usize {
            break;
        }

        page += 1;
        tokio::time::sleep(policy.page_delay).await;
    }

    Ok(Dataset {
        records,
        total_available: total_available.unwrap_or(0),
    })
}

/// Number of pages needed to cover `total` records.
pub fn page_count(total: u64, page_size: u32) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size as u64)
}

/// Caller-owned scrape state: the last page viewed and the last full download.
pub struct ScrapeSession<U> {
    upstream: U,
    query: SearchQuery,
    policy: RetryPolicy,
    current_page: Option<(u32, PageResult)>,
    dataset: Option<Dataset>,
    total_available: Option<u64>,
}

impl<U: Upstream> ScrapeSession<U> {
    pub fn new(upstream: U, query: SearchQuery) -> Self {
        Self {
            upstream,
            query,
            policy: RetryPolicy::default(),
            current_page: None,
            dataset: None,
            total_available: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    /// Fetch a single page and make it the current page.
    pub async fn load_page(&mut self, page: u32, page_size: u32) -> Result<&PageResult, FetchError> {
        let result =
            fetch_page_with_retry(&self.upstream, &self.query, page, page_size, &self.policy)
                .await
                .map_err(|source| FetchError::Page { page, source })?;

        if !result.is_empty() {
            self.total_available = Some(result.total_available);
        }
        let (_, stored) = self.current_page.insert((page, result));
        Ok(&*stored)
    }

    /// Download the full dataset. On failure the previous dataset is kept.
    pub async fn download_all(&mut self, page_size: u32) -> Result<&Dataset, FetchError> {
        let dataset = fetch_all(&self.upstream, &self.query, page_size, &self.policy).await?;
        self.total_available = Some(dataset.total_available);
        Ok(&*self.dataset.insert(dataset))
    }

    /// Attach NPI numbers to the downloaded dataset, if there is one.
    pub async fn enrich_dataset<L: NpiLookup>(
        &mut self,
        lookup: &L,
        concurrency: usize,
    ) -> Option<&Dataset> {
        let dataset = self.dataset.as_ref()?;
        let total_available = dataset.total_available;
        let records = enrich(dataset.records.clone(), lookup, concurrency).await;
        Some(&*self.dataset.insert(Dataset {
            records,
            total_available,
        }))
    }

    pub fn current_page(&self) -> Option<&PageResult> {
        self.current_page.as_ref().map(|(_, page)| page)
    }

    pub fn current_page_number(&self) -> Option<u32> {
        self.current_page.as_ref().map(|(number, _)| *number)
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    /// Total reported by the most recent successful request.
    pub fn total_available(&self) -> Option<u64> {
        self.total_available
    }
}
