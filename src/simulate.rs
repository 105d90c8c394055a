//! Simulated paginated API
//!
//! A deterministic in-process stand-in for a remote findings API. Pages
//! are chained by opaque string tokens: a caller can only learn the token
//! for page `n + 1` by fetching page `n`.

use crate::pager::{Page, PageFetcher, PageToken};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Scrambles page indices into opaque tokens
const TOKEN_KEY: u64 = 0x5eed_c0de_f00d_cafe;

const SEVERITIES: [&str; 2] = ["CRITICAL", "HIGH"];

/// Errors reported by the simulated API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Injected failure for a page
    #[error("service unavailable while fetching page {page}")]
    Unavailable { page: usize },

    /// Token that this API never issued
    #[error("invalid continuation token '{0}'")]
    InvalidToken(String),
}

/// One record served by the simulated API
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Finding {
    pub id: String,
    pub page: usize,
    pub severity: &'static str,
    pub title: String,
}

/// Deterministic paginated API
#[derive(Debug)]
pub struct SimulatedApi {
    pages: usize,
    page_size: usize,
    latency: Duration,
    fail_at: Option<usize>,
    calls: AtomicU64,
}

impl Clone for SimulatedApi {
    fn clone(&self) -> Self {
        Self {
            pages: self.pages,
            page_size: self.page_size,
            latency: self.latency,
            fail_at: self.fail_at,
            calls: AtomicU64::new(0),
        }
    }
}

impl SimulatedApi {
    /// An API serving `pages` pages of `page_size` records
    ///
    /// With `pages == 0` the first page is empty and terminal.
    pub fn new(pages: usize, page_size: usize) -> Self {
        Self {
            pages,
            page_size,
            latency: Duration::ZERO,
            fail_at: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Sleep this long on every request
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every request for page `page`
    pub fn failing_at(mut self, page: usize) -> Self {
        self.fail_at = Some(page);
        self
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn fail_at(&self) -> Option<usize> {
        self.fail_at
    }

    /// Total records a complete fetch returns
    pub fn total_records(&self) -> usize {
        self.pages * self.page_size
    }

    /// Number of requests served so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn encode(page: usize) -> String {
        format!("{:016x}", page as u64 ^ TOKEN_KEY)
    }

    fn decode(&self, token: &str) -> Result<usize, ApiError> {
        let raw = u64::from_str_radix(token, 16)
            .map_err(|_| ApiError::InvalidToken(token.to_string()))?;
        let page = (raw ^ TOKEN_KEY) as usize;
        if page == 0 || page >= self.pages {
            return Err(ApiError::InvalidToken(token.to_string()));
        }
        Ok(page)
    }

    fn finding(page: usize, index: usize, page_size: usize) -> Finding {
        let seq = page * page_size + index;
        Finding {
            id: format!("finding-{:08}", seq),
            page,
            severity: SEVERITIES[seq % SEVERITIES.len()],
            title: format!("Control {}.{} should be enabled", page % 7 + 1, index % 13 + 1),
        }
    }
}

impl PageFetcher for SimulatedApi {
    type Record = Finding;
    type Token = String;
    type Error = ApiError;

    fn fetch_page(&self, token: &PageToken<String>) -> Result<Page<Finding, String>, ApiError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let page = match token {
            PageToken::Start => 0,
            PageToken::Resume(token) => self.decode(token)?,
        };

        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        if self.fail_at == Some(page) {
            return Err(ApiError::Unavailable { page });
        }

        if page >= self.pages {
            return Ok(Page::last(Vec::new()));
        }

        let records = (0..self.page_size)
            .map(|index| Self::finding(page, index, self.page_size))
            .collect();
        let next = (page + 1 < self.pages).then(|| Self::encode(page + 1));

        Ok(Page::new(records, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_chain_sequentially() {
        let api = SimulatedApi::new(3, 2);

        let mut token = PageToken::Start;
        let mut records = Vec::new();
        loop {
            let page = api.fetch_page(&token).unwrap();
            records.extend(page.records);
            match page.next {
                Some(next) => token = PageToken::Resume(next),
                None => break,
            }
        }

        assert_eq!(records.len(), api.total_records());
        assert_eq!(api.calls(), 3);
        assert_eq!(records[0].id, "finding-00000000");
        assert_eq!(records[5].id, "finding-00000005");
        assert_eq!(records[5].page, 2);
    }

    #[test]
    fn test_zero_pages() {
        let api = SimulatedApi::new(0, 10);
        let page = api.fetch_page(&PageToken::Start).unwrap();
        assert!(page.records.is_empty());
        assert!(page.is_last());
    }

    #[test]
    fn test_tokens_are_opaque() {
        let token = SimulatedApi::encode(1);
        assert_eq!(token.len(), 16);
        assert_ne!(token, "1");

        let api = SimulatedApi::new(4, 1);
        assert_eq!(api.decode(&token), Ok(1));
        assert!(matches!(api.decode("zz"), Err(ApiError::InvalidToken(_))));
        assert!(api.decode(&SimulatedApi::encode(9)).is_err());
    }

    #[test]
    fn test_injected_failure() {
        let api = SimulatedApi::new(3, 1).failing_at(1);
        let first = api.fetch_page(&PageToken::Start).unwrap();
        let err = api
            .fetch_page(&PageToken::Resume(first.next.unwrap()))
            .unwrap_err();
        assert_eq!(err, ApiError::Unavailable { page: 1 });
    }
}
