//! page-walker - Parallel Fetcher for Paginated APIs
//!
//! Fetches a complete result set from a paginated API whose continuation
//! tokens are only discovered one page at a time: each response carries
//! the token for the next page, or nothing at the last page.
//!
//! # Features
//!
//! - **Bounded Worker Pool**: A fixed number of worker threads pull
//!   continuation tokens from a shared bounded queue and push the tokens
//!   they discover back into it.
//!
//! - **Exact Termination**: The queue tracks queued tokens plus in-flight
//!   fetches. The fetch ends the moment that count reaches zero, with no
//!   window where a follow-on token can be lost.
//!
//! - **First Error Wins**: The first failed page aborts the run. Workers
//!   stop taking new work and the caller gets that error, never a partial
//!   result.
//!
//! - **Observable Loss**: A token rejected by a full queue is logged and
//!   counted in the [`FetchReport`].
//!
//! # Example
//!
//! ```
//! use page_walker::pager::{fetch_all, fetcher_fn, Page, PageToken};
//!
//! // Pages 0..4, two records each, chained by their index
//! let fetcher = fetcher_fn(|token: &PageToken<u32>| {
//!     let page = token.as_resume().copied().unwrap_or(0);
//!     let next = (page < 3).then_some(page + 1);
//!     Ok::<_, std::io::Error>(Page::new(vec![page; 2], next))
//! });
//!
//! let records = fetch_all(fetcher, 3).unwrap();
//! assert_eq!(records.len(), 8);
//! ```

pub mod config;
pub mod error;
pub mod pager;
pub mod progress;
pub mod simulate;
pub mod sink;

pub use config::{CliArgs, FetchConfig, RunConfig};
pub use error::{ConfigError, PagerError, Result, SinkError, WorkerError};
pub use pager::{fetch_all, FetchCoordinator, FetchProgress, FetchReport, Page, PageFetcher, PageToken};
pub use sink::{JsonLinesSink, RecordSink};
