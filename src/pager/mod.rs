//! Parallel paginated fetch engine
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!                 │       FetchCoordinator       │
//!                 │  - seeds PageToken::Start    │
//!                 │  - joins workers             │
//!                 └──────────────┬───────────────┘
//!                                │
//!       ┌────────────────────────┼────────────────────────┐
//!       │                        │                        │
//! ┌─────▼─────┐            ┌─────▼─────┐            ┌─────▼─────┐
//! │ Worker 1  │            │ Worker 2  │    ...     │ Worker N  │
//! │ fetch_page│            │ fetch_page│            │ fetch_page│
//! └──┬─────▲──┘            └──┬─────▲──┘            └──┬─────▲──┘
//!    │     │ pop              │     │                  │     │
//!    │  ┌──┴──────────────────┴─────┴──────────────────┴──┐  │
//!    │  │        TokenQueue (crossbeam bounded)           │  │
//!    │  │  pending = queued tokens + in-flight leases     │◄─┼── TerminationDetector
//!    │  └─────────────────────▲───────────────────────────┘  │   closes at pending == 0
//!    │        push follow-on  │                              │
//!    └────────────────────────┴──────────────────────────────┘
//!                 │                        │
//!                 ▼                        ▼
//!          ResultSet (records)     FirstError (first failure)
//! ```

pub mod aggregate;
pub mod coordinator;
pub mod detector;
pub mod page;
pub mod queue;
pub mod worker;

pub use aggregate::{FirstError, ResultSet};
pub use coordinator::{fetch_all, FetchCoordinator, FetchProgress, FetchReport};
pub use detector::{Detection, TerminationDetector};
pub use page::{fetcher_fn, FnFetcher, Page, PageFetcher, PageToken};
pub use queue::{CloseReason, QueueStats, TokenLease, TokenQueue};
