//! Page, token, and fetcher types
//!
//! A fetch starts from [`PageToken::Start`]. Each [`Page`] returned by the
//! fetcher may carry the token for the page after it; a page without one
//! is terminal.

use std::fmt;
use std::marker::PhantomData;

/// Where to resume a paginated fetch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PageToken<T> {
    /// Fetch the first page
    Start,

    /// Resume from a continuation token returned by a previous page
    Resume(T),
}

impl<T> PageToken<T> {
    /// Returns true for the synthetic first-page token
    pub fn is_start(&self) -> bool {
        matches!(self, PageToken::Start)
    }

    /// Borrow the continuation token, if any
    pub fn as_resume(&self) -> Option<&T> {
        match self {
            PageToken::Start => None,
            PageToken::Resume(token) => Some(token),
        }
    }
}

impl<T: fmt::Display> fmt::Display for PageToken<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageToken::Start => write!(f, "<start>"),
            PageToken::Resume(token) => write!(f, "{}", token),
        }
    }
}

/// One fetched page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<R, T> {
    /// Records in the order the API returned them
    pub records: Vec<R>,

    /// Token for the following page; `None` at the last page
    pub next: Option<T>,
}

impl<R, T> Page<R, T> {
    /// A page followed by another page
    pub fn new(records: Vec<R>, next: Option<T>) -> Self {
        Self { records, next }
    }

    /// A terminal page
    pub fn last(records: Vec<R>) -> Self {
        Self {
            records,
            next: None,
        }
    }

    /// Returns true if no page follows this one
    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}

/// Fetches a single page of a paginated API
///
/// Implementations are called concurrently from several worker threads,
/// each with a different token.
pub trait PageFetcher: Send + Sync {
    /// Opaque unit of output
    type Record: Send;

    /// Continuation token type
    type Token: Send + fmt::Debug;

    /// Error reported for a failed page
    type Error: std::error::Error + Send + 'static;

    /// Fetch the page identified by `token`
    fn fetch_page(
        &self,
        token: &PageToken<Self::Token>,
    ) -> Result<Page<Self::Record, Self::Token>, Self::Error>;
}

impl<F: PageFetcher + ?Sized> PageFetcher for &F {
    type Record = F::Record;
    type Token = F::Token;
    type Error = F::Error;

    fn fetch_page(
        &self,
        token: &PageToken<Self::Token>,
    ) -> Result<Page<Self::Record, Self::Token>, Self::Error> {
        (**self).fetch_page(token)
    }
}

/// [`PageFetcher`] backed by a closure, see [`fetcher_fn`]
pub struct FnFetcher<F, R, T, E> {
    func: F,
    _marker: PhantomData<fn() -> (R, T, E)>,
}

/// Wrap a closure as a [`PageFetcher`]
///
/// ```
/// use page_walker::pager::{fetcher_fn, Page, PageToken};
///
/// let fetcher = fetcher_fn(|token: &PageToken<u32>| {
///     let page = token.as_resume().copied().unwrap_or(0);
///     let next = (page < 2).then_some(page + 1);
///     Ok::<_, std::io::Error>(Page::new(vec![page], next))
/// });
/// # let _ = fetcher;
/// ```
pub fn fetcher_fn<F, R, T, E>(func: F) -> FnFetcher<F, R, T, E>
where
    F: Fn(&PageToken<T>) -> Result<Page<R, T>, E> + Send + Sync,
{
    FnFetcher {
        func,
        _marker: PhantomData,
    }
}

impl<F, R, T, E> PageFetcher for FnFetcher<F, R, T, E>
where
    F: Fn(&PageToken<T>) -> Result<Page<R, T>, E> + Send + Sync,
    R: Send,
    T: Send + fmt::Debug,
    E: std::error::Error + Send + 'static,
{
    type Record = R;
    type Token = T;
    type Error = E;

    fn fetch_page(&self, token: &PageToken<T>) -> Result<Page<R, T>, E> {
        (self.func)(token)
    }
}
