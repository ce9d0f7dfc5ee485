//! Pagination parameters and client-side windowing.
//!
//! The document store supports numeric offsets natively, so a [`Window`] maps
//! directly onto skip/limit. The key-value store only advances through opaque
//! continuation tokens; there [`collect_window`] pulls pages from a
//! [`PageSource`] until `page * limit` items are buffered and slices the
//! requested window out of the buffer.
//!
//! Reaching page `n` costs up to `n` fetches on the key-value store. The
//! number of fetches is reported in [`Paginated::fetches`].
//!
//! # Example
//!
//! ```ignore
//! use tasklayer_core::page::Pagination;
//!
//! let window = Pagination::new(3, 10).window();
//! assert_eq!(window.skip(), 20);
//! assert_eq!(window.end(), 30);
//! ```

use async_trait::async_trait;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::debug;

use crate::{
    backend::{Item, KeyValueDriver},
    error::{StoreError, StoreResult},
    filter::KeyValueQuery,
};

/// Page used when the requested page is not positive.
pub const DEFAULT_PAGE: u64 = 1;
/// Limit used when the requested limit is not positive.
pub const DEFAULT_LIMIT: u64 = 10;

/// Upper bound on the buffer capacity reserved up front.
const MAX_PREALLOCATED: u64 = 1024;

/// Which window of a result set to retrieve.
///
/// Pages are 1-indexed. Values that are zero or negative fall back to
/// [`DEFAULT_PAGE`] and [`DEFAULT_LIMIT`].
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    cancellation: Option<Arc<AtomicBool>>,
}

impl Pagination {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page,
            limit,
            cancellation: None,
        }
    }

    /// Attaches a flag that aborts key-value accumulation once it is set.
    ///
    /// The flag is checked before every page fetch.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancellation = Some(flag);
        self
    }

    /// Returns the normalized window.
    pub fn window(&self) -> Window {
        let page = u64::try_from(self.page)
            .ok()
            .filter(|page| *page > 0)
            .unwrap_or(DEFAULT_PAGE);
        let limit = u64::try_from(self.limit)
            .ok()
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_LIMIT);

        Window { page, limit }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }
}

/// A normalized `{page, limit}` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub page: u64,
    pub limit: u64,
}

impl Window {
    /// Number of items before the window.
    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// Number of items up to and including the window.
    pub fn end(&self) -> u64 {
        self.page.saturating_mul(self.limit)
    }
}

/// A window of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    /// Native page fetches issued to produce this window.
    pub fetches: usize,
}

impl<T> Paginated<T> {
    /// Converts every item, failing on the first conversion error.
    pub fn try_map<U, F>(self, f: F) -> StoreResult<Paginated<U>>
    where
        F: FnMut(T) -> StoreResult<U>,
    {
        Ok(Paginated {
            items: self
                .items
                .into_iter()
                .map(f)
                .collect::<StoreResult<Vec<_>>>()?,
            fetches: self.fetches,
        })
    }
}

/// A forward-only sequence of result pages.
#[async_trait]
pub trait PageSource: Send {
    type Item: Send;

    /// Fetches the next page of at most `limit` items.
    ///
    /// Returns `Ok(None)` once the sequence is exhausted, without issuing a
    /// request. A returned page may be empty while more pages remain.
    async fn next_page(&mut self, limit: u64) -> StoreResult<Option<Vec<Self::Item>>>;
}

/// Buffers pages from `source` and slices out the requested window.
///
/// Stops as soon as `page * limit` items are buffered or the source is
/// exhausted. A window past the end of the results is empty.
pub async fn collect_window<S>(source: &mut S, pagination: &Pagination) -> StoreResult<Paginated<S::Item>>
where
    S: PageSource + ?Sized,
{
    let window = pagination.window();
    let end = window.end();
    let mut buffer = Vec::with_capacity(end.min(MAX_PREALLOCATED) as usize);
    let mut fetches = 0;

    while (buffer.len() as u64) < end {
        if pagination.is_cancelled() {
            debug!(fetches, buffered = buffer.len(), "pagination cancelled");
            return Err(StoreError::Cancelled);
        }

        let Some(items) = source.next_page(window.limit).await? else {
            break;
        };
        fetches += 1;

        let room = (end - buffer.len() as u64) as usize;
        buffer.extend(items.into_iter().take(room));
    }

    let skip = window.skip() as usize;
    let items = if buffer.len() > skip {
        buffer.split_off(skip)
    } else {
        Vec::new()
    };

    Ok(Paginated { items, fetches })
}

/// Pages through a key-value index query using the driver's continuation keys.
pub struct KeyValuePageSource<'a> {
    driver: &'a dyn KeyValueDriver,
    query: &'a KeyValueQuery,
    cursor: Cursor,
}

enum Cursor {
    Start,
    After(Item),
    Exhausted,
}

impl<'a> KeyValuePageSource<'a> {
    pub fn new(driver: &'a dyn KeyValueDriver, query: &'a KeyValueQuery) -> Self {
        Self {
            driver,
            query,
            cursor: Cursor::Start,
        }
    }
}

#[async_trait]
impl PageSource for KeyValuePageSource<'_> {
    type Item = Item;

    async fn next_page(&mut self, limit: u64) -> StoreResult<Option<Vec<Item>>> {
        let start = match std::mem::replace(&mut self.cursor, Cursor::Exhausted) {
            Cursor::Start => None,
            Cursor::After(key) => Some(key),
            Cursor::Exhausted => return Ok(None),
        };

        let limit = i32::try_from(limit).unwrap_or(i32::MAX);
        let page = self
            .driver
            .query_page(self.query, limit, start)
            .await?;

        if let Some(key) = page.last_evaluated_key {
            self.cursor = Cursor::After(key);
        }

        Ok(Some(page.items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serves `total` sequential integers in pages, counting requests.
    struct Counter {
        next: u64,
        total: u64,
        requests: usize,
    }

    impl Counter {
        fn new(total: u64) -> Self {
            Self { next: 0, total, requests: 0 }
        }
    }

    #[async_trait]
    impl PageSource for Counter {
        type Item = u64;

        async fn next_page(&mut self, limit: u64) -> StoreResult<Option<Vec<u64>>> {
            if self.next >= self.total {
                return Ok(None);
            }
            self.requests += 1;

            let end = (self.next + limit).min(self.total);
            let items = (self.next..end).collect();
            self.next = end;

            Ok(Some(items))
        }
    }

    #[test]
    fn test_window_defaults() {
        assert_eq!(Pagination::new(0, 0).window(), Window { page: 1, limit: 10 });
        assert_eq!(Pagination::new(-3, 5).window(), Window { page: 1, limit: 5 });
        assert_eq!(Pagination::default().window(), Window { page: 1, limit: 10 });
        assert_eq!(Pagination::new(3, 10).window().skip(), 20);
    }

    #[tokio::test]
    async fn test_windows_over_partial_last_page() {
        let first = collect_window(&mut Counter::new(25), &Pagination::new(1, 10))
            .await
            .unwrap();
        assert_eq!(first.items, (0..10).collect::<Vec<_>>());
        assert_eq!(first.fetches, 1);

        let third = collect_window(&mut Counter::new(25), &Pagination::new(3, 10))
            .await
            .unwrap();
        assert_eq!(third.items, (20..25).collect::<Vec<_>>());

        let fourth = collect_window(&mut Counter::new(25), &Pagination::new(4, 10))
            .await
            .unwrap();
        assert!(fourth.items.is_empty());
    }

    #[tokio::test]
    async fn test_fetches_grow_with_page() {
        let mut previous = 0;
        for page in 1..=6 {
            let result = collect_window(&mut Counter::new(100), &Pagination::new(page, 7))
                .await
                .unwrap();
            assert!(result.fetches >= previous);
            previous = result.fetches;
        }
        assert_eq!(previous, 6);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_fetch() {
        let flag = Arc::new(AtomicBool::new(true));
        let mut source = Counter::new(50);

        let result = collect_window(&mut source, &Pagination::new(2, 10).with_cancellation(flag)).await;

        assert_eq!(result, Err(StoreError::Cancelled));
        assert_eq!(source.requests, 0);
    }

    #[tokio::test]
    async fn test_stops_at_requested_window() {
        let mut source = Counter::new(1000);

        let result = collect_window(&mut source, &Pagination::new(2, 10)).await.unwrap();

        assert_eq!(result.items, (10..20).collect::<Vec<_>>());
        assert_eq!(source.requests, 2);
    }
}
