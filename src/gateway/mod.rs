//! # Remote Gateway
//!
//! Narrow adapter between the reconciler and the hosted note/task service.
//!
//! ## Operations
//!
//! | Operation | Remote effect | Failure modes |
//! |-----------|---------------|---------------|
//! | `create` | persists a draft | `RateLimited`, `Transport`, `Rejected` |
//! | `fetch` | none | `NotFound` |
//! | `update` | one write with all changed fields | `NotFound`, `Stale` |
//! | `delete` | archives the record | `NotFound` |
//! | `list` | none, paginated lazily | `InvalidRecord` per record |
//!
//! ## Implementations
//!
//! - [`NotionGateway`] - blocking HTTPS client for the Notion API
//! - [`InMemoryGateway`] - fake store used in tests
//! - [`Retrying`] - decorator adding backoff on rate limits and one retry
//!   on transport failures
//!
//! Gateways hold configuration only. Nothing read from the remote service is
//! kept between calls.

mod memory;
mod notion;
mod retry;
mod schema;

use std::collections::VecDeque;
use std::time::Duration;

use thiserror::Error;

use crate::domain::{FieldChanges, Item, ItemId, ListFilter, Revision, ValidationError};

pub use memory::{InMemoryGateway, Operation};
pub use notion::NotionGateway;
pub use retry::{
    Backoff, Decision, Interrupt, Interrupted, RecordingSleeper, RetryPolicy, Retrying, Sleeper,
    ThreadSleeper,
};
pub use schema::{PropertyNames, StatusKind, StatusNames};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    #[error("item not found: {0}")]
    NotFound(String),

    #[error("rate limited by the remote service")]
    RateLimited { retry_after: Option<Duration> },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("item {0} changed remotely since it was read")]
    Stale(String),

    #[error("remote record {id} is invalid: {source}")]
    InvalidRecord {
        id: String,
        #[source]
        source: ValidationError,
    },

    #[error("remote service refused the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected response from the remote service: {0}")]
    Decode(String),

    #[error("interrupted")]
    Interrupted,
}

impl GatewayError {
    /// Returns true for failures the retry policy may retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::RateLimited { .. } | GatewayError::Transport(_)
        )
    }
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Validated records, or the validation failure for a record
    pub records: Vec<Result<Item, GatewayError>>,

    /// Cursor for the next page, `None` on the last page
    pub next_cursor: Option<String>,
}

/// Adapter to the remote store
pub trait Gateway {
    /// Persists a pending item and returns it as synced
    fn create(&self, item: &Item) -> Result<Item, GatewayError>;

    /// Reads the current remote state of an item
    fn fetch(&self, id: &ItemId) -> Result<Item, GatewayError>;

    /// Writes all `changes` in one remote operation
    ///
    /// When `expected` is given and the remote revision differs, nothing is
    /// written and [`GatewayError::Stale`] is returned.
    fn update(
        &self,
        id: &ItemId,
        changes: &FieldChanges,
        expected: Option<&Revision>,
    ) -> Result<Item, GatewayError>;

    /// Removes an item; missing or already removed items are `NotFound`
    fn delete(&self, id: &ItemId) -> Result<(), GatewayError>;

    /// Fetches one page of items matching `filter`
    fn query_page(&self, filter: &ListFilter, cursor: Option<&str>)
        -> Result<Page, GatewayError>;

    /// Lazily lists all items matching `filter`
    fn list(&self, filter: &ListFilter) -> Listing<'_, Self>
    where
        Self: Sized,
    {
        Listing::new(self, filter.clone())
    }
}

impl<G: Gateway + ?Sized> Gateway for &G {
    fn create(&self, item: &Item) -> Result<Item, GatewayError> {
        (**self).create(item)
    }

    fn fetch(&self, id: &ItemId) -> Result<Item, GatewayError> {
        (**self).fetch(id)
    }

    fn update(
        &self,
        id: &ItemId,
        changes: &FieldChanges,
        expected: Option<&Revision>,
    ) -> Result<Item, GatewayError> {
        (**self).update(id, changes, expected)
    }

    fn delete(&self, id: &ItemId) -> Result<(), GatewayError> {
        (**self).delete(id)
    }

    fn query_page(
        &self,
        filter: &ListFilter,
        cursor: Option<&str>,
    ) -> Result<Page, GatewayError> {
        (**self).query_page(filter, cursor)
    }
}

impl<G: Gateway + ?Sized> Gateway for Box<G> {
    fn create(&self, item: &Item) -> Result<Item, GatewayError> {
        (**self).create(item)
    }

    fn fetch(&self, id: &ItemId) -> Result<Item, GatewayError> {
        (**self).fetch(id)
    }

    fn update(
        &self,
        id: &ItemId,
        changes: &FieldChanges,
        expected: Option<&Revision>,
    ) -> Result<Item, GatewayError> {
        (**self).update(id, changes, expected)
    }

    fn delete(&self, id: &ItemId) -> Result<(), GatewayError> {
        (**self).delete(id)
    }

    fn query_page(
        &self,
        filter: &ListFilter,
        cursor: Option<&str>,
    ) -> Result<Page, GatewayError> {
        (**self).query_page(filter, cursor)
    }
}

/// Lazy, restartable sequence of listed items
///
/// Pages are fetched on demand. Empty pages that still carry a cursor are
/// skipped, so only the last page ends the sequence. A page-level failure is
/// yielded once and ends the sequence; [`Listing::restart`] starts over from
/// the first page.
pub struct Listing<'g, G: Gateway> {
    gateway: &'g G,
    filter: ListFilter,
    cursor: Option<String>,
    buffer: VecDeque<Result<Item, GatewayError>>,
    exhausted: bool,
    pages_fetched: usize,
}

impl<'g, G: Gateway> Listing<'g, G> {
    fn new(gateway: &'g G, filter: ListFilter) -> Self {
        Self {
            gateway,
            filter,
            cursor: None,
            buffer: VecDeque::new(),
            exhausted: false,
            pages_fetched: 0,
        }
    }

    /// Resets the listing to the first page
    pub fn restart(&mut self) {
        self.cursor = None;
        self.buffer.clear();
        self.exhausted = false;
        self.pages_fetched = 0;
    }

    /// Number of pages requested so far
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn filter(&self) -> &ListFilter {
        &self.filter
    }

    fn fetch_next_page(&mut self) -> Result<(), GatewayError> {
        let page = self
            .gateway
            .query_page(&self.filter, self.cursor.as_deref())?;
        self.pages_fetched += 1;

        match page.next_cursor {
            Some(next) if Some(&next) == self.cursor.as_ref() => {
                return Err(GatewayError::Decode(format!(
                    "pagination cursor '{}' did not advance",
                    next
                )));
            }
            Some(next) => self.cursor = Some(next),
            None => {
                self.cursor = None;
                self.exhausted = true;
            }
        }

        tracing::debug!(
            page = self.pages_fetched,
            records = page.records.len(),
            last = self.exhausted,
            "fetched listing page"
        );

        self.buffer.extend(page.records);
        Ok(())
    }
}

impl<G: Gateway> Iterator for Listing<'_, G> {
    type Item = Result<Item, GatewayError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(record);
            }
            if self.exhausted {
                return None;
            }
            if let Err(err) = self.fetch_next_page() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
    }
}
