//! Book lookup against the OpenLibrary books API.
//!
//! `GET {base_url}/api/books?bibkeys=ISBN:{isbn}&jscmd=data&format=json`
//! answers with an object keyed by `ISBN:{isbn}`, or `{}` when the catalogue
//! has no such book. The `jscmd=data` record is exactly the [`Book`] shape
//! the reducer's `ADD_BOOK` action takes.

use std::collections::HashMap;
use std::time::Duration;
use sync_core::Book;
use tracing::debug;

use crate::engine::ClientError;

/// Public OpenLibrary endpoint.
pub const OPENLIBRARY_URL: &str = "https://openlibrary.org";

/// Configuration for [`BookLookup`].
#[derive(Debug, Clone)]
pub struct BookLookupConfig {
    /// Catalogue root, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for BookLookupConfig {
    fn default() -> Self {
        Self {
            base_url: OPENLIBRARY_URL.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Client for the books API.
#[derive(Debug, Clone)]
pub struct BookLookup {
    config: BookLookupConfig,
    http: reqwest::Client,
}

impl BookLookup {
    /// Create a lookup client.
    pub fn new(config: BookLookupConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Build the books endpoint URL.
    pub fn books_url(&self) -> String {
        format!("{}/api/books", self.config.base_url)
    }

    /// Look up a book by ISBN.
    ///
    /// Returns `Ok(None)` when the catalogue has no entry for `isbn`; a
    /// network failure or error status is returned as [`ClientError::Lookup`].
    pub async fn fetch_book(&self, isbn: &str) -> Result<Option<Book>, ClientError> {
        let isbn = isbn.trim();
        if isbn.is_empty() {
            return Ok(None);
        }

        let key = format!("ISBN:{isbn}");
        let response = self
            .http
            .get(self.books_url())
            .query(&[("bibkeys", key.as_str()), ("jscmd", "data"), ("format", "json")])
            .send()
            .await?
            .error_for_status()?;

        let mut found: HashMap<String, Book> = response.json().await?;
        let book = found.remove(&key);
        debug!(isbn, found = book.is_some(), "book lookup");
        Ok(book)
    }
}
