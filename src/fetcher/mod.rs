//! Category listing collaborator.
//!
//! The explorer consumes listings through the [`CategoryFetcher`] trait: one
//! call per node, returning that node's direct subcategories and articles with
//! any upstream pagination already resolved. Transport concerns (retry with
//! backoff, rate limiting, continuation handling) live behind the trait.
//!
//! # Architecture
//!
//! - [`CategoryFetcher`] - Async trait the explorer depends on
//! - [`MediaWikiFetcher`] - MediaWiki Action API implementation over reqwest
//! - [`RetryPolicy`] / [`classify_error`] - Backoff decisions for failed requests
//! - [`RateLimiter`] - Per-host minimum delay between requests
//!
//! # Example
//!
//! ```no_run
//! use catexplorer_core::FetcherConfig;
//! use catexplorer_core::fetcher::{CategoryFetcher, MediaWikiFetcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = MediaWikiFetcher::new(FetcherConfig::default())?;
//! let birds = fetcher.lookup_category("Birds", "en").await?;
//! let listing = fetcher.fetch_children(birds.id, "en", true).await?;
//! println!("{} subcategories, {} pages", listing.subcategories.len(), listing.pages.len());
//! # Ok(())
//! # }
//! ```

mod error;
mod http_client;
mod mediawiki;
pub mod rate_limiter;
mod retry;

pub use error::FetchError;
pub use mediawiki::{DEFAULT_API_URL_TEMPLATE, DEFAULT_MAX_CONTINUATIONS, MediaWikiFetcher};
pub use rate_limiter::{RateLimiter, extract_host, parse_retry_after};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tree::NodeId;

/// A subcategory listed under a category, with its declared counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubcategoryEntry {
    /// Page id of the subcategory.
    pub id: NodeId,
    /// Title without namespace prefix.
    pub title: String,
    /// Declared number of subcategories.
    pub subcat_count: u64,
    /// Declared number of member pages.
    pub page_count: u64,
}

/// An article listed under a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageEntry {
    /// Page id of the article.
    pub id: NodeId,
    /// Article title.
    pub title: String,
}

/// Direct members of one category, already split into branch and leaf entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryListing {
    /// Subcategories in listing order.
    pub subcategories: Vec<SubcategoryEntry>,
    /// Articles in listing order.
    pub pages: Vec<PageEntry>,
}

impl CategoryListing {
    /// Total number of listed members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subcategories.len() + self.pages.len()
    }

    /// True when the category has no listed members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subcategories.is_empty() && self.pages.is_empty()
    }
}

/// A category resolved from its title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    /// Page id of the category.
    pub id: NodeId,
    /// Title without namespace prefix.
    pub title: String,
    /// Declared number of subcategories.
    pub subcat_count: u64,
    /// Declared number of member pages.
    pub page_count: u64,
}

/// Source of category listings.
///
/// # Object Safety
///
/// This trait uses `async_trait` so the explorer can hold an
/// `Arc<dyn CategoryFetcher>`; native async trait methods are not object-safe.
#[async_trait]
pub trait CategoryFetcher: Send + Sync {
    /// Short name used in logs (e.g. "mediawiki").
    fn name(&self) -> &str;

    /// Resolves a category title (with or without namespace prefix).
    async fn lookup_category(&self, title: &str, locale: &str)
    -> Result<CategorySummary, FetchError>;

    /// Lists the direct members of `node`.
    ///
    /// With `include_metadata` false only subcategories are requested.
    async fn fetch_children(
        &self,
        node: NodeId,
        locale: &str,
        include_metadata: bool,
    ) -> Result<CategoryListing, FetchError>;
}
