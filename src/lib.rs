//! Category Explorer Core Library
//!
//! This library incrementally discovers a wiki category hierarchy, keeps the
//! partially known tree in a flat id-indexed store, tracks which categories
//! the user selected, and exports the articles under the selection.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`fetcher`] - Listing collaborator trait and the MediaWiki API adapter
//! - [`tree`] - Flat tree store with idempotent merges
//! - [`selection`] - Explicit selection and derived tri-state display
//! - [`explorer`] - Expansion, depth-bounded prefetch and loaded bookkeeping
//! - [`export`] - CSV, text, wikicode and JSON encoders
//! - [`config`] - Explorer and fetcher settings

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod explorer;
pub mod export;
pub mod fetcher;
pub mod selection;
pub mod tree;
pub(crate) mod user_agent;

#[cfg(test)]
pub mod test_support;

// Re-export commonly used types
pub use config::{ConfigError, DEFAULT_DEPTH_LIMIT, ExplorerConfig, FetcherConfig, MAX_DEPTH_LIMIT};
pub use explorer::{
    CategoryExplorer, ExpandOutcome, ExplorerError, LoadState, LoadedSet, NodeState, Notice,
    PrefetchReport,
};
pub use export::{ExportError, ExportFormat, encode};
pub use fetcher::{
    CategoryFetcher, CategoryListing, CategorySummary, FetchError, MediaWikiFetcher, PageEntry,
    SubcategoryEntry,
};
pub use selection::{ArticleBag, ArticleRef, SelectionTracker, ToggleOutcome, VisualState};
pub use tree::{CategoryTree, NodeId, ROOT_ID, TreeError, TreeNode};
