//! Error types for explorer operations.

use thiserror::Error;

use crate::fetcher::FetchError;
use crate::tree::{NodeId, TreeError};

/// Errors returned by [`super::CategoryExplorer`].
///
/// A failed operation leaves the tree as it was; the affected node stays
/// unexpanded and may be retried.
#[derive(Debug, Error)]
pub enum ExplorerError {
    /// The explored category could not be resolved or listed.
    #[error("could not open category '{title}': {source}")]
    Open {
        /// The requested category title.
        title: String,
        /// The underlying listing error.
        #[source]
        source: FetchError,
    },

    /// Listing a node's children failed.
    #[error("could not load children of node {node}: {source}\n  Suggestion: Expand the node again to retry")]
    Fetch {
        /// The node being expanded.
        node: NodeId,
        /// The underlying listing error.
        #[source]
        source: FetchError,
    },

    /// The request referenced a node outside the tree.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl ExplorerError {
    /// The listing error behind this failure, if any.
    #[must_use]
    pub fn fetch_error(&self) -> Option<&FetchError> {
        match self {
            Self::Open { source, .. } | Self::Fetch { source, .. } => Some(source),
            Self::Tree(_) => None,
        }
    }
}
