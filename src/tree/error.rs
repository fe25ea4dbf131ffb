//! Error types for tree store operations.
//!
//! These indicate bookkeeping bugs in the caller rather than upstream
//! failures; an operation that returns one of them has not mutated the tree.

use thiserror::Error;

use super::NodeId;

/// Errors that can occur while mutating or querying a [`super::CategoryTree`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// A merge targeted a parent that is not part of the tree.
    #[error(
        "cannot merge children into unknown parent {parent}\n  Suggestion: Expand nodes only after they have been discovered"
    )]
    InvalidParent {
        /// The missing parent id.
        parent: NodeId,
    },

    /// A query or selection referenced a node that is not part of the tree.
    #[error("unknown node {node}\n  Suggestion: Use an id shown in the current tree")]
    UnknownNode {
        /// The missing node id.
        node: NodeId,
    },
}

impl TreeError {
    /// Creates an `InvalidParent` error.
    #[must_use]
    pub fn invalid_parent(parent: NodeId) -> Self {
        Self::InvalidParent { parent }
    }

    /// Creates an `UnknownNode` error.
    #[must_use]
    pub fn unknown_node(node: NodeId) -> Self {
        Self::UnknownNode { node }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_parent_message() {
        let msg = TreeError::invalid_parent(NodeId(42)).to_string();
        assert!(msg.contains("42"), "should contain parent id");
        assert!(msg.contains("Suggestion"), "should have suggestion");
    }

    #[test]
    fn test_unknown_node_message() {
        let msg = TreeError::unknown_node(NodeId(7)).to_string();
        assert!(msg.contains("unknown node 7"));
    }
}
