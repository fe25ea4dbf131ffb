//! Explicit per-node selection and the display state derived from it.
//!
//! Selection never cascades: toggling a node changes that node's entry only.
//! [`SelectionTracker::visual_state`] derives the tri-state checkbox from the
//! selection of descendants on every call; nothing is cached.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::explorer::LoadedSet;
use crate::tree::{CategoryTree, NodeId, TreeError, TreeNode};

/// Checkbox state shown for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualState {
    /// Nothing selected.
    None,
    /// Some but not all descendants selected.
    Some,
    /// Fully selected.
    All,
    /// A branch whose children are unknown; cannot be selected yet.
    Disabled,
}

/// What a toggle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The node was added to the selection.
    Selected,
    /// The node was removed from the selection.
    Deselected,
    /// The node already had the requested state.
    Unchanged,
    /// The node is disabled; nothing changed.
    Disabled,
}

/// An article in the exported selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleRef {
    /// Article page id.
    pub id: NodeId,
    /// Article title.
    pub title: String,
}

/// Articles of the selected categories, each id at most once, in selection order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ArticleBag {
    articles: Vec<ArticleRef>,
    #[serde(skip)]
    seen: HashSet<NodeId>,
}

impl ArticleBag {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an article unless its id is already present. Returns whether it was added.
    pub fn push(&mut self, id: NodeId, title: impl Into<String>) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.articles.push(ArticleRef {
            id,
            title: title.into(),
        });
        true
    }

    /// Articles in insertion order.
    #[must_use]
    pub fn articles(&self) -> &[ArticleRef] {
        &self.articles
    }

    /// Titles in insertion order.
    pub fn titles(&self) -> impl Iterator<Item = &str> + '_ {
        self.articles.iter().map(|article| article.title.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.articles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

impl FromIterator<(NodeId, String)> for ArticleBag {
    fn from_iter<I: IntoIterator<Item = (NodeId, String)>>(iter: I) -> Self {
        let mut bag = Self::new();
        for (id, title) in iter {
            bag.push(id, title);
        }
        bag
    }
}

/// True for a branch whose children have not been discovered.
#[must_use]
pub fn is_disabled(node: &TreeNode) -> bool {
    node.is_undiscovered_branch()
}

/// The set of explicitly selected nodes.
#[derive(Debug, Clone, Default)]
pub struct SelectionTracker {
    /// Node to selection sequence number.
    selected: HashMap<NodeId, u64>,
    next_seq: u64,
}

impl SelectionTracker {
    /// Creates an empty selection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets or clears the selection of exactly one node.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::UnknownNode`] if `id` is not in the tree.
    pub fn toggle(
        &mut self,
        tree: &CategoryTree,
        id: NodeId,
        selected: bool,
    ) -> Result<ToggleOutcome, TreeError> {
        let node = tree.node(id)?;
        if is_disabled(node) {
            return Ok(ToggleOutcome::Disabled);
        }

        if selected {
            if self.selected.contains_key(&id) {
                return Ok(ToggleOutcome::Unchanged);
            }
            self.selected.insert(id, self.next_seq);
            self.next_seq += 1;
            Ok(ToggleOutcome::Selected)
        } else if self.selected.remove(&id).is_some() {
            Ok(ToggleOutcome::Deselected)
        } else {
            Ok(ToggleOutcome::Unchanged)
        }
    }

    /// Whether `id` was explicitly selected.
    #[must_use]
    pub fn is_selected(&self, id: NodeId) -> bool {
        self.selected.contains_key(&id)
    }

    /// Selected ids in the order they were selected.
    #[must_use]
    pub fn selected_ids(&self) -> Vec<NodeId> {
        let mut ordered: Vec<_> = self.selected.iter().map(|(id, seq)| (*seq, *id)).collect();
        ordered.sort_unstable();
        ordered.into_iter().map(|(_, id)| id).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.selected.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Derived checkbox state of `id`.
    ///
    /// - a branch without discovered children is `Disabled`;
    /// - a node that is selected, or sits under a selected ancestor, is `All`;
    /// - an unselected node without children is `None`;
    /// - otherwise the state follows the non-disabled children: all `All`
    ///   gives `All`, all `None` gives `None`, anything else `Some`. When every
    ///   child is disabled the node shows `None`.
    ///
    /// Unknown ids report `None`.
    #[must_use]
    pub fn visual_state(&self, tree: &CategoryTree, id: NodeId) -> VisualState {
        let Some(node) = tree.get(id) else {
            return VisualState::None;
        };
        let inherited = tree
            .ancestors(id)
            .into_iter()
            .any(|ancestor| self.is_selected(ancestor));
        self.derive_state(tree, node, inherited, &mut HashSet::new())
    }

    fn derive_state(
        &self,
        tree: &CategoryTree,
        node: &TreeNode,
        inherited: bool,
        visiting: &mut HashSet<NodeId>,
    ) -> VisualState {
        if is_disabled(node) {
            return VisualState::Disabled;
        }
        if inherited || self.is_selected(node.id) {
            return VisualState::All;
        }
        if !node.has_children() || !visiting.insert(node.id) {
            return VisualState::None;
        }

        let (mut all, mut none, mut some) = (0usize, 0usize, false);
        for child in tree.children_of(node.id) {
            match self.derive_state(tree, child, false, visiting) {
                VisualState::All => all += 1,
                VisualState::None => none += 1,
                VisualState::Some => some = true,
                VisualState::Disabled => {}
            }
        }
        visiting.remove(&node.id);

        match (all, none, some) {
            (0, _, false) => VisualState::None,
            (_, 0, false) => VisualState::All,
            _ => VisualState::Some,
        }
    }

    /// True when `id` is selected and a direct child is a branch whose
    /// children were never fetched.
    ///
    /// A child that was fetched and turned out empty does not count.
    #[must_use]
    pub fn is_incomplete(&self, tree: &CategoryTree, loaded: &LoadedSet, id: NodeId) -> bool {
        if !self.is_selected(id) {
            return false;
        }
        tree.children_of(id)
            .any(|child| child.is_undiscovered_branch() && !loaded.is_expanded(child.id))
    }

    /// Articles of every selected node and its known descendants.
    #[must_use]
    pub fn selected_articles(&self, tree: &CategoryTree) -> ArticleBag {
        self.selected_ids()
            .into_iter()
            .flat_map(|id| tree.subtree_articles(id))
            .collect()
    }
}
