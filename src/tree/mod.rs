//! Flat, id-indexed store for the partially discovered category tree.
//!
//! Nodes live in a single map keyed by [`NodeId`]; children are referenced by
//! id, never by pointer. The store only grows: nodes are inserted by merges
//! and removed only when the whole tree is dropped.
//!
//! # Change detection
//!
//! Node storage is an `Arc`-shared map updated copy-on-write. A consumer that
//! keeps the result of [`CategoryTree::snapshot`] sees a different `Arc`
//! (`Arc::ptr_eq` is false) after any merge that changed something, and
//! [`CategoryTree::revision`] increases monotonically with every effective
//! change. Merges that change nothing leave both untouched.

mod error;
mod label;

pub use error::TreeError;
pub use label::{
    CATEGORY_NAMESPACE, CATEGORY_PREFIX, category_label, display_title, normalize_category_input,
    strip_namespace,
};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fetcher::{CategoryListing, CategorySummary, PageEntry, SubcategoryEntry};

/// Id of the synthetic root node. Upstream page ids start at 1.
pub const ROOT_ID: NodeId = NodeId(0);

/// Opaque node identifier (the upstream page id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(NodeId)
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A category (branch or leaf category) in the explored tree.
///
/// Articles are not materialized as nodes; they are folded into the
/// `metadata` of the category that lists them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    /// Unique, stable id.
    pub id: NodeId,
    /// Display label, including counts at creation time.
    pub name: String,
    /// True when the upstream listing declared at least one subcategory.
    pub is_branch: bool,
    /// Child ids in discovery order; empty until expanded.
    pub children: Vec<NodeId>,
    /// Enclosing node; `None` only for the synthetic root.
    pub parent: Option<NodeId>,
    /// Direct articles of this category: article id to title.
    pub metadata: BTreeMap<NodeId, String>,
}

impl TreeNode {
    /// Creates a node with no children and no articles.
    #[must_use]
    pub fn new(id: NodeId, name: impl Into<String>, is_branch: bool, parent: Option<NodeId>) -> Self {
        Self {
            id,
            name: name.into(),
            is_branch,
            children: Vec::new(),
            parent,
            metadata: BTreeMap::new(),
        }
    }

    /// Builds a child node from a listed subcategory.
    #[must_use]
    pub fn from_subcategory(entry: &SubcategoryEntry, parent: NodeId) -> Self {
        Self::new(
            entry.id,
            category_label(&entry.title, entry.subcat_count, entry.page_count),
            entry.subcat_count > 0,
            Some(parent),
        )
    }

    /// True once children have been attached.
    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// A branch whose children are not known yet.
    #[must_use]
    pub fn is_undiscovered_branch(&self) -> bool {
        self.is_branch && self.children.is_empty()
    }

    /// Folds listed articles into this node's metadata. Returns how many were new.
    pub fn fold_pages(&mut self, pages: &[PageEntry]) -> usize {
        let mut added = 0;
        for page in pages {
            if !self.metadata.contains_key(&page.id) {
                self.metadata.insert(page.id, page.title.clone());
                added += 1;
            }
        }
        added
    }
}

/// Splits a listing into child nodes (parented to `parent`) and articles.
#[must_use]
pub fn partition_listing(listing: CategoryListing, parent: NodeId) -> (Vec<TreeNode>, Vec<PageEntry>) {
    let children = listing
        .subcategories
        .iter()
        .map(|entry| TreeNode::from_subcategory(entry, parent))
        .collect();
    (children, listing.pages)
}

/// Summary of what a merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Nodes newly inserted into the store.
    pub inserted: usize,
    /// Already present, unexpanded nodes that adopted fetched children or articles.
    pub adopted: usize,
    /// Already present nodes left untouched.
    pub skipped: usize,
    /// Fetched ids dropped because they would make the parent its own descendant.
    pub dropped_cycles: usize,
    /// Whether the parent's child list was set by this merge.
    pub attached: bool,
}

impl MergeReport {
    /// True when the merge changed the store.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.adopted > 0 || self.attached
    }
}

/// The tree store: synthetic root, explored top category, and every
/// discovered category keyed by id.
#[derive(Debug, Clone)]
pub struct CategoryTree {
    root: NodeId,
    top: NodeId,
    nodes: Arc<HashMap<NodeId, TreeNode>>,
    revision: u64,
}

impl CategoryTree {
    /// Builds the initial tree for an explored category from its first listing.
    ///
    /// The synthetic root gets the category as its only child; the category's
    /// listed subcategories become its children and its articles its metadata.
    /// The category label carries the discovered counts, and the category is a
    /// branch only if at least one subcategory was listed.
    #[must_use]
    pub fn from_listing(top: &CategorySummary, listing: CategoryListing) -> Self {
        let mut root = TreeNode::new(ROOT_ID, "root", true, None);
        root.children.push(top.id);

        let mut category = TreeNode::new(top.id, display_title(&top.title), true, Some(ROOT_ID));
        category.fold_pages(&listing.pages);

        let mut nodes = HashMap::new();
        for entry in &listing.subcategories {
            if entry.id == ROOT_ID || entry.id == top.id || nodes.contains_key(&entry.id) {
                debug!(node = %entry.id, "skipping duplicate subcategory in initial listing");
                continue;
            }
            category.children.push(entry.id);
            nodes.insert(entry.id, TreeNode::from_subcategory(entry, top.id));
        }

        category.name = format!(
            "{} ({} C, {} P)",
            category.name,
            category.children.len(),
            category.metadata.len()
        );
        category.is_branch = !category.children.is_empty();

        nodes.insert(ROOT_ID, root);
        nodes.insert(top.id, category);

        Self {
            root: ROOT_ID,
            top: top.id,
            nodes: Arc::new(nodes),
            revision: 0,
        }
    }

    /// Id of the synthetic root.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Id of the explored category (the root's only child).
    #[must_use]
    pub fn top(&self) -> NodeId {
        self.top
    }

    /// Looks up a node.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    /// Looks up a node, failing with [`TreeError::UnknownNode`].
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::UnknownNode`] when `id` is not in the tree.
    pub fn node(&self, id: NodeId) -> Result<&TreeNode, TreeError> {
        self.get(id).ok_or_else(|| TreeError::unknown_node(id))
    }

    /// True when `id` is in the tree.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of nodes, including the synthetic root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the synthetic root is present from construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Monotonic counter bumped on every effective change.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Shared handle to the current node map.
    #[must_use]
    pub fn snapshot(&self) -> Arc<HashMap<NodeId, TreeNode>> {
        Arc::clone(&self.nodes)
    }

    /// Direct children of `id` that are present in the store, in order.
    pub fn children_of(&self, id: NodeId) -> impl Iterator<Item = &TreeNode> + '_ {
        self.get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.get(*child))
    }

    /// Ancestors of `id`, nearest first, ending with the root.
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut ancestors = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = self.get(id).and_then(|node| node.parent);
        while let Some(parent) = current {
            if !seen.insert(parent) {
                break;
            }
            ancestors.push(parent);
            current = self.get(parent).and_then(|node| node.parent);
        }
        ancestors
    }

    /// Distance from the synthetic root (root = 0, explored category = 1).
    #[must_use]
    pub fn depth_of(&self, id: NodeId) -> Option<usize> {
        self.contains(id).then(|| self.ancestors(id).len())
    }

    /// True for nodes directly below the explored category.
    #[must_use]
    pub fn is_first_level(&self, id: NodeId) -> bool {
        self.get(id)
            .is_some_and(|node| node.parent == Some(self.top))
    }

    /// Child ids that point at nodes missing from the store.
    #[must_use]
    pub fn dangling_children(&self) -> Vec<(NodeId, NodeId)> {
        let mut dangling: Vec<(NodeId, NodeId)> = self
            .nodes
            .values()
            .flat_map(|node| {
                node.children
                    .iter()
                    .filter(|child| !self.nodes.contains_key(child))
                    .map(move |child| (node.id, *child))
            })
            .collect();
        dangling.sort();
        dangling
    }

    /// Merges fetched children under `parent`.
    ///
    /// Children absent from the store are inserted. Present children are left
    /// alone unless they are still unexpanded and the fetched copy carries
    /// discovered children or articles, which they then adopt. The parent's
    /// child list is set to the fetched ids only when it is currently empty,
    /// so the first of two overlapping expansions wins and the second only
    /// contributes standalone nodes. Ids that are the parent itself or one of
    /// its ancestors are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidParent`] without mutating anything when
    /// `parent` is not in the store.
    pub fn merge(&mut self, parent: NodeId, children: Vec<TreeNode>) -> Result<MergeReport, TreeError> {
        let parent_node = self
            .get(parent)
            .ok_or_else(|| TreeError::invalid_parent(parent))?;
        let attach_to_parent = parent_node.children.is_empty();

        let mut lineage: HashSet<NodeId> = self.ancestors(parent).into_iter().collect();
        lineage.insert(parent);

        let mut report = MergeReport::default();
        let mut order = Vec::with_capacity(children.len());
        let mut batch: HashMap<NodeId, TreeNode> = HashMap::with_capacity(children.len());

        for mut child in children {
            if lineage.contains(&child.id) {
                debug!(parent = %parent, child = %child.id, "dropping child that would form a cycle");
                report.dropped_cycles += 1;
                continue;
            }
            if batch.contains_key(&child.id) {
                continue;
            }
            child.parent.get_or_insert(parent);
            order.push(child.id);
            batch.insert(child.id, child);
        }

        let mut writes = Vec::new();
        for id in &order {
            let Some(mut incoming) = batch.remove(id) else {
                continue;
            };
            let mut own_lineage = lineage.clone();
            own_lineage.insert(incoming.id);
            incoming
                .children
                .retain(|grandchild| !own_lineage.contains(grandchild) && self.contains(*grandchild));

            match self.get(*id) {
                None => {
                    report.inserted += 1;
                    writes.push(incoming);
                }
                Some(existing) => {
                    let adopt_children = existing.children.is_empty() && incoming.has_children();
                    let adopt_pages = incoming
                        .metadata
                        .keys()
                        .any(|article| !existing.metadata.contains_key(article));
                    if adopt_children || adopt_pages {
                        let mut upgraded = existing.clone();
                        if adopt_children {
                            upgraded.children = incoming.children;
                        }
                        for (article, title) in incoming.metadata {
                            upgraded.metadata.entry(article).or_insert(title);
                        }
                        report.adopted += 1;
                        writes.push(upgraded);
                    } else {
                        report.skipped += 1;
                    }
                }
            }
        }

        report.attached = attach_to_parent && !order.is_empty();
        if !report.changed() {
            return Ok(report);
        }

        let nodes = Arc::make_mut(&mut self.nodes);
        for node in writes {
            nodes.insert(node.id, node);
        }
        if report.attached
            && let Some(parent_node) = nodes.get_mut(&parent)
        {
            parent_node.children = order;
        }
        self.revision += 1;

        debug!(
            parent = %parent,
            inserted = report.inserted,
            adopted = report.adopted,
            skipped = report.skipped,
            attached = report.attached,
            revision = self.revision,
            "merged children"
        );
        Ok(report)
    }

    /// Inserts nodes without attaching them to any parent.
    ///
    /// Used to land a subtree bottom-up: grandchildren are staged first, then
    /// the child that lists them is merged under its parent. Present ids are
    /// skipped. Returns the number of inserted nodes.
    pub fn stage(&mut self, nodes: Vec<TreeNode>) -> usize {
        let fresh: Vec<TreeNode> = nodes
            .into_iter()
            .filter(|node| !self.contains(node.id))
            .collect();
        if fresh.is_empty() {
            return 0;
        }

        let inserted = fresh.len();
        let store = Arc::make_mut(&mut self.nodes);
        for mut node in fresh {
            node.children.retain(|child| store.contains_key(child));
            store.entry(node.id).or_insert(node);
        }
        self.revision += 1;
        debug!(inserted, revision = self.revision, "staged detached nodes");
        inserted
    }

    /// Folds listed articles into the metadata of `id`. Returns how many were new.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidParent`] when `id` is not in the store.
    pub fn record_pages(&mut self, id: NodeId, pages: &[PageEntry]) -> Result<usize, TreeError> {
        let node = self.get(id).ok_or_else(|| TreeError::invalid_parent(id))?;
        if pages.iter().all(|page| node.metadata.contains_key(&page.id)) {
            return Ok(0);
        }

        let added = Arc::make_mut(&mut self.nodes)
            .get_mut(&id)
            .map_or(0, |node| node.fold_pages(pages));
        self.revision += 1;
        Ok(added)
    }

    /// Articles of `id` and every known descendant, depth first, in order.
    ///
    /// An article listed by several categories is reported once.
    #[must_use]
    pub fn subtree_articles(&self, id: NodeId) -> Vec<(NodeId, String)> {
        let mut articles = Vec::new();
        let mut seen_articles = HashSet::new();
        let mut visited = HashSet::new();
        let mut stack = vec![id];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(node) = self.get(current) else {
                continue;
            };
            for (article, title) in &node.metadata {
                if seen_articles.insert(*article) {
                    articles.push((*article, title.clone()));
                }
            }
            stack.extend(node.children.iter().rev().copied());
        }
        articles
    }
}
