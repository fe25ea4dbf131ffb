//! Orchestration of fetches, merges and selection.
//!
//! [`CategoryExplorer`] owns the tree, the selection and the [`LoadedSet`],
//! each behind its own async lock. Locks are never held across a fetch, so
//! several expansions can be in flight at once; merges are idempotent and the
//! first completed expansion of a parent attaches its children.
//!
//! # Expansion
//!
//! [`CategoryExplorer::expand`] fetches one level. [`CategoryExplorer::prefetch`]
//! additionally fetches every discovered subcategory down to
//! `depth_limit` levels below the node (entry depth 0), so the display can
//! tell right away which children are themselves expandable. Subtrees land
//! bottom-up: a child's own children are staged before the child is merged
//! under its parent.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use catexplorer_core::{CategoryExplorer, ExplorerConfig, FetcherConfig};
//! use catexplorer_core::fetcher::MediaWikiFetcher;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = Arc::new(MediaWikiFetcher::new(FetcherConfig::default())?);
//! let explorer = CategoryExplorer::open(fetcher, ExplorerConfig::default(), "Birds").await?;
//! let top = explorer.tree().await.top();
//! for child in explorer.tree().await.get(top).map(|n| n.children.clone()).unwrap_or_default() {
//!     explorer.prefetch(child).await?;
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod loaded;

pub use error::ExplorerError;
pub use loaded::{LoadState, LoadedSet};

use loaded::LoadClaim;

use std::fmt;
use std::sync::Arc;

use futures_util::future::{BoxFuture, join_all};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::config::ExplorerConfig;
use crate::fetcher::{CategoryFetcher, FetchError, PageEntry};
use crate::selection::{ArticleBag, SelectionTracker, ToggleOutcome, VisualState};
use crate::tree::{CategoryTree, NodeId, ROOT_ID, TreeNode, partition_listing};

/// Display-level fetch state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Never fetched, or the last fetch failed.
    Unexpanded,
    /// A fetch is in flight.
    Loading,
    /// Children are known (possibly none).
    Expanded,
}

/// Result of an expansion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandOutcome {
    /// The node was fetched and merged.
    Expanded {
        /// Subcategories attached or offered to the node.
        children: usize,
        /// Articles folded into the node.
        pages: usize,
    },
    /// The node already had children or was fetched before.
    AlreadyLoaded,
    /// Another request is fetching the node right now.
    InFlight,
}

/// What a prefetch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchReport {
    /// Outcome for the requested node.
    pub outcome: ExpandOutcome,
    /// Listing requests issued, including the requested node.
    pub fetches: usize,
    /// Deepest recursion level that issued a fetch (0 = the node itself).
    pub max_depth: usize,
    /// Children not fetched because they were already loaded or loading.
    pub skipped: usize,
    /// Subtree fetches that failed; each produced a [`Notice`].
    pub failures: usize,
}

impl PrefetchReport {
    fn unchanged(outcome: ExpandOutcome) -> Self {
        Self {
            outcome,
            fetches: 0,
            max_depth: 0,
            skipped: 0,
            failures: 0,
        }
    }
}

/// A user-facing message about a failed background fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Node whose listing could not be fetched.
    pub node: NodeId,
    /// Node label at the time of failure.
    pub name: String,
    /// Error description.
    pub message: String,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not load '{}' ({}): {}", self.name, self.node, self.message)
    }
}

/// A fetched level: child nodes (with their own children attached when they
/// were prefetched) and the articles of the fetched node.
struct Level {
    children: Vec<TreeNode>,
    pages: Vec<PageEntry>,
}

#[derive(Debug, Default, Clone, Copy)]
struct LevelStats {
    fetches: usize,
    max_depth: usize,
    skipped: usize,
    failures: usize,
}

impl LevelStats {
    fn absorb(&mut self, other: LevelStats) {
        self.fetches += other.fetches;
        self.max_depth = self.max_depth.max(other.max_depth);
        self.skipped += other.skipped;
        self.failures += other.failures;
    }
}

/// Incremental explorer over one category tree.
pub struct CategoryExplorer {
    fetcher: Arc<dyn CategoryFetcher>,
    config: ExplorerConfig,
    tree: RwLock<CategoryTree>,
    selection: RwLock<SelectionTracker>,
    loaded: Arc<Mutex<LoadedSet>>,
    notices: Mutex<Vec<Notice>>,
}

impl fmt::Debug for CategoryExplorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CategoryExplorer")
            .field("fetcher", &self.fetcher.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CategoryExplorer {
    /// Resolves `title`, fetches its listing and builds the initial tree.
    ///
    /// The explored category starts expanded; its subcategories start
    /// unexpanded.
    ///
    /// # Errors
    ///
    /// Returns [`ExplorerError::Open`] if the category cannot be resolved or listed.
    #[instrument(skip(fetcher, config), fields(fetcher = fetcher.name(), locale = %config.locale))]
    pub async fn open(
        fetcher: Arc<dyn CategoryFetcher>,
        config: ExplorerConfig,
        title: &str,
    ) -> Result<Self, ExplorerError> {
        let open_error = |source| ExplorerError::Open {
            title: title.to_string(),
            source,
        };
        let summary = fetcher
            .lookup_category(title, &config.locale)
            .await
            .map_err(open_error)?;
        let listing = fetcher
            .fetch_children(summary.id, &config.locale, config.include_metadata)
            .await
            .map_err(open_error)?;

        let tree = CategoryTree::from_listing(&summary, listing);
        let mut loaded = LoadedSet::new();
        loaded.mark_expanded(ROOT_ID);
        loaded.mark_expanded(summary.id);

        info!(
            category = %summary.title,
            id = %summary.id,
            nodes = tree.len(),
            "opened category"
        );
        Ok(Self::with_tree(fetcher, config, tree, loaded))
    }

    /// Creates an explorer over an existing tree and loaded set.
    #[must_use]
    pub fn with_tree(
        fetcher: Arc<dyn CategoryFetcher>,
        config: ExplorerConfig,
        tree: CategoryTree,
        loaded: LoadedSet,
    ) -> Self {
        Self {
            fetcher,
            config,
            tree: RwLock::new(tree),
            selection: RwLock::new(SelectionTracker::new()),
            loaded: Arc::new(Mutex::new(loaded)),
            notices: Mutex::new(Vec::new()),
        }
    }

    /// Explorer settings.
    #[must_use]
    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    /// Fetches and merges one level below `id`.
    ///
    /// A node that already has children, was fetched before, or is being
    /// fetched is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`ExplorerError::Fetch`] when the listing fails; the tree is
    /// untouched and the node can be expanded again. Returns
    /// [`ExplorerError::Tree`] for an unknown node.
    pub async fn expand(&self, id: NodeId) -> Result<ExpandOutcome, ExplorerError> {
        self.expand_to_depth(id, 0).await.map(|report| report.outcome)
    }

    /// Expands `id` and speculatively fetches subcategories down to
    /// `depth_limit` levels below it.
    ///
    /// Failures below the requested node become [`Notice`]s and do not stop
    /// sibling subtrees.
    ///
    /// # Errors
    ///
    /// Same as [`CategoryExplorer::expand`], for the requested node only.
    pub async fn prefetch(&self, id: NodeId) -> Result<PrefetchReport, ExplorerError> {
        self.expand_to_depth(id, self.config.depth_limit).await
    }

    #[instrument(skip(self), fields(node = %id))]
    async fn expand_to_depth(
        &self,
        id: NodeId,
        depth_limit: usize,
    ) -> Result<PrefetchReport, ExplorerError> {
        let (lineage, claim) = {
            let tree = self.tree.read().await;
            let node = tree.node(id)?;
            if node.has_children() {
                return Ok(PrefetchReport::unchanged(ExpandOutcome::AlreadyLoaded));
            }
            let mut loaded = self.loaded.lock().await;
            match loaded.state(id) {
                Some(LoadState::Loading) => {
                    debug!("fetch already in flight");
                    return Ok(PrefetchReport::unchanged(ExpandOutcome::InFlight));
                }
                Some(LoadState::Expanded) => {
                    return Ok(PrefetchReport::unchanged(ExpandOutcome::AlreadyLoaded));
                }
                None => {
                    loaded.begin(id);
                }
            }
            let mut lineage = tree.ancestors(id);
            lineage.push(id);
            (lineage, LoadClaim::new(&self.loaded, id))
        };

        let (level, stats) = match self.fetch_level(id, 0, depth_limit, lineage).await {
            Ok(fetched) => fetched,
            Err(source) => {
                claim.fail().await;
                warn!(node = %id, error = %source, "expansion failed");
                return Err(ExplorerError::Fetch { node: id, source });
            }
        };

        let children = level.children.len();
        let pages = level.pages.len();
        {
            let mut tree = self.tree.write().await;
            tree.record_pages(id, &level.pages)?;
            tree.merge(id, level.children)?;
        }
        claim.finish().await;

        debug!(
            children,
            pages,
            fetches = stats.fetches,
            failures = stats.failures,
            "expanded"
        );
        Ok(PrefetchReport {
            outcome: ExpandOutcome::Expanded { children, pages },
            fetches: stats.fetches,
            max_depth: stats.max_depth,
            skipped: stats.skipped,
            failures: stats.failures,
        })
    }

    /// Fetches `id` (already claimed in the loaded set) and, while
    /// `depth < depth_limit`, its subcategories.
    ///
    /// `lineage` holds `id` and its ancestors; listed ids found there are
    /// dropped so a category cycle cannot recurse.
    fn fetch_level(
        &self,
        id: NodeId,
        depth: usize,
        depth_limit: usize,
        lineage: Vec<NodeId>,
    ) -> BoxFuture<'_, Result<(Level, LevelStats), FetchError>> {
        Box::pin(async move {
            let listing = self
                .fetcher
                .fetch_children(id, &self.config.locale, self.config.include_metadata)
                .await?;
            let mut stats = LevelStats {
                fetches: 1,
                max_depth: depth,
                ..LevelStats::default()
            };

            let (mut children, pages) = partition_listing(listing, id);
            children.retain(|child| !lineage.contains(&child.id));

            if depth < depth_limit && !children.is_empty() {
                let claimed = self.claim_children(&children, &mut stats).await;
                let sublevels = join_all(claimed.iter().map(|claim| {
                    let mut child_lineage = lineage.clone();
                    child_lineage.push(claim.id());
                    self.fetch_level(claim.id(), depth + 1, depth_limit, child_lineage)
                }))
                .await;

                for (claim, result) in claimed.into_iter().zip(sublevels) {
                    match result {
                        Ok((sublevel, substats)) => {
                            stats.absorb(substats);
                            self.land_sublevel(&mut children, claim, sublevel).await;
                        }
                        Err(error) => {
                            stats.failures += 1;
                            self.record_failure(&children, claim, &error).await;
                        }
                    }
                }
            }

            Ok((Level { children, pages }, stats))
        })
    }

    /// Claims every child that is neither expanded nor loading.
    async fn claim_children(
        &self,
        children: &[TreeNode],
        stats: &mut LevelStats,
    ) -> Vec<LoadClaim> {
        let tree = self.tree.read().await;
        let mut loaded = self.loaded.lock().await;
        let mut claimed = Vec::new();
        for child in children {
            let known_children = tree.get(child.id).is_some_and(TreeNode::has_children);
            if known_children || !loaded.begin(child.id) {
                stats.skipped += 1;
                continue;
            }
            claimed.push(LoadClaim::new(&self.loaded, child.id));
        }
        claimed
    }

    /// Stages a prefetched child's own children and attaches them to the child.
    async fn land_sublevel(&self, children: &mut [TreeNode], claim: LoadClaim, sublevel: Level) {
        let Some(child) = children.iter_mut().find(|child| child.id == claim.id()) else {
            return;
        };
        child.fold_pages(&sublevel.pages);
        child.children = sublevel.children.iter().map(|grandchild| grandchild.id).collect();

        self.tree.write().await.stage(sublevel.children);
        claim.finish().await;
    }

    async fn record_failure(&self, children: &[TreeNode], claim: LoadClaim, error: &FetchError) {
        let child_id = claim.id();
        claim.fail().await;
        let name = children
            .iter()
            .find(|child| child.id == child_id)
            .map_or_else(|| child_id.to_string(), |child| child.name.clone());
        warn!(node = %child_id, error = %error, "prefetch of subtree failed");
        self.notices.lock().await.push(Notice {
            node: child_id,
            name,
            message: error.to_string(),
        });
    }

    /// Selects or deselects exactly one node.
    ///
    /// Selecting a not yet loaded leaf category directly below the explored
    /// category first fetches its listing so its articles are known.
    ///
    /// # Errors
    ///
    /// Returns [`ExplorerError::Fetch`] if that eager fetch fails (nothing is
    /// selected), or [`ExplorerError::Tree`] for an unknown node.
    #[instrument(skip(self), fields(node = %id))]
    pub async fn toggle(&self, id: NodeId, selected: bool) -> Result<ToggleOutcome, ExplorerError> {
        let eager = if selected {
            self.claim_eager_fetch(id).await?
        } else {
            None
        };
        if let Some(claim) = eager {
            match self.fetcher.fetch_children(id, &self.config.locale, true).await {
                Ok(listing) => {
                    let (children, pages) = partition_listing(listing, id);
                    {
                        let mut tree = self.tree.write().await;
                        tree.record_pages(id, &pages)?;
                        tree.merge(id, children)?;
                    }
                    claim.finish().await;
                    debug!(pages = pages.len(), "eagerly loaded first-level category");
                }
                Err(source) => {
                    claim.fail().await;
                    warn!(error = %source, "eager fetch before selection failed");
                    return Err(ExplorerError::Fetch { node: id, source });
                }
            }
        }

        let tree = self.tree.read().await;
        let outcome = self.selection.write().await.toggle(&tree, id, selected)?;
        debug!(?outcome, "toggled selection");
        Ok(outcome)
    }

    async fn claim_eager_fetch(&self, id: NodeId) -> Result<Option<LoadClaim>, ExplorerError> {
        let tree = self.tree.read().await;
        let node = tree.node(id)?;
        if node.is_branch || node.has_children() || !tree.is_first_level(id) {
            return Ok(None);
        }
        let claimed = self.loaded.lock().await.begin(id);
        Ok(claimed.then(|| LoadClaim::new(&self.loaded, id)))
    }

    /// Derived checkbox state of `id`.
    pub async fn visual_state(&self, id: NodeId) -> VisualState {
        let tree = self.tree.read().await;
        self.selection.read().await.visual_state(&tree, id)
    }

    /// Whether `id` is selected while a direct child branch was never fetched.
    pub async fn is_incomplete(&self, id: NodeId) -> bool {
        let tree = self.tree.read().await;
        let selection = self.selection.read().await;
        let loaded = self.loaded.lock().await;
        selection.is_incomplete(&tree, &loaded, id)
    }

    /// Whether `id` is explicitly selected.
    pub async fn is_selected(&self, id: NodeId) -> bool {
        self.selection.read().await.is_selected(id)
    }

    /// Articles of the selected nodes and their known descendants.
    pub async fn selected_articles(&self) -> ArticleBag {
        let tree = self.tree.read().await;
        self.selection.read().await.selected_articles(&tree)
    }

    /// Cheap copy of the current tree (node storage is shared).
    pub async fn tree(&self) -> CategoryTree {
        self.tree.read().await.clone()
    }

    /// Copy of the current selection.
    pub async fn selection(&self) -> SelectionTracker {
        self.selection.read().await.clone()
    }

    /// Copy of the loaded set.
    pub async fn loaded(&self) -> LoadedSet {
        self.loaded.lock().await.clone()
    }

    /// Fetch state of `id` for display.
    pub async fn node_state(&self, id: NodeId) -> NodeState {
        if self
            .tree
            .read()
            .await
            .get(id)
            .is_some_and(TreeNode::has_children)
        {
            return NodeState::Expanded;
        }
        match self.loaded.lock().await.state(id) {
            Some(LoadState::Loading) => NodeState::Loading,
            Some(LoadState::Expanded) => NodeState::Expanded,
            None => NodeState::Unexpanded,
        }
    }

    /// Drains accumulated background failure notices.
    pub async fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().await)
    }
}
