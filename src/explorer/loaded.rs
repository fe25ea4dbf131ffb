//! Bookkeeping of which nodes have been fetched.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::tree::NodeId;

/// Fetch state of a node that has left the unexpanded state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// A fetch is in flight.
    Loading,
    /// The listing was fetched and merged, possibly with zero results.
    Expanded,
}

/// Nodes that are being fetched or were fetched already.
///
/// Absent nodes are unexpanded. A failed fetch removes the entry again so the
/// node can be retried.
#[derive(Debug, Clone, Default)]
pub struct LoadedSet {
    states: HashMap<NodeId, LoadState>,
}

impl LoadedSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state, `None` when unexpanded.
    #[must_use]
    pub fn state(&self, id: NodeId) -> Option<LoadState> {
        self.states.get(&id).copied()
    }

    /// True when loading or expanded.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.states.contains_key(&id)
    }

    /// True once a fetch for `id` completed.
    #[must_use]
    pub fn is_expanded(&self, id: NodeId) -> bool {
        self.state(id) == Some(LoadState::Expanded)
    }

    /// Claims `id` for fetching. Returns false when it is already loading or expanded.
    pub fn begin(&mut self, id: NodeId) -> bool {
        if self.states.contains_key(&id) {
            return false;
        }
        self.states.insert(id, LoadState::Loading);
        true
    }

    /// Records a completed fetch.
    pub fn finish(&mut self, id: NodeId) {
        self.states.insert(id, LoadState::Expanded);
    }

    /// Returns a loading node to unexpanded. Expanded nodes are left alone.
    pub fn fail(&mut self, id: NodeId) {
        if self.state(id) == Some(LoadState::Loading) {
            self.states.remove(&id);
        }
    }

    /// Marks a node expanded without a fetch (e.g. the explored category itself).
    pub fn mark_expanded(&mut self, id: NodeId) {
        self.finish(id);
    }

    /// Number of loading or expanded nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True when nothing was fetched yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// A `Loading` entry owned by one fetch.
///
/// Settle it with [`LoadClaim::finish`] or [`LoadClaim::fail`]. A claim
/// dropped unsettled (an early return or a cancelled future) puts the node
/// back to unexpanded.
pub(crate) struct LoadClaim {
    loaded: Arc<Mutex<LoadedSet>>,
    id: NodeId,
    settled: bool,
}

impl LoadClaim {
    /// Wraps an entry that was just moved to `Loading` with [`LoadedSet::begin`].
    pub(crate) fn new(loaded: &Arc<Mutex<LoadedSet>>, id: NodeId) -> Self {
        Self {
            loaded: Arc::clone(loaded),
            id,
            settled: false,
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    /// Records the fetch as completed.
    pub(crate) async fn finish(mut self) {
        self.loaded.lock().await.finish(self.id);
        self.settled = true;
    }

    /// Returns the node to unexpanded.
    pub(crate) async fn fail(mut self) {
        self.loaded.lock().await.fail(self.id);
        self.settled = true;
    }
}

impl Drop for LoadClaim {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        debug!(node = %self.id, "releasing abandoned fetch claim");
        if let Ok(mut loaded) = self.loaded.try_lock() {
            loaded.fail(self.id);
            return;
        }
        // Contended: release from a task once the lock frees up.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let loaded = Arc::clone(&self.loaded);
            let id = self.id;
            handle.spawn(async move {
                loaded.lock().await.fail(id);
            });
        }
    }
}
