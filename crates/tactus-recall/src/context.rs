//! Recycling contexts: the tree of sub-mixes recalls are instantiated for.

use crate::ids::{ContextId, RecallId, RecyclingId};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;
use tactus_core::SoundScope;

pub(crate) struct ContextEdges {
    pub(crate) parent: Option<ContextId>,
    pub(crate) children: Vec<ContextId>,
    /// Edits not yet visible to running passes.
    pub(crate) staged: Option<Vec<RecyclingId>>,
}

/// One node of the recycling-context tree.
///
/// Running passes read the published array without locking; edits are
/// staged and become visible at the next stage boundary.
pub struct RecyclingContext {
    pub(crate) id: ContextId,
    pub(crate) recall_id: RecallId,
    pub(crate) scope: SoundScope,
    pub(crate) recycling: ArcSwap<Vec<RecyclingId>>,
    pub(crate) edges: Mutex<ContextEdges>,
}

impl RecyclingContext {
    pub(crate) fn new(
        id: ContextId,
        recall_id: RecallId,
        scope: SoundScope,
        parent: Option<ContextId>,
        recycling: Vec<RecyclingId>,
    ) -> Self {
        Self {
            id,
            recall_id,
            scope,
            recycling: ArcSwap::from_pointee(recycling),
            edges: Mutex::new(ContextEdges {
                parent,
                children: Vec::new(),
                staged: None,
            }),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn recall_id(&self) -> RecallId {
        self.recall_id
    }

    pub fn scope(&self) -> SoundScope {
        self.scope
    }

    /// Published recycling array.
    pub fn recycling(&self) -> Arc<Vec<RecyclingId>> {
        self.recycling.load_full()
    }

    pub fn parent(&self) -> Option<ContextId> {
        self.edges.lock().parent
    }

    pub fn children(&self) -> Vec<ContextId> {
        self.edges.lock().children.clone()
    }

    /// Length including staged edits.
    pub fn len(&self) -> usize {
        let edges = self.edges.lock();
        self.staged_len(&edges)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn staged_len(&self, edges: &ContextEdges) -> usize {
        edges
            .staged
            .as_ref()
            .map_or_else(|| self.recycling.load().len(), Vec::len)
    }

    pub(crate) fn contains(&self, recycling: RecyclingId) -> bool {
        self.recycling.load().contains(&recycling)
    }

    /// Apply `edit` to the staged array, starting from the published one.
    pub(crate) fn stage<R>(
        &self,
        edges: &mut ContextEdges,
        edit: impl FnOnce(&mut Vec<RecyclingId>) -> R,
    ) -> R {
        let staged = edges
            .staged
            .get_or_insert_with(|| (**self.recycling.load()).clone());
        edit(staged)
    }

    /// Publish staged edits. Returns whether anything changed.
    pub(crate) fn commit(&self) -> bool {
        let staged = self.edges.lock().staged.take();
        match staged {
            Some(array) => {
                self.recycling.store(Arc::new(array));
                true
            }
            None => false,
        }
    }
}
