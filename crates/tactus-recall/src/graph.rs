//! The recall graph: explicit owner of containers, recalls, recall ids and
//! recycling contexts.

use crate::arena::Arena;
use crate::container::{Recall, RecallContainer, RecallEntry, RecallQuery};
use crate::context::RecyclingContext;
use crate::ids::{
    AttachPoint, ContainerId, ContextId, RecallHandle, RecallId, RecallKind, RecyclingId,
};
use crate::processor::{RecallProcessor, StageIo};
use crate::{Error, Result};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use std::collections::HashSet;
use std::sync::Arc;
use tactus_core::{SoundScope, Stage};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct RecallIdEntry {
    context: ContextId,
    scope: SoundScope,
}

type SharedRecall = Arc<Mutex<Recall>>;

/// Arenas are locked only long enough to clone an `Arc` out or in; the
/// per-object locks (container lists, context edges, recall state) are never
/// taken while an arena lock is held for writing.
#[derive(Default)]
pub struct RecallGraph {
    containers: RwLock<Arena<Arc<RecallContainer>>>,
    recalls: RwLock<Arena<SharedRecall>>,
    recall_ids: RwLock<Arena<RecallIdEntry>>,
    contexts: RwLock<Arena<Arc<RecyclingContext>>>,
    by_attach: DashMap<AttachPoint, SmallVec<[ContainerId; 2]>>,
    pending: Mutex<Vec<ContextId>>,
}

impl RecallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- containers -----------------------------------------------------

    /// Create a container at `point` holding `template` as its audio-level
    /// template.
    pub fn attach(
        &self,
        point: impl Into<AttachPoint>,
        template: Box<dyn RecallProcessor>,
    ) -> ContainerId {
        let point = point.into();
        let id = ContainerId(
            self.containers
                .write()
                .insert_with(|idx| Arc::new(RecallContainer::new(ContainerId(idx), point))),
        );
        self.by_attach.entry(point).or_default().push(id);

        let handle = self.insert_recall(id, RecallKind::Audio, None, template);
        if let Ok(container) = self.container(id) {
            container.push(
                RecallKind::Audio,
                RecallEntry {
                    handle,
                    recall_id: None,
                },
            );
        }
        tracing::debug!(?point, ?id, "recall container attached");
        id
    }

    /// Cancel and free every recall of `container`, then the container.
    pub fn detach(&self, container: ContainerId) -> Result<usize> {
        let removed = self
            .containers
            .write()
            .remove(container.0)
            .ok_or(Error::ContainerNotFound(container))?;

        if let Some(mut list) = self.by_attach.get_mut(&removed.attach) {
            list.retain(|c| *c != container);
        }
        self.by_attach
            .remove_if(&removed.attach, |_, list| list.is_empty());

        let entries: Vec<RecallEntry> = removed.lists.lock().iter().map(|(_, e)| *e).collect();
        let mut recalls = Vec::with_capacity(entries.len());
        {
            let mut arena = self.recalls.write();
            for entry in &entries {
                if let Some(recall) = arena.remove(entry.handle.0) {
                    recalls.push(recall);
                }
            }
        }
        for recall in &recalls {
            recall.lock().cancel();
        }
        tracing::debug!(?container, recalls = recalls.len(), "recall container detached");
        Ok(recalls.len())
    }

    pub fn container(&self, id: ContainerId) -> Result<Arc<RecallContainer>> {
        self.containers
            .read()
            .get(id.0)
            .cloned()
            .ok_or(Error::ContainerNotFound(id))
    }

    pub fn container_by_uuid(&self, uuid: Uuid) -> Option<ContainerId> {
        self.containers
            .read()
            .iter()
            .find(|(_, c)| c.uuid == uuid)
            .map(|(_, c)| c.id)
    }

    pub fn containers_at(&self, point: impl Into<AttachPoint>) -> Vec<ContainerId> {
        self.by_attach
            .get(&point.into())
            .map(|list| list.to_vec())
            .unwrap_or_default()
    }

    pub fn container_count(&self) -> usize {
        self.containers.read().len()
    }

    fn insert_recall(
        &self,
        container: ContainerId,
        kind: RecallKind,
        recall_id: Option<RecallId>,
        processor: Box<dyn RecallProcessor>,
    ) -> RecallHandle {
        RecallHandle(self.recalls.write().insert_with(|idx| {
            Arc::new(Mutex::new(Recall {
                handle: RecallHandle(idx),
                kind,
                container,
                recall_id,
                processor,
                cancelled: false,
            }))
        }))
    }

    /// Add a channel-level template, or the audio-level one if missing.
    pub fn add_template(
        &self,
        container: ContainerId,
        kind: RecallKind,
        processor: Box<dyn RecallProcessor>,
    ) -> Result<RecallHandle> {
        let target = self.container(container)?;
        let occupied = kind == RecallKind::Audio && target.recall_audio().is_some();
        if !kind.is_template() || occupied {
            return Err(Error::InvalidKind(kind));
        }
        let handle = self.insert_recall(container, kind, None, processor);
        target.push(
            kind,
            RecallEntry {
                handle,
                recall_id: None,
            },
        );
        Ok(handle)
    }

    /// Add a run instance directly, bypassing the templates.
    pub fn add_run(
        &self,
        container: ContainerId,
        kind: RecallKind,
        recall_id: RecallId,
        processor: Box<dyn RecallProcessor>,
    ) -> Result<RecallHandle> {
        let target = self.container(container)?;
        if kind.is_template() {
            return Err(Error::InvalidKind(kind));
        }
        self.resolve(recall_id)?;
        let handle = self.insert_recall(container, kind, Some(recall_id), processor);
        target.push(
            kind,
            RecallEntry {
                handle,
                recall_id: Some(recall_id),
            },
        );
        Ok(handle)
    }

    /// Remove one recall from its container. Instances are cancelled first.
    pub fn remove(&self, container: ContainerId, recall: RecallHandle) -> Result<()> {
        let target = self.container(container)?;
        if !target.lists.lock().remove(recall) {
            return Err(Error::RecallNotFound(recall));
        }
        let removed = self.recalls.write().remove(recall.0);
        if let Some(removed) = removed {
            removed.lock().cancel();
        }
        Ok(())
    }

    /// Clone every template of `container` into instances bound to
    /// `recall_id`. Templates already instantiated for it are skipped.
    pub fn instantiate(
        &self,
        container: ContainerId,
        recall_id: RecallId,
    ) -> Result<Vec<RecallHandle>> {
        let target = self.container(container)?;
        self.resolve(recall_id)?;

        let (templates, existing) = {
            let lists = target.lists.lock();
            let templates: Vec<(RecallKind, RecallHandle)> = lists
                .iter()
                .filter(|(kind, _)| kind.is_template())
                .map(|(kind, e)| (kind, e.handle))
                .collect();
            let existing = lists
                .iter()
                .any(|(kind, e)| !kind.is_template() && e.recall_id == Some(recall_id));
            (templates, existing)
        };
        if existing {
            return self.find(container, &RecallQuery::any().recall_id(recall_id));
        }

        let mut created = Vec::with_capacity(templates.len());
        for (kind, template) in templates {
            let shared = self.recall(template)?;
            let processor = dyn_clone::clone_box(&*shared.lock().processor);
            let run_kind = kind.run_kind();
            let handle = self.insert_recall(container, run_kind, Some(recall_id), processor);
            target.push(
                run_kind,
                RecallEntry {
                    handle,
                    recall_id: Some(recall_id),
                },
            );
            created.push(handle);
        }
        tracing::trace!(?container, ?recall_id, count = created.len(), "instantiated recalls");
        Ok(created)
    }

    pub fn recall(&self, handle: RecallHandle) -> Result<Arc<Mutex<Recall>>> {
        self.recalls
            .read()
            .get(handle.0)
            .cloned()
            .ok_or(Error::RecallNotFound(handle))
    }

    pub fn recall_count(&self) -> usize {
        self.recalls.read().len()
    }

    /// Recalls of `container` matching `query`, templates first.
    pub fn find(&self, container: ContainerId, query: &RecallQuery) -> Result<Vec<RecallHandle>> {
        let target = self.container(container)?;
        let lists = target.lists.lock();
        Ok(lists
            .iter()
            .filter(|(kind, e)| query.matches(*kind, e))
            .map(|(_, e)| e.handle)
            .collect())
    }

    /// Drop cancelled instances everywhere. Returns how many were freed.
    pub fn purge_cancelled(&self) -> usize {
        let ids: Vec<ContainerId> = self.containers.read().iter().map(|(_, c)| c.id).collect();
        ids.into_iter().map(|c| self.purge_container(c)).sum()
    }

    fn purge_container(&self, container: ContainerId) -> usize {
        let Ok(target) = self.container(container) else {
            return 0;
        };
        let candidates: Vec<RecallHandle> = target
            .lists
            .lock()
            .iter()
            .filter(|(kind, _)| !kind.is_template())
            .map(|(_, e)| e.handle)
            .collect();

        let cancelled: Vec<RecallHandle> = candidates
            .into_iter()
            .filter(|h| self.recall(*h).map_or(true, |r| r.lock().cancelled))
            .collect();
        if cancelled.is_empty() {
            return 0;
        }

        {
            let mut lists = target.lists.lock();
            for handle in &cancelled {
                lists.remove(*handle);
            }
        }
        let mut arena = self.recalls.write();
        for handle in &cancelled {
            arena.remove(handle.0);
        }
        cancelled.len()
    }

    // ---- recall ids and recycling contexts ------------------------------

    /// Create a context under `parent` for `scope` and mint its recall id.
    ///
    /// The new context starts with a copy of the parent's recycling array, or
    /// with `replacement` if given. A replacement longer than the parent's
    /// array is a programming error and panics.
    pub fn create_context(
        &self,
        parent: Option<ContextId>,
        scope: SoundScope,
        replacement: Option<Vec<RecyclingId>>,
    ) -> Result<ContextId> {
        let parent_ctx = parent.map(|p| self.context(p)).transpose()?;

        let recycling = match (replacement, &parent_ctx) {
            (Some(array), Some(parent)) => {
                let parent_len = parent.len();
                assert!(
                    array.len() <= parent_len,
                    "child recycling array ({}) longer than parent's ({})",
                    array.len(),
                    parent_len
                );
                array
            }
            (Some(array), None) => array,
            (None, Some(parent)) => (**parent.recycling.load()).clone(),
            (None, None) => Vec::new(),
        };
        if recycling.is_empty() {
            return Err(Error::EmptyRecycling);
        }

        let id = {
            let mut contexts = self.contexts.write();
            let mut recall_ids = self.recall_ids.write();
            ContextId(contexts.insert_with(|idx| {
                let ctx = ContextId(idx);
                let recall_id = RecallId(recall_ids.insert(RecallIdEntry {
                    context: ctx,
                    scope,
                }));
                Arc::new(RecyclingContext::new(ctx, recall_id, scope, parent, recycling))
            }))
        };

        if let Some(parent) = parent_ctx {
            parent.edges.lock().children.push(id);
        }
        tracing::trace!(?id, ?parent, %scope, "recycling context created");
        Ok(id)
    }

    pub fn context(&self, id: ContextId) -> Result<Arc<RecyclingContext>> {
        self.contexts
            .read()
            .get(id.0)
            .cloned()
            .ok_or(Error::ContextNotFound(id))
    }

    pub fn context_count(&self) -> usize {
        self.contexts.read().len()
    }

    pub fn recall_id_of(&self, context: ContextId) -> Result<RecallId> {
        Ok(self.context(context)?.recall_id)
    }

    /// Context and scope a recall id joins.
    pub fn resolve(&self, recall_id: RecallId) -> Result<(ContextId, SoundScope)> {
        self.recall_ids
            .read()
            .get(recall_id.0)
            .map(|e| (e.context, e.scope))
            .ok_or(Error::RecallIdNotFound(recall_id))
    }

    /// Published recycling array of `context`.
    pub fn recyclings(&self, context: ContextId) -> Result<Arc<Vec<RecyclingId>>> {
        Ok(self.context(context)?.recycling())
    }

    fn mark_pending(&self, context: ContextId) {
        let mut pending = self.pending.lock();
        if !pending.contains(&context) {
            pending.push(context);
        }
    }

    fn parent_len(&self, ctx: &RecyclingContext) -> Option<usize> {
        let parent = ctx.edges.lock().parent?;
        self.context(parent).ok().map(|p| p.len())
    }

    /// Stage replacing the entry at `position`. Returns the old entry.
    pub fn replace(
        &self,
        context: ContextId,
        position: usize,
        recycling: RecyclingId,
    ) -> Result<RecyclingId> {
        let ctx = self.context(context)?;
        let old = {
            let mut edges = ctx.edges.lock();
            ctx.stage(&mut edges, |array| {
                let len = array.len();
                array
                    .get_mut(position)
                    .map(|slot| std::mem::replace(slot, recycling))
                    .ok_or(Error::PositionOutOfRange { position, len })
            })?
        };
        self.mark_pending(context);
        Ok(old)
    }

    /// Stage inserting `recycling` before `position`.
    pub fn insert(
        &self,
        context: ContextId,
        position: usize,
        recycling: RecyclingId,
    ) -> Result<()> {
        let ctx = self.context(context)?;
        let parent_len = self.parent_len(&ctx);
        {
            let mut edges = ctx.edges.lock();
            ctx.stage(&mut edges, |array| {
                let len = array.len();
                if position > len {
                    return Err(Error::PositionOutOfRange { position, len });
                }
                if let Some(parent_len) = parent_len {
                    assert!(
                        len < parent_len,
                        "child recycling array would outgrow its parent ({parent_len})"
                    );
                }
                array.insert(position, recycling);
                Ok(())
            })?;
        }
        self.mark_pending(context);
        Ok(())
    }

    /// Stage appending `recycling`.
    pub fn add(&self, context: ContextId, recycling: RecyclingId) -> Result<()> {
        let len = self.context(context)?.len();
        self.insert(context, len, recycling)
    }

    /// Stage removing `recycling`. Returns its position.
    pub fn remove_recycling(&self, context: ContextId, recycling: RecyclingId) -> Result<usize> {
        let ctx = self.context(context)?;
        let children: Vec<Arc<RecyclingContext>> = ctx
            .children()
            .into_iter()
            .filter_map(|c| self.context(c).ok())
            .collect();
        let longest_child = children.iter().map(|c| c.len()).max().unwrap_or(0);

        let position = {
            let mut edges = ctx.edges.lock();
            ctx.stage(&mut edges, |array| {
                let position = array
                    .iter()
                    .position(|r| *r == recycling)
                    .ok_or(Error::RecyclingNotFound(recycling))?;
                if array.len() == 1 {
                    return Err(Error::EmptyRecycling);
                }
                if longest_child > array.len() - 1 {
                    return Err(Error::ChildLengthExceeded);
                }
                array.remove(position);
                Ok(position)
            })?
        };
        self.mark_pending(context);
        Ok(position)
    }

    /// Publish every staged edit. Call between stages. Returns the number of
    /// contexts whose array changed.
    pub fn commit_pending(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending.lock());
        pending
            .into_iter()
            .filter_map(|id| self.context(id).ok())
            .filter(|ctx| ctx.commit())
            .count()
    }

    /// Publish the staged edits of contexts in `scope` only. Edits of other
    /// scopes stay pending, since their passes may be mid-stage.
    pub fn commit_scope(&self, scope: SoundScope) -> usize {
        let ready: Vec<Arc<RecyclingContext>> = {
            let mut pending = self.pending.lock();
            let mut ready = Vec::new();
            pending.retain(|id| match self.context(*id) {
                Ok(ctx) if ctx.scope() == scope => {
                    ready.push(ctx);
                    false
                }
                Ok(_) => true,
                Err(_) => false,
            });
            ready
        };
        ready.into_iter().filter(|ctx| ctx.commit()).count()
    }

    /// Position of `recycling` in the published array.
    pub fn find_recycling(
        &self,
        context: ContextId,
        recycling: RecyclingId,
    ) -> Result<Option<usize>> {
        Ok(self
            .context(context)?
            .recycling
            .load()
            .iter()
            .position(|r| *r == recycling))
    }

    /// Recall id of the first child whose array holds `recycling`.
    pub fn find_child_recall_id(
        &self,
        context: ContextId,
        recycling: RecyclingId,
    ) -> Result<Option<RecallId>> {
        let ctx = self.context(context)?;
        Ok(ctx
            .children()
            .into_iter()
            .filter_map(|c| self.context(c).ok())
            .find(|c| c.contains(recycling))
            .map(|c| c.recall_id))
    }

    /// Recall id of the nearest ancestor whose array holds `recycling`.
    pub fn find_parent_recall_id(
        &self,
        context: ContextId,
        recycling: RecyclingId,
    ) -> Result<Option<RecallId>> {
        let mut current = self.context(context)?.parent();
        while let Some(id) = current {
            let ctx = self.context(id)?;
            if ctx.contains(recycling) {
                return Ok(Some(ctx.recall_id));
            }
            current = ctx.parent();
        }
        Ok(None)
    }

    pub fn child_recall_ids(&self, context: ContextId) -> Result<Vec<RecallId>> {
        Ok(self
            .context(context)?
            .children()
            .into_iter()
            .filter_map(|c| self.context(c).ok())
            .map(|c| c.recall_id)
            .collect())
    }

    /// Root of the tree `context` belongs to.
    pub fn toplevel(&self, context: ContextId) -> Result<ContextId> {
        let mut ctx = self.context(context)?;
        while let Some(parent) = ctx.parent() {
            ctx = self.context(parent)?;
        }
        Ok(ctx.id)
    }

    fn subtree(&self, root: &Arc<RecyclingContext>) -> Vec<Arc<RecyclingContext>> {
        let mut out = vec![Arc::clone(root)];
        let mut i = 0;
        while i < out.len() {
            let children = out[i].children();
            out.extend(children.into_iter().filter_map(|c| self.context(c).ok()));
            i += 1;
        }
        out
    }

    /// Remove `context` and its descendants, cancelling every recall bound to
    /// their recall ids. The parent's recycling array is untouched. Returns
    /// the number of recalls cancelled.
    pub fn remove_context(&self, context: ContextId) -> Result<usize> {
        let ctx = self.context(context)?;
        let subtree = self.subtree(&ctx);

        if let Some(parent) = ctx.parent() {
            if let Ok(parent) = self.context(parent) {
                parent.edges.lock().children.retain(|c| *c != context);
            }
        }

        let recall_ids: HashSet<RecallId> = subtree.iter().map(|c| c.recall_id).collect();
        {
            let mut contexts = self.contexts.write();
            let mut ids = self.recall_ids.write();
            for member in &subtree {
                contexts.remove(member.id.0);
                ids.remove(member.recall_id.0);
            }
        }

        let recalls: Vec<SharedRecall> = self
            .recalls
            .read()
            .iter()
            .map(|(_, r)| Arc::clone(r))
            .collect();
        let cancelled = recalls
            .iter()
            .filter(|r| {
                let mut recall = r.lock();
                recall
                    .recall_id
                    .is_some_and(|id| recall_ids.contains(&id))
                    && recall.cancel()
            })
            .count();

        tracing::debug!(
            ?context,
            contexts = subtree.len(),
            cancelled,
            "recycling context removed"
        );
        Ok(cancelled)
    }

    // ---- execution ------------------------------------------------------

    /// Run every live instance at `point` bound to `recall_id` for `io.stage`.
    ///
    /// [`Stage::Cancel`] cancels the instances; [`Stage::Remove`] frees the
    /// cancelled ones. Returns the number of instances that ran.
    pub fn run_stage(
        &self,
        point: impl Into<AttachPoint>,
        recall_id: RecallId,
        io: &mut StageIo<'_>,
    ) -> Result<usize> {
        self.resolve(recall_id)?;
        let containers = self.containers_at(point);
        let mut ran = 0;

        for container in &containers {
            let Ok(target) = self.container(*container) else {
                continue;
            };
            let handles: SmallVec<[RecallHandle; 8]> = target
                .lists
                .lock()
                .iter()
                .filter(|(kind, e)| !kind.is_template() && e.recall_id == Some(recall_id))
                .map(|(_, e)| e.handle)
                .collect();

            for handle in handles {
                let Ok(shared) = self.recall(handle) else {
                    continue;
                };
                let mut recall = shared.lock();
                if recall.cancelled || !recall.processor.accepts(io.scope) {
                    continue;
                }
                match io.stage {
                    Stage::Cancel => {
                        recall.cancel();
                    }
                    Stage::Remove => {}
                    _ => {
                        recall.processor.run(io);
                        ran += 1;
                    }
                }
            }
        }

        if io.stage == Stage::Remove {
            for container in containers {
                self.purge_container(container);
            }
        }
        Ok(ran)
    }
}
