//! The thread tree: construction, topology changes and dispatch.

use crate::handler::{NoopHandler, StageHandler};
use crate::node::{Command, Node, NodeId, NodeRole, NodeState, ScopeStats};
use crate::worker::{release, wait_done, worker_loop};
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tactus_core::{SoundScope, StagingProgram};
use thread_priority::ThreadPriority;

pub const DEFAULT_HANG_CHECK: Duration = Duration::from_secs(2);

struct NodeSlot {
    generation: u32,
    node: Option<Arc<Node>>,
}

#[derive(Default)]
struct NodeSlots {
    slots: Vec<NodeSlot>,
    free: Vec<u32>,
}

impl NodeSlots {
    fn get(&self, id: NodeId) -> Option<Arc<Node>> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.clone())
    }

    /// Place the node built by `make` in a free slot, or a new one.
    fn insert_with(&mut self, make: impl FnOnce(NodeId) -> Arc<Node>) -> Arc<Node> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(NodeSlot {
                    generation: 0,
                    node: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        let node = make(NodeId::new(index, slot.generation));
        slot.node = Some(Arc::clone(&node));
        node
    }

    fn remove(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.get_mut(id.index()) {
            if slot.generation == id.generation() && slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index() as u32);
            }
        }
    }

    fn live(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.slots.iter().filter_map(|slot| slot.node.as_ref())
    }
}

pub(crate) struct TreeInner {
    nodes: RwLock<NodeSlots>,
    root: NodeId,
    scopes: Vec<SoundScope>,
    active: [AtomicBool; SoundScope::COUNT],
    dispatches: [AtomicU64; SoundScope::COUNT],
    dispatch_locks: [Mutex<()>; SoundScope::COUNT],
    pub(crate) hang_check: Duration,
    realtime_priority: bool,
    name_prefix: String,
    epoch: Instant,
    shut_down: AtomicBool,
}

impl TreeInner {
    pub(crate) fn node(&self, id: NodeId) -> Option<Arc<Node>> {
        self.nodes.read().get(id)
    }

    pub(crate) fn nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn is_enabled(&self, scope: SoundScope) -> bool {
        self.scopes.contains(&scope)
    }
}

/// Builder for [`ThreadTree`].
///
/// # Example
///
/// ```ignore
/// let tree = ThreadTree::builder()
///     .scopes(&[SoundScope::Playback, SoundScope::Sequencer])
///     .hang_check(Duration::from_millis(500))
///     .build(Arc::new(NoopHandler))?;
/// ```
pub struct ThreadTreeBuilder {
    scopes: Vec<SoundScope>,
    hang_check: Duration,
    realtime_priority: bool,
    name_prefix: String,
}

impl Default for ThreadTreeBuilder {
    fn default() -> Self {
        Self {
            scopes: SoundScope::ALL.to_vec(),
            hang_check: DEFAULT_HANG_CHECK,
            realtime_priority: true,
            name_prefix: "tactus".into(),
        }
    }
}

impl ThreadTreeBuilder {
    /// Default: all five scopes
    pub fn scopes(mut self, scopes: &[SoundScope]) -> Self {
        let mut scopes = scopes.to_vec();
        scopes.sort();
        scopes.dedup();
        self.scopes = scopes;
        self
    }

    /// Default: 2 s
    pub fn hang_check(mut self, interval: Duration) -> Self {
        self.hang_check = interval;
        self
    }

    /// Raise worker threads to maximum priority. Default: true
    pub fn realtime_priority(mut self, enabled: bool) -> Self {
        self.realtime_priority = enabled;
        self
    }

    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn build(self, root_handler: Arc<dyn StageHandler>) -> Result<ThreadTree> {
        let mut nodes = NodeSlots::default();
        let root_node = nodes.insert_with(|id| {
            Arc::new(Node::new(id, NodeRole::Root, None, root_handler, &self.scopes))
        });
        let root = root_node.id;

        let inner = Arc::new(TreeInner {
            nodes: RwLock::new(nodes),
            root,
            scopes: self.scopes,
            active: Default::default(),
            dispatches: Default::default(),
            dispatch_locks: Default::default(),
            hang_check: self.hang_check,
            realtime_priority: self.realtime_priority,
            name_prefix: self.name_prefix,
            epoch: Instant::now(),
            shut_down: AtomicBool::new(false),
        });
        for scope in &inner.scopes {
            inner.active[scope.index()].store(true, Ordering::Release);
        }

        let tree = ThreadTree { inner };
        tree.spawn_workers(&root_node)?;
        tracing::debug!(scopes = tree.inner.scopes.len(), "thread tree started");
        Ok(tree)
    }
}

/// Tree of long-lived worker threads mirroring the audio topology.
///
/// Every node runs one worker per enabled [`SoundScope`], so scopes never
/// block each other. A dispatch walks a scope's staging program from the
/// root down: for each stage a node runs its own handler, releases its
/// processing children into the same stage and waits until all of them are
/// done before it reports done itself.
pub struct ThreadTree {
    inner: Arc<TreeInner>,
}

impl ThreadTree {
    pub fn builder() -> ThreadTreeBuilder {
        ThreadTreeBuilder::default()
    }

    /// All scopes, no root work.
    pub fn new() -> Result<Self> {
        Self::builder().build(Arc::new(NoopHandler))
    }

    pub fn root(&self) -> NodeId {
        self.inner.root
    }

    pub fn scopes(&self) -> &[SoundScope] {
        &self.inner.scopes
    }

    fn spawn_workers(&self, node: &Arc<Node>) -> Result<()> {
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        for data in node.scopes() {
            let inner = Arc::clone(&self.inner);
            let worker_node = Arc::clone(node);
            let worker_data = Arc::clone(data);
            let realtime = self.inner.realtime_priority;
            let name = format!(
                "{}-{:?}{}-{}",
                self.inner.name_prefix,
                node.role,
                node.id.index(),
                data.scope
            )
            .to_lowercase();

            let spawned = thread::Builder::new().name(name).spawn(move || {
                if realtime {
                    let _ = thread_priority::set_current_thread_priority(ThreadPriority::Max);
                }
                worker_loop(inner, worker_node, worker_data);
            });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    for data in node.scopes() {
                        data.request_shutdown();
                    }
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(Error::Spawn(e));
                }
            }
        }

        node.workers.lock().extend(handles);
        Ok(())
    }

    fn lookup(&self, id: NodeId) -> Result<Arc<Node>> {
        self.inner.node(id).ok_or(Error::NodeNotFound(id))
    }

    /// Attach a new node under `parent` and start its workers.
    pub fn add_node(
        &self,
        parent: NodeId,
        role: NodeRole,
        handler: Arc<dyn StageHandler>,
    ) -> Result<NodeId> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(Error::ShutDown);
        }
        let parent_node = self.lookup(parent)?;

        let node = self.inner.nodes.write().insert_with(|id| {
            Arc::new(Node::new(id, role, Some(parent), handler, &self.inner.scopes))
        });

        if let Err(e) = self.spawn_workers(&node) {
            self.inner.nodes.write().remove(node.id);
            return Err(e);
        }

        // Linked only once its workers exist; a dispatch already in flight
        // picks it up from the next stage.
        parent_node.children.write().push(node.id);
        tracing::debug!(
            node = node.id.index(),
            parent = parent.index(),
            ?role,
            "thread node added"
        );
        Ok(node.id)
    }

    /// Detach `id` and its subtree, stop and join their workers.
    ///
    /// A parent waiting on the removed node is released. Must not be called
    /// from a stage handler of this tree.
    pub fn remove_node(&self, id: NodeId) -> Result<()> {
        if id == self.inner.root {
            return Err(Error::RootRemoval);
        }
        let node = self.lookup(id)?;

        if let Some(parent) = *node.parent.read() {
            if let Some(parent_node) = self.inner.node(parent) {
                parent_node.children.write().retain(|c| *c != id);
            }
        }

        let subtree = self.subtree(&node);
        for member in &subtree {
            for data in member.scopes() {
                data.request_shutdown();
            }
        }
        for member in &subtree {
            let handles: Vec<_> = member.workers.lock().drain(..).collect();
            for handle in handles {
                let _ = handle.join();
            }
        }

        let mut nodes = self.inner.nodes.write();
        for member in &subtree {
            nodes.remove(member.id);
        }
        tracing::debug!(node = id.index(), removed = subtree.len(), "thread subtree removed");
        Ok(())
    }

    fn subtree(&self, node: &Arc<Node>) -> Vec<Arc<Node>> {
        let mut out = vec![Arc::clone(node)];
        let mut i = 0;
        while i < out.len() {
            let children = out[i].children.read().clone();
            out.extend(children.into_iter().filter_map(|c| self.inner.node(c)));
            i += 1;
        }
        out
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.inner.node(id).is_some()
    }

    /// Live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.inner.nodes.read().live().count()
    }

    pub fn role(&self, id: NodeId) -> Result<NodeRole> {
        Ok(self.lookup(id)?.role)
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(*self.lookup(id)?.parent.read())
    }

    pub fn children(&self, id: NodeId) -> Result<Vec<NodeId>> {
        Ok(self.lookup(id)?.children.read().clone())
    }

    /// `id` and every node below it, breadth first.
    pub fn descendants(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let node = self.lookup(id)?;
        Ok(self.subtree(&node).iter().map(|n| n.id).collect())
    }

    /// Include or exclude `id`'s subtree from `scope`'s future stages.
    pub fn set_processing(&self, id: NodeId, scope: SoundScope, processing: bool) -> Result<()> {
        let node = self.lookup(id)?;
        let data = node.scope(scope).ok_or(Error::ScopeDisabled(scope))?;
        data.processing.store(processing, Ordering::Release);
        Ok(())
    }

    pub fn set_staging_program(
        &self,
        id: NodeId,
        scope: SoundScope,
        program: StagingProgram,
    ) -> Result<()> {
        let node = self.lookup(id)?;
        let data = node.scope(scope).ok_or(Error::ScopeDisabled(scope))?;
        *data.program.write() = program;
        Ok(())
    }

    /// Set `program` on every node for `scope`.
    pub fn set_staging_program_all(
        &self,
        scope: SoundScope,
        program: StagingProgram,
    ) -> Result<()> {
        if !self.inner.is_enabled(scope) {
            return Err(Error::ScopeDisabled(scope));
        }
        let nodes: Vec<Arc<Node>> = self.inner.nodes.read().live().cloned().collect();
        for node in nodes {
            if let Some(data) = node.scope(scope) {
                *data.program.write() = program.clone();
            }
        }
        Ok(())
    }

    pub fn staging_program(&self, id: NodeId, scope: SoundScope) -> Result<StagingProgram> {
        let node = self.lookup(id)?;
        let data = node.scope(scope).ok_or(Error::ScopeDisabled(scope))?;
        let program = data.program.read().clone();
        Ok(program)
    }

    /// Suppress or resume future dispatches of `scope`. A dispatch already in
    /// flight always runs to completion.
    pub fn set_scope_active(&self, scope: SoundScope, active: bool) -> Result<()> {
        if !self.inner.is_enabled(scope) {
            return Err(Error::ScopeDisabled(scope));
        }
        self.inner.active[scope.index()].store(active, Ordering::Release);
        tracing::debug!(%scope, active, "scope activity changed");
        Ok(())
    }

    pub fn is_scope_active(&self, scope: SoundScope) -> bool {
        self.inner.active[scope.index()].load(Ordering::Acquire)
    }

    /// Dispatches started for `scope` so far.
    pub fn dispatch_count(&self, scope: SoundScope) -> u64 {
        self.inner.dispatches[scope.index()].load(Ordering::Acquire)
    }

    /// Run `scope`'s staging program once across the tree, blocking until
    /// every node finished. Runs even if the scope is inactive.
    pub fn dispatch(&self, scope: SoundScope) -> Result<()> {
        self.dispatch_scopes(&[scope]).map(|_| ())
    }

    /// Run every given scope that is active, concurrently. Returns the scopes
    /// actually dispatched.
    pub fn dispatch_cycle(&self, scopes: &[SoundScope]) -> Result<Vec<SoundScope>> {
        let active: Vec<SoundScope> = scopes
            .iter()
            .copied()
            .filter(|s| self.inner.is_enabled(*s) && self.is_scope_active(*s))
            .collect();
        self.dispatch_scopes(&active)
    }

    fn dispatch_scopes(&self, scopes: &[SoundScope]) -> Result<Vec<SoundScope>> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(Error::ShutDown);
        }
        let mut scopes = scopes.to_vec();
        scopes.sort();
        scopes.dedup();

        let root = self.lookup(self.inner.root)?;
        let mut targets = Vec::with_capacity(scopes.len());
        // Locks taken in scope order so concurrent drivers cannot deadlock.
        let mut guards = Vec::with_capacity(scopes.len());

        for scope in &scopes {
            let data = root.scope(*scope).ok_or(Error::ScopeDisabled(*scope))?;
            guards.push(self.inner.dispatch_locks[scope.index()].lock());
            let cycle = self.inner.dispatches[scope.index()].fetch_add(1, Ordering::AcqRel) + 1;
            let target = release(data, Command::Program, cycle);
            targets.push((Arc::clone(data), target));
        }

        for (data, target) in &targets {
            wait_done(&self.inner, data, self.inner.root, *target);
        }
        drop(guards);
        Ok(scopes)
    }

    pub fn state(&self, id: NodeId, scope: SoundScope) -> Result<NodeState> {
        let node = self.lookup(id)?;
        let data = node.scope(scope).ok_or(Error::ScopeDisabled(scope))?;
        let state = data.sync.lock().state;
        Ok(state)
    }

    pub fn stats(&self, id: NodeId, scope: SoundScope) -> Result<ScopeStats> {
        let node = self.lookup(id)?;
        let data = node.scope(scope).ok_or(Error::ScopeDisabled(scope))?;
        Ok(data.stats())
    }

    /// Stop and join every worker. Further dispatches fail with [`Error::ShutDown`].
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let nodes: Vec<Arc<Node>> = self.inner.nodes.read().live().cloned().collect();
        for node in &nodes {
            for data in node.scopes() {
                data.request_shutdown();
            }
        }
        for node in &nodes {
            let handles: Vec<_> = node.workers.lock().drain(..).collect();
            for handle in handles {
                let _ = handle.join();
            }
        }
        tracing::debug!(nodes = nodes.len(), "thread tree shut down");
    }
}

impl Drop for ThreadTree {
    fn drop(&mut self) {
        self.shutdown();
    }
}
