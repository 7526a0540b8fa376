//! Thread nodes and their per-scope synchronization state.

use crate::handler::StageHandler;
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tactus_core::{SoundScope, Stage, StagingProgram};

/// Slot of a thread node in the tree. A removed node's slot is handed to the
/// next added node under a new generation, so stale ids stop resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// What a node drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    /// Top of the tree, released by the driver.
    Root,
    Audio,
    Channel,
}

/// Position of a (node, scope) pair in the stage cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Idle,
    WaitParent,
    Running,
    Done,
}

/// What a release asks the worker to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    /// One stage, issued by the parent.
    Stage(Stage),
    /// The node's whole staging program, issued by the driver to the root.
    Program,
}

pub(crate) struct ScopeSync {
    pub(crate) state: NodeState,
    pub(crate) command: Command,
    pub(crate) cycle: u64,
    /// Releases issued so far.
    pub(crate) generation: u64,
    /// Releases completed so far. `u64::MAX` once the worker has exited.
    pub(crate) done_generation: u64,
    pub(crate) shutdown: bool,
}

/// Snapshot of [`ScopeData`] counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeStats {
    /// Stages this node completed, own work and children included.
    pub stages_run: u64,
    /// Monotonic nanoseconds since tree creation at the last completion.
    pub last_completion_nanos: u64,
}

pub(crate) struct ScopeData {
    pub(crate) scope: SoundScope,
    pub(crate) sync: Mutex<ScopeSync>,
    /// Signalled by the parent on release.
    pub(crate) wait_cond: Condvar,
    /// Signalled by this node when a release completes.
    pub(crate) done_cond: Condvar,
    pub(crate) program: RwLock<StagingProgram>,
    pub(crate) processing: AtomicBool,
    stages_run: AtomicU64,
    last_completion_nanos: AtomicU64,
}

impl ScopeData {
    pub(crate) fn new(scope: SoundScope) -> Self {
        Self {
            scope,
            sync: Mutex::new(ScopeSync {
                state: NodeState::Idle,
                command: Command::Program,
                cycle: 0,
                generation: 0,
                done_generation: 0,
                shutdown: false,
            }),
            wait_cond: Condvar::new(),
            done_cond: Condvar::new(),
            program: RwLock::new(StagingProgram::default()),
            processing: AtomicBool::new(true),
            stages_run: AtomicU64::new(0),
            last_completion_nanos: AtomicU64::new(0),
        }
    }

    pub(crate) fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    pub(crate) fn record_completion(&self, nanos: u64) {
        self.stages_run.fetch_add(1, Ordering::Relaxed);
        self.last_completion_nanos.store(nanos, Ordering::Release);
    }

    pub(crate) fn stats(&self) -> ScopeStats {
        ScopeStats {
            stages_run: self.stages_run.load(Ordering::Relaxed),
            last_completion_nanos: self.last_completion_nanos.load(Ordering::Acquire),
        }
    }

    /// Ask the worker to exit and release anybody waiting on it.
    pub(crate) fn request_shutdown(&self) {
        let mut sync = self.sync.lock();
        sync.shutdown = true;
        self.wait_cond.notify_all();
        self.done_cond.notify_all();
    }
}

pub(crate) struct Node {
    pub(crate) id: NodeId,
    pub(crate) role: NodeRole,
    pub(crate) parent: RwLock<Option<NodeId>>,
    pub(crate) children: RwLock<Vec<NodeId>>,
    pub(crate) handler: Arc<dyn StageHandler>,
    scopes: [Option<Arc<ScopeData>>; SoundScope::COUNT],
    pub(crate) workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        role: NodeRole,
        parent: Option<NodeId>,
        handler: Arc<dyn StageHandler>,
        scopes: &[SoundScope],
    ) -> Self {
        let mut data: [Option<Arc<ScopeData>>; SoundScope::COUNT] = Default::default();
        for scope in scopes {
            data[scope.index()] = Some(Arc::new(ScopeData::new(*scope)));
        }
        Self {
            id,
            role,
            parent: RwLock::new(parent),
            children: RwLock::new(Vec::new()),
            handler,
            scopes: data,
            workers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn scope(&self, scope: SoundScope) -> Option<&Arc<ScopeData>> {
        self.scopes[scope.index()].as_ref()
    }

    pub(crate) fn scopes(&self) -> impl Iterator<Item = &Arc<ScopeData>> {
        self.scopes.iter().flatten()
    }
}
