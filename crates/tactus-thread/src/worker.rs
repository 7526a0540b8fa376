//! Worker loop and the two-phase stage barrier.
//!
//! A release bumps the child's `generation`; the child reports completion by
//! raising `done_generation` to the same value. Waiting on counters instead
//! of flags means a spurious or late wakeup can neither skip nor repeat a
//! stage.

use crate::handler::StageContext;
use crate::node::{Command, Node, NodeId, NodeState, ScopeData};
use crate::tree::TreeInner;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tactus_core::Stage;

/// Hand `command` to the worker behind `data`. Returns the generation to wait for.
pub(crate) fn release(data: &ScopeData, command: Command, cycle: u64) -> u64 {
    let mut sync = data.sync.lock();
    sync.command = command;
    sync.cycle = cycle;
    sync.generation += 1;
    if sync.done_generation != u64::MAX {
        sync.state = NodeState::WaitParent;
    }
    data.wait_cond.notify_all();
    sync.generation
}

/// Block until the worker behind `data` completed release `target`, logging
/// whenever a hang-check interval passes without progress.
pub(crate) fn wait_done(inner: &TreeInner, data: &ScopeData, node: NodeId, target: u64) {
    let started = Instant::now();
    let mut sync = data.sync.lock();
    while sync.done_generation < target {
        let timed_out = data
            .done_cond
            .wait_for(&mut sync, inner.hang_check)
            .timed_out();
        if timed_out && sync.done_generation < target {
            tracing::warn!(
                node = node.index(),
                scope = %data.scope,
                command = ?sync.command,
                waited_ms = started.elapsed().as_millis() as u64,
                "thread node has not reported done"
            );
        }
    }
    if sync.done_generation != u64::MAX {
        sync.state = NodeState::Idle;
    }
}

pub(crate) fn worker_loop(inner: Arc<TreeInner>, node: Arc<Node>, data: Arc<ScopeData>) {
    loop {
        let (command, cycle, target) = {
            let mut sync = data.sync.lock();
            loop {
                if sync.shutdown {
                    sync.done_generation = u64::MAX;
                    data.done_cond.notify_all();
                    tracing::trace!(node = node.id.index(), scope = %data.scope, "worker exiting");
                    return;
                }
                if sync.generation > sync.done_generation {
                    break;
                }
                data.wait_cond.wait(&mut sync);
            }
            sync.state = NodeState::Running;
            (sync.command, sync.cycle, sync.generation)
        };

        match command {
            Command::Stage(stage) => run_stage(&inner, &node, &data, stage, cycle),
            Command::Program => {
                let program = data.program.read().clone();
                let last_run = program.last_run();
                for stage in program.stages() {
                    run_stage(&inner, &node, &data, *stage, cycle);
                    stage_boundary(&node, &data, *stage, cycle, last_run == Some(*stage));
                }
            }
        }

        let mut sync = data.sync.lock();
        if sync.done_generation < target {
            sync.done_generation = target;
        }
        sync.state = NodeState::Done;
        data.done_cond.notify_all();
    }
}

/// The whole tree finished `stage`; nothing of this scope is running.
fn stage_boundary(node: &Node, data: &ScopeData, stage: Stage, cycle: u64, final_run: bool) {
    let ctx = StageContext {
        node: node.id,
        role: node.role,
        scope: data.scope,
        stage,
        cycle,
        final_run,
    };
    if catch_unwind(AssertUnwindSafe(|| node.handler.stage_complete(&ctx))).is_err() {
        tracing::error!(scope = %data.scope, ?stage, "stage boundary hook panicked");
    }
}

/// Own portion first, then every processing child, then wait for all of them.
fn run_stage(inner: &TreeInner, node: &Node, data: &ScopeData, stage: Stage, cycle: u64) {
    let (participates, final_run) = {
        let program = data.program.read();
        (program.contains(stage), program.last_run() == Some(stage))
    };
    if participates {
        let ctx = StageContext {
            node: node.id,
            role: node.role,
            scope: data.scope,
            stage,
            cycle,
            final_run,
        };
        let result = catch_unwind(AssertUnwindSafe(|| node.handler.run_stage(&ctx)));
        if result.is_err() {
            tracing::error!(
                node = node.id.index(),
                scope = %data.scope,
                ?stage,
                "stage handler panicked"
            );
        }
    }

    // Snapshot edges; the lock is never held across a wait.
    let children = node.children.read().clone();

    let released: Vec<(NodeId, Arc<ScopeData>, u64)> = children
        .into_iter()
        .filter_map(|id| {
            let child = inner.node(id)?;
            let child_data = Arc::clone(child.scope(data.scope)?);
            if !child_data.is_processing() {
                return None;
            }
            let target = release(&child_data, Command::Stage(stage), cycle);
            Some((id, child_data, target))
        })
        .collect();

    for (id, child_data, target) in &released {
        wait_done(inner, child_data, *id, *target);
    }

    tracing::trace!(node = node.id.index(), scope = %data.scope, ?stage, cycle, "stage complete");
    data.record_completion(inner.nanos());
}
