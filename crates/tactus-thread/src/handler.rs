//! Per-node stage work.

use crate::{NodeId, NodeRole};
use tactus_core::{SoundScope, Stage};

/// Passed to [`StageHandler::run_stage`].
#[derive(Debug, Clone, Copy)]
pub struct StageContext {
    pub node: NodeId,
    pub role: NodeRole,
    pub scope: SoundScope,
    pub stage: Stage,
    /// Dispatch count of `scope` when this stage was released.
    pub cycle: u64,
    /// No run stage follows this one in the node's program.
    pub final_run: bool,
}

/// A node's own portion of a stage, run before its children are released.
///
/// Runs on the node's worker thread for the context's scope. Must not add or
/// remove tree nodes.
pub trait StageHandler: Send + Sync {
    fn run_stage(&self, ctx: &StageContext);

    /// Called on the root once every node finished `ctx.stage`, before the
    /// next stage is released.
    fn stage_complete(&self, _ctx: &StageContext) {}
}

/// Handler that does nothing; structural nodes only relay stages.
pub struct NoopHandler;

impl StageHandler for NoopHandler {
    fn run_stage(&self, _ctx: &StageContext) {}
}

impl<F> StageHandler for F
where
    F: Fn(&StageContext) + Send + Sync,
{
    fn run_stage(&self, ctx: &StageContext) {
        self(ctx)
    }
}
