//! Thread hierarchy with nested stage synchronization.
//!
//! - [`ThreadTree`] / [`ThreadTreeBuilder`]: arena of worker nodes, one OS
//!   thread per node and enabled [`SoundScope`](tactus_core::SoundScope)
//! - [`StageHandler`]: the work a node does for each stage
//!
//! Ordering per scope: stage K on a node happens before stage K on any of
//! its children, and a node reports K done only after its whole subtree has.

pub mod error;
pub use error::{Error, Result};

mod handler;
pub use handler::{NoopHandler, StageContext, StageHandler};

mod node;
pub use node::{NodeId, NodeRole, NodeState, ScopeStats};

mod tree;
pub use tree::{ThreadTree, ThreadTreeBuilder, DEFAULT_HANG_CHECK};

mod worker;
