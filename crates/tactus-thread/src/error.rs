//! Error types for tactus-thread.

use crate::NodeId;
use tactus_core::SoundScope;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Thread node not found: {0:?}")]
    NodeNotFound(NodeId),

    #[error("Sound scope {0} is not enabled on this tree")]
    ScopeDisabled(SoundScope),

    #[error("The root node cannot be removed")]
    RootRemoval,

    #[error("Thread tree is shut down")]
    ShutDown,

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
