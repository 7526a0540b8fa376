//! Error types for tactus-recall.

use crate::{ContainerId, ContextId, RecallHandle, RecallId, RecallKind, RecyclingId};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Recall container not found: {0:?}")]
    ContainerNotFound(ContainerId),

    #[error("Recall not found: {0:?}")]
    RecallNotFound(RecallHandle),

    #[error("Recycling context not found: {0:?}")]
    ContextNotFound(ContextId),

    #[error("Recall id not found: {0:?}")]
    RecallIdNotFound(RecallId),

    #[error("Recall kind {0:?} not allowed here")]
    InvalidKind(RecallKind),

    #[error("Recycling array of an active context cannot become empty")]
    EmptyRecycling,

    #[error("Position {position} out of range (length {len})")]
    PositionOutOfRange { position: usize, len: usize },

    #[error("Recycling {0:?} not found in context")]
    RecyclingNotFound(RecyclingId),

    #[error("Removal would leave a child context longer than its parent")]
    ChildLengthExceeded,
}

pub type Result<T> = std::result::Result<T, Error>;
