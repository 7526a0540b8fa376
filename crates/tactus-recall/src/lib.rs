//! Recall graph and recycling contexts.
//!
//! A recall is a unit of processing attached to an audio object or one of
//! its channels. Containers hold a template per attach point; templates are
//! cloned into run instances for each [`RecallId`], which joins one
//! [`RecyclingContext`] with one sound scope.
//!
//! Every object lives in the [`RecallGraph`] and is referred to by handle.
//! Removing a context cancels the instances bound to its recall ids and
//! leaves the parent's recycling array untouched.
//!
//! ```ignore
//! use tactus_recall::{AudioId, RecallGraph, RecyclingId};
//! use tactus_core::SoundScope;
//!
//! let graph = RecallGraph::new();
//! let container = graph.attach(AudioId(1), Box::new(Gain::new(0.5)));
//! let root = graph.create_context(None, SoundScope::Playback, Some(vec![RecyclingId(0)]))?;
//! let recall_id = graph.recall_id_of(root)?;
//! graph.instantiate(container, recall_id)?;
//! ```

mod arena;

pub mod error;
pub use error::{Error, Result};

mod ids;
pub use ids::{
    AttachPoint, AudioId, ChannelId, ContainerId, ContextId, RecallHandle, RecallId, RecallKind,
    RecyclingId,
};

mod processor;
pub use processor::{Connectable, RecallProcessor, StageIo};

mod container;
pub use container::{Recall, RecallContainer, RecallQuery};

mod context;
pub use context::RecyclingContext;

mod graph;
pub use graph::RecallGraph;
