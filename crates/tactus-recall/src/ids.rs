//! Handles and keys.

use crate::arena::Index;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) Index);
    };
}

handle!(
    /// A [`RecallContainer`](crate::RecallContainer) in the graph.
    ContainerId
);
handle!(
    /// One recall: template or run instance.
    RecallHandle
);
handle!(
    /// Join key between a recycling context and a sound scope. Minted once
    /// per instantiation request and never mutated.
    RecallId
);
handle!(
    /// A node of the recycling-context tree.
    ContextId
);

/// Opaque id of a recycling (a signal-buffer list) owned by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecyclingId(pub u64);

/// An audio object: machine, instrument or effect host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AudioId(pub u64);

/// One channel (line) of an audio object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId {
    pub audio: AudioId,
    pub line: u32,
}

/// Where a recall container hangs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachPoint {
    Audio(AudioId),
    Channel(ChannelId),
}

impl From<AudioId> for AttachPoint {
    fn from(id: AudioId) -> Self {
        Self::Audio(id)
    }
}

impl From<ChannelId> for AttachPoint {
    fn from(id: ChannelId) -> Self {
        Self::Channel(id)
    }
}

/// Role of a recall inside its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecallKind {
    /// Audio-level template.
    Audio,
    /// Audio-level instance bound to a recall id.
    AudioRun,
    /// Channel-level template.
    Channel,
    /// Channel-level instance bound to a recall id.
    ChannelRun,
}

impl RecallKind {
    pub const fn is_template(self) -> bool {
        matches!(self, Self::Audio | Self::Channel)
    }

    /// Kind of the instances cloned from a template of this kind.
    pub const fn run_kind(self) -> Self {
        match self {
            Self::Audio | Self::AudioRun => Self::AudioRun,
            Self::Channel | Self::ChannelRun => Self::ChannelRun,
        }
    }
}
