//! Capabilities a recall's processing code can provide.

use dyn_clone::DynClone;
use tactus_core::{NoteEvent, SoundScope, Stage};

/// Pre-allocated buffers and cycle state handed to a recall inside a stage.
pub struct StageIo<'a> {
    pub scope: SoundScope,
    pub stage: Stage,
    pub samplerate: u32,
    /// Loop-relative tic position after this cycle's tick.
    pub note_offset: u64,
    /// Frame offsets of tics starting in this cycle.
    pub attacks: &'a [usize],
    /// Events addressed to the recall's audio object.
    pub events: &'a [NoteEvent],
    /// Planar output for one pcm channel, `buffer_size` frames.
    pub output: &'a mut [f32],
    pub channel: usize,
}

/// Apply capability: the code a recall runs inside a stage.
///
/// Templates are cloned for every recall id they are instantiated against,
/// so state lives in `self` and is never shared between instances.
pub trait RecallProcessor: DynClone + Send {
    fn name(&self) -> &str;

    /// Called for every stage of the staging program the recall runs in.
    fn run(&mut self, io: &mut StageIo<'_>);

    /// Whether the recall takes part in `scope`. Default: all scopes.
    fn accepts(&self, _scope: SoundScope) -> bool {
        true
    }

    /// Stop producing output. The instance is dropped on the next remove stage.
    fn cancel(&mut self) {}

    fn as_connectable(&mut self) -> Option<&mut dyn Connectable> {
        None
    }
}

dyn_clone::clone_trait_object!(RecallProcessor);

/// Connect capability: recalls that bind to ports or files on attach.
pub trait Connectable {
    fn connect(&mut self);
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
}
