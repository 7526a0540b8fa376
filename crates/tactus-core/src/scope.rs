//! Sound scopes and staging programs.
//!
//! A sound scope is an independent processing context (live playback,
//! sequencer, notation, wave and MIDI). Every scope runs its own staging
//! program: the ordered list of [`Stage`]s executed once per cycle.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Processing context a recall or thread stage belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundScope {
    Playback,
    Sequencer,
    Notation,
    Wave,
    Midi,
}

impl SoundScope {
    pub const COUNT: usize = 5;

    pub const ALL: [SoundScope; Self::COUNT] = [
        SoundScope::Playback,
        SoundScope::Sequencer,
        SoundScope::Notation,
        SoundScope::Wave,
        SoundScope::Midi,
    ];

    /// Dense index in `0..COUNT`.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Playback => "playback",
            Self::Sequencer => "sequencer",
            Self::Notation => "notation",
            Self::Wave => "wave",
            Self::Midi => "midi",
        }
    }
}

impl fmt::Display for SoundScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One step of a staging program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Reset,
    CheckRtData,
    FeedInputQueue,
    Automate,
    RunInitPre,
    RunInitInter,
    RunInitPost,
    RunPre,
    RunInter,
    RunPost,
    DoFeedback,
    FeedOutputQueue,
    Fini,
    Cancel,
    Remove,
}

impl Stage {
    /// Stages that render audio into the cycle's output slot.
    pub const fn is_run(self) -> bool {
        matches!(
            self,
            Self::RunInitPre
                | Self::RunInitInter
                | Self::RunInitPost
                | Self::RunPre
                | Self::RunInter
                | Self::RunPost
        )
    }
}

/// Ordered stage list executed once per dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingProgram {
    stages: SmallVec<[Stage; 12]>,
}

impl StagingProgram {
    pub fn new(stages: impl IntoIterator<Item = Stage>) -> Self {
        Self {
            stages: stages.into_iter().collect(),
        }
    }

    /// Reset, feed, automate, run pre/inter/post, feedback, feed output.
    pub fn playback() -> Self {
        Self::new([
            Stage::Reset,
            Stage::FeedInputQueue,
            Stage::Automate,
            Stage::RunPre,
            Stage::RunInter,
            Stage::RunPost,
            Stage::DoFeedback,
            Stage::FeedOutputQueue,
        ])
    }

    /// Program run once when a recall id starts playing.
    pub fn init() -> Self {
        Self::new([Stage::RunInitPre, Stage::RunInitInter, Stage::RunInitPost])
    }

    /// Program run when playback of a recall id stops.
    pub fn teardown() -> Self {
        Self::new([Stage::Fini, Stage::Cancel, Stage::Remove])
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    /// The run stage after which a dispatch's audio is final.
    pub fn last_run(&self) -> Option<Stage> {
        self.stages.iter().rev().copied().find(|s| s.is_run())
    }
}

impl Default for StagingProgram {
    fn default() -> Self {
        Self::playback()
    }
}
