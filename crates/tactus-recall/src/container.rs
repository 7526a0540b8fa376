//! Recalls and the containers grouping them per attach point.

use crate::ids::{AttachPoint, ContainerId, RecallHandle, RecallId, RecallKind};
use crate::processor::RecallProcessor;
use parking_lot::Mutex;
use uuid::Uuid;

/// One recall: a template, or an instance cloned from one for a recall id.
pub struct Recall {
    pub(crate) handle: RecallHandle,
    pub(crate) kind: RecallKind,
    pub(crate) container: ContainerId,
    pub(crate) recall_id: Option<RecallId>,
    pub(crate) processor: Box<dyn RecallProcessor>,
    pub(crate) cancelled: bool,
}

impl Recall {
    pub fn handle(&self) -> RecallHandle {
        self.handle
    }

    pub fn kind(&self) -> RecallKind {
        self.kind
    }

    pub fn is_template(&self) -> bool {
        self.kind.is_template()
    }

    pub fn container(&self) -> ContainerId {
        self.container
    }

    /// `None` for templates.
    pub fn recall_id(&self) -> Option<RecallId> {
        self.recall_id
    }

    pub fn name(&self) -> &str {
        self.processor.name()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn processor(&self) -> &dyn RecallProcessor {
        self.processor.as_ref()
    }

    pub fn processor_mut(&mut self) -> &mut dyn RecallProcessor {
        self.processor.as_mut()
    }

    pub(crate) fn cancel(&mut self) -> bool {
        if self.cancelled {
            return false;
        }
        self.cancelled = true;
        self.processor.cancel();
        if let Some(connectable) = self.processor.as_connectable() {
            if connectable.is_connected() {
                connectable.disconnect();
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecallEntry {
    pub(crate) handle: RecallHandle,
    pub(crate) recall_id: Option<RecallId>,
}

#[derive(Default)]
pub(crate) struct ContainerLists {
    pub(crate) recall_audio: Option<RecallEntry>,
    pub(crate) recall_audio_run: Vec<RecallEntry>,
    pub(crate) recall_channel: Vec<RecallEntry>,
    pub(crate) recall_channel_run: Vec<RecallEntry>,
}

impl ContainerLists {
    pub(crate) fn list(&self, kind: RecallKind) -> &[RecallEntry] {
        match kind {
            RecallKind::Audio => self.recall_audio.as_slice(),
            RecallKind::AudioRun => &self.recall_audio_run,
            RecallKind::Channel => &self.recall_channel,
            RecallKind::ChannelRun => &self.recall_channel_run,
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (RecallKind, &RecallEntry)> {
        [
            RecallKind::Audio,
            RecallKind::AudioRun,
            RecallKind::Channel,
            RecallKind::ChannelRun,
        ]
        .into_iter()
        .flat_map(move |kind| self.list(kind).iter().map(move |e| (kind, e)))
    }

    pub(crate) fn remove(&mut self, handle: RecallHandle) -> bool {
        if self.recall_audio.map(|e| e.handle) == Some(handle) {
            self.recall_audio = None;
            return true;
        }
        for list in [
            &mut self.recall_audio_run,
            &mut self.recall_channel,
            &mut self.recall_channel_run,
        ] {
            if let Some(pos) = list.iter().position(|e| e.handle == handle) {
                list.remove(pos);
                return true;
            }
        }
        false
    }
}

/// Filter for [`RecallGraph::find`](crate::RecallGraph::find).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecallQuery {
    pub kind: Option<RecallKind>,
    pub template: Option<bool>,
    pub recall_id: Option<RecallId>,
}

impl RecallQuery {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: RecallKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn template(mut self, template: bool) -> Self {
        self.template = Some(template);
        self
    }

    pub fn recall_id(mut self, recall_id: RecallId) -> Self {
        self.recall_id = Some(recall_id);
        self
    }

    pub(crate) fn matches(&self, kind: RecallKind, entry: &RecallEntry) -> bool {
        self.kind.map_or(true, |k| k == kind)
            && self.template.map_or(true, |t| t == kind.is_template())
            && self.recall_id.map_or(true, |r| entry.recall_id == Some(r))
    }
}

/// Templates and instances of one effect or instrument at one attach point.
///
/// Containers are never copied; everything refers to them by [`ContainerId`].
pub struct RecallContainer {
    pub(crate) id: ContainerId,
    pub(crate) uuid: Uuid,
    pub(crate) attach: AttachPoint,
    pub(crate) lists: Mutex<ContainerLists>,
}

impl RecallContainer {
    pub(crate) fn new(id: ContainerId, attach: AttachPoint) -> Self {
        Self {
            id,
            uuid: Uuid::new_v4(),
            attach,
            lists: Mutex::new(ContainerLists::default()),
        }
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn attach_point(&self) -> AttachPoint {
        self.attach
    }

    /// The audio-level template.
    pub fn recall_audio(&self) -> Option<RecallHandle> {
        self.lists.lock().recall_audio.map(|e| e.handle)
    }

    pub fn recall_audio_run(&self) -> Vec<RecallHandle> {
        self.handles(RecallKind::AudioRun)
    }

    pub fn recall_channel(&self) -> Vec<RecallHandle> {
        self.handles(RecallKind::Channel)
    }

    pub fn recall_channel_run(&self) -> Vec<RecallHandle> {
        self.handles(RecallKind::ChannelRun)
    }

    fn handles(&self, kind: RecallKind) -> Vec<RecallHandle> {
        self.lists.lock().list(kind).iter().map(|e| e.handle).collect()
    }

    /// Every recall held, templates first.
    pub fn len(&self) -> usize {
        self.lists.lock().iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn push(&self, kind: RecallKind, entry: RecallEntry) {
        let mut lists = self.lists.lock();
        match kind {
            RecallKind::Audio => lists.recall_audio = Some(entry),
            RecallKind::AudioRun => lists.recall_audio_run.push(entry),
            RecallKind::Channel => lists.recall_channel.push(entry),
            RecallKind::ChannelRun => lists.recall_channel_run.push(entry),
        }
    }
}
