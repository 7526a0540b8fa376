//! Engine that drives the soundcard, thread tree and recall graph together.

use crate::{Error, Result};
use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tactus_core::{
    ConsumeStatus, CpuMeter, CpuMetrics, CycleFrame, EventQueue, EventSender, MeterHandle,
    MeterPort, MeterRegistry, MeterSampler, NoteEvent, SoundScope, Soundcard, SoundcardConfig,
    Stage, StagingProgram, TickInfo,
};
use tactus_recall::{AttachPoint, AudioId, ChannelId, RecallGraph, RecallId, RecyclingId, StageIo};
use tactus_thread::{NodeId, NodeRole, StageContext, StageHandler, ThreadTree};

/// Meter port fed with the peak of every consumed buffer.
pub const MASTER_METER: &str = "master";

/// Data a cycle hands to the stage handlers.
struct CycleState {
    frame: CycleFrame,
    events: Vec<NoteEvent>,
    samplerate: u32,
}

/// State shared with the render handlers on the worker threads.
pub(crate) struct Shared {
    card: Soundcard,
    graph: RecallGraph,
    cycle: ArcSwapOption<CycleState>,
    cpu: ArcSwap<CpuMeter>,
}

/// Output of one recall id over a dispatch.
struct RecallOutput {
    recall_id: RecallId,
    samples: Vec<f32>,
    rendered: bool,
}

impl RecallOutput {
    fn new(recall_id: RecallId, frames: usize) -> Self {
        Self {
            recall_id,
            samples: vec![0.0; frames],
            rendered: false,
        }
    }

    fn reset(&mut self, frames: usize) {
        self.samples.clear();
        self.samples.resize(frames, 0.0);
        self.rendered = false;
    }
}

#[derive(Default)]
struct Scratch {
    /// Dispatch the outputs belong to.
    cycle: u64,
    events: Vec<NoteEvent>,
    /// Refined by every run stage, mixed into the ring once after the last.
    outputs: SmallVec<[RecallOutput; 4]>,
    mix: Vec<f32>,
}

/// What a tree node renders: the recall ids bound per scope at one attach point.
struct Binding {
    point: AttachPoint,
    recall_ids: [RwLock<SmallVec<[RecallId; 4]>>; SoundScope::COUNT],
    // One per scope; each scope runs on its own worker so these never contend.
    scratch: [Mutex<Scratch>; SoundScope::COUNT],
    meter: Option<Arc<MeterPort>>,
}

impl Binding {
    fn new(point: AttachPoint, meter: Option<Arc<MeterPort>>) -> Self {
        Self {
            point,
            recall_ids: Default::default(),
            scratch: Default::default(),
            meter,
        }
    }

    fn audio(&self) -> AudioId {
        match self.point {
            AttachPoint::Audio(audio) => audio,
            AttachPoint::Channel(channel) => channel.audio,
        }
    }

    /// Line whose pcm channel run-stage output is mixed into.
    fn line(&self) -> Option<usize> {
        match self.point {
            AttachPoint::Audio(_) => None,
            AttachPoint::Channel(channel) => Some(channel.line as usize),
        }
    }
}

/// Runs the recalls bound to one attach point inside the node's stages.
struct RenderHandler {
    shared: Arc<Shared>,
    binding: Arc<Binding>,
}

impl RenderHandler {
    /// Sum the outputs rendered this dispatch into the node's pcm channel and
    /// meter the sum.
    fn flush(&self, cycle: &CycleState, scratch: &mut Scratch) {
        let ring = &cycle.frame.ring;
        let Scratch { outputs, mix, .. } = scratch;
        mix.clear();
        mix.resize(ring.buffer_size(), 0.0);

        let mut rendered = false;
        for output in outputs.iter().filter(|o| o.rendered) {
            rendered = true;
            for (m, s) in mix.iter_mut().zip(&output.samples) {
                *m += *s;
            }
        }

        if rendered {
            if let Some(line) = self.binding.line() {
                let channel = line % ring.pcm_channels();
                if let Err(e) = ring.mix_channel(cycle.frame.slot, channel, 0, mix.as_slice()) {
                    tracing::warn!(channel, "mix failed: {e}");
                }
            }
        }
        if let Some(meter) = &self.binding.meter {
            meter.set(mix.iter().fold(0.0f32, |m, s| m.max(s.abs())));
        }
    }
}

impl StageHandler for RenderHandler {
    fn run_stage(&self, ctx: &StageContext) {
        let Some(cycle) = self.shared.cycle.load_full() else {
            return;
        };
        let ids = self.binding.recall_ids[ctx.scope.index()].read().clone();
        let frames = cycle.frame.ring.buffer_size();
        let mut scratch = self.binding.scratch[ctx.scope.index()].lock();

        if scratch.cycle != ctx.cycle {
            scratch.cycle = ctx.cycle;
            scratch.outputs.retain(|o| ids.contains(&o.recall_id));
            for output in scratch.outputs.iter_mut() {
                output.reset(frames);
            }
        }

        if !ids.is_empty() {
            let Scratch {
                events, outputs, ..
            } = &mut *scratch;

            events.clear();
            if ctx.stage == Stage::FeedInputQueue {
                let target = self.binding.audio().0;
                events.extend(cycle.events.iter().filter(|e| e.target == target).copied());
            }
            let line = self.binding.line();

            for recall_id in ids {
                let index = match outputs.iter().position(|o| o.recall_id == recall_id) {
                    Some(index) => index,
                    None => {
                        outputs.push(RecallOutput::new(recall_id, frames));
                        outputs.len() - 1
                    }
                };
                let output = &mut outputs[index];
                let ran = {
                    let mut io = StageIo {
                        scope: ctx.scope,
                        stage: ctx.stage,
                        samplerate: cycle.samplerate,
                        note_offset: cycle.frame.tick.note_offset,
                        attacks: &cycle.frame.tick.attacks,
                        events: events.as_slice(),
                        output: output.samples.as_mut_slice(),
                        channel: line.unwrap_or(0),
                    };
                    self.shared
                        .graph
                        .run_stage(self.binding.point, recall_id, &mut io)
                };

                match ran {
                    Ok(ran) if ran > 0 && ctx.stage.is_run() => output.rendered = true,
                    Ok(_) => {}
                    // Cancelled between the snapshot of ids and this stage.
                    Err(e) => tracing::trace!(?recall_id, stage = ?ctx.stage, "skipped: {e}"),
                }
            }
        }

        if ctx.final_run {
            self.flush(&cycle, &mut scratch);
        }
    }
}

/// Publishes staged recycling edits of a scope once the whole tree finished
/// a stage.
struct BoundaryHandler {
    shared: Arc<Shared>,
}

impl StageHandler for BoundaryHandler {
    fn run_stage(&self, _ctx: &StageContext) {}

    fn stage_complete(&self, ctx: &StageContext) {
        let committed = self.shared.graph.commit_scope(ctx.scope);
        if committed > 0 {
            tracing::trace!(
                committed,
                scope = %ctx.scope,
                stage = ?ctx.stage,
                "recycling edits published"
            );
        }
    }
}

struct Attached {
    node: NodeId,
    binding: Arc<Binding>,
}

/// Outcome of one driver cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub tick: TickInfo,
    /// Ring slot rendered into.
    pub slot: usize,
    /// Scopes dispatched; inactive scopes are left out.
    pub scopes: Vec<SoundScope>,
}

/// Real-time scheduling runtime.
///
/// One cycle per buffer: the timing engine advances, queued note events are
/// drained, staged recycling edits are published, and every active scope runs
/// its staging program across the thread tree. Each audio object and channel
/// registered with the engine is a tree node whose stages run the recalls
/// bound to it.
///
/// # Example
///
/// ```ignore
/// use tactus::prelude::*;
///
/// let engine = Engine::builder().bpm(128.0).build()?;
/// engine.add_audio(AudioId(1))?;
/// engine.add_channel(ChannelId { audio: AudioId(1), line: 0 })?;
///
/// engine.graph().attach(ChannelId { audio: AudioId(1), line: 0 }, Box::new(synth));
/// engine.play(AudioId(1), SoundScope::Playback, vec![RecyclingId(0)])?;
///
/// let mut out = vec![0.0; engine.config().samples_per_buffer()];
/// engine.process(&mut out)?;
/// ```
pub struct Engine {
    shared: Arc<Shared>,
    tree: ThreadTree,
    events: EventQueue,
    bindings: RwLock<HashMap<AttachPoint, Attached>>,
    meters: Arc<MeterRegistry>,
    sampler: Mutex<MeterSampler>,
    master: Arc<MeterPort>,
    driver: Mutex<()>,

    #[cfg(feature = "cpal")]
    output: Mutex<Option<crate::output::AudioOutput>>,
}

impl Engine {
    pub fn builder() -> crate::EngineBuilder {
        crate::EngineBuilder::default()
    }

    pub(crate) fn from_parts(
        card: Soundcard,
        tree: tactus_thread::ThreadTreeBuilder,
        program: Option<StagingProgram>,
        events: EventQueue,
        sampler_interval: std::time::Duration,
        start_metering: bool,
    ) -> Result<Self> {
        let config = card.config();
        let shared = Arc::new(Shared {
            cpu: ArcSwap::from_pointee(CpuMeter::new(config.samplerate, config.buffer_size)),
            card,
            graph: RecallGraph::new(),
            cycle: ArcSwapOption::empty(),
        });

        let tree = tree.build(Arc::new(BoundaryHandler {
            shared: Arc::clone(&shared),
        }))?;
        if let Some(program) = program {
            for scope in tree.scopes().to_vec() {
                tree.set_staging_program_all(scope, program.clone())?;
            }
        }

        let meters = Arc::new(MeterRegistry::new());
        let master = meters.port(MASTER_METER);
        let mut sampler = MeterSampler::new(Arc::clone(&meters), sampler_interval);
        if start_metering {
            sampler.start()?;
        }

        tracing::debug!(
            samplerate = config.samplerate,
            buffer_size = config.buffer_size,
            scopes = tree.scopes().len(),
            "engine started"
        );

        Ok(Self {
            shared,
            tree,
            events,
            bindings: RwLock::new(HashMap::new()),
            meters,
            sampler: Mutex::new(sampler),
            master,
            driver: Mutex::new(()),
            #[cfg(feature = "cpal")]
            output: Mutex::new(None),
        })
    }

    // ---- configuration and timing ---------------------------------------

    pub fn config(&self) -> Arc<SoundcardConfig> {
        self.shared.card.config()
    }

    pub fn samplerate(&self) -> u32 {
        self.config().samplerate
    }

    pub fn buffer_size(&self) -> usize {
        self.config().buffer_size
    }

    pub fn soundcard(&self) -> &Soundcard {
        &self.shared.card
    }

    /// Apply a new soundcard configuration. On error the previous one stays.
    pub fn reconfigure(&self, config: SoundcardConfig) -> Result<()> {
        let _driver = self.driver.lock();
        self.shared.card.reconfigure(config)?;
        let config = self.shared.card.config();
        self.shared
            .cpu
            .store(Arc::new(CpuMeter::new(config.samplerate, config.buffer_size)));
        Ok(())
    }

    pub fn bpm(&self) -> f64 {
        self.shared.card.timing().bpm()
    }

    pub fn set_bpm(&self, bpm: f64) -> Result<()> {
        Ok(self.shared.card.set_bpm(bpm)?)
    }

    pub fn delay_factor(&self) -> f64 {
        self.shared.card.timing().delay_factor()
    }

    pub fn set_delay_factor(&self, delay_factor: f64) -> Result<()> {
        Ok(self.shared.card.set_delay_factor(delay_factor)?)
    }

    /// Loop between tics `left` and `right` when `do_loop` is set.
    pub fn set_loop(&self, left: u64, right: u64, do_loop: bool) -> Result<()> {
        Ok(self.shared.card.set_loop(left, right, do_loop)?)
    }

    pub fn note_offset(&self) -> u64 {
        self.shared.card.timing().note_offset()
    }

    /// Rewind the tic counters to zero.
    pub fn stop(&self) {
        self.shared.card.stop();
    }

    // ---- subsystems -----------------------------------------------------

    pub fn graph(&self) -> &RecallGraph {
        &self.shared.graph
    }

    pub fn tree(&self) -> &ThreadTree {
        &self.tree
    }

    /// Handle for pushing note events from any thread.
    pub fn event_sender(&self) -> EventSender {
        self.events.sender()
    }

    pub fn send_event(&self, event: NoteEvent) -> Result<()> {
        Ok(self.events.sender().send(event)?)
    }

    pub fn set_scope_active(&self, scope: SoundScope, active: bool) -> Result<()> {
        Ok(self.tree.set_scope_active(scope, active)?)
    }

    pub fn is_scope_active(&self, scope: SoundScope) -> bool {
        self.tree.is_scope_active(scope)
    }

    /// Replace `scope`'s staging program on every node.
    pub fn set_staging_program(&self, scope: SoundScope, program: StagingProgram) -> Result<()> {
        Ok(self.tree.set_staging_program_all(scope, program)?)
    }

    // ---- topology -------------------------------------------------------

    fn not_found(point: AttachPoint) -> Error {
        match point {
            AttachPoint::Audio(audio) => Error::AudioNotFound(audio),
            AttachPoint::Channel(channel) => Error::ChannelNotFound(channel),
        }
    }

    fn attach_node(
        &self,
        bindings: &mut HashMap<AttachPoint, Attached>,
        parent: NodeId,
        role: NodeRole,
        point: AttachPoint,
        meter: Option<Arc<MeterPort>>,
    ) -> Result<NodeId> {
        let binding = Arc::new(Binding::new(point, meter));
        let handler = Arc::new(RenderHandler {
            shared: Arc::clone(&self.shared),
            binding: Arc::clone(&binding),
        });
        let node = self.tree.add_node(parent, role, handler)?;
        // The root carries the engine-wide program for each scope.
        let root = self.tree.root();
        for scope in self.tree.scopes().to_vec() {
            let program = self.tree.staging_program(root, scope)?;
            self.tree.set_staging_program(node, scope, program)?;
        }
        bindings.insert(point, Attached { node, binding });
        Ok(node)
    }

    /// Register an audio object as a child of the tree root.
    pub fn add_audio(&self, audio: AudioId) -> Result<NodeId> {
        let point = AttachPoint::Audio(audio);
        let mut bindings = self.bindings.write();
        if bindings.contains_key(&point) {
            return Err(Error::AudioExists(audio));
        }
        self.attach_node(&mut bindings, self.tree.root(), NodeRole::Audio, point, None)
    }

    /// Register a channel under its audio object. Its run-stage output is
    /// mixed into pcm channel `line % pcm_channels`.
    pub fn add_channel(&self, channel: ChannelId) -> Result<NodeId> {
        let point = AttachPoint::Channel(channel);
        let mut bindings = self.bindings.write();
        if bindings.contains_key(&point) {
            return Err(Error::ChannelExists(channel));
        }
        let parent = bindings
            .get(&AttachPoint::Audio(channel.audio))
            .map(|a| a.node)
            .ok_or(Error::AudioNotFound(channel.audio))?;
        let meter = self.meters.port(&channel_meter_name(channel));
        self.attach_node(&mut bindings, parent, NodeRole::Channel, point, Some(meter))
    }

    fn detach_points(&self, points: &[AttachPoint]) -> Result<()> {
        for point in points {
            for container in self.shared.graph.containers_at(*point) {
                self.shared.graph.detach(container)?;
            }
            if let AttachPoint::Channel(channel) = point {
                self.meters.remove(&channel_meter_name(*channel));
            }
        }
        Ok(())
    }

    /// Remove an audio object with its channels, stopping their workers and
    /// detaching every recall container attached to them.
    pub fn remove_audio(&self, audio: AudioId) -> Result<()> {
        // Bindings are unlinked first so joining the workers never blocks
        // callers of `play` or `bind`.
        let (node, points) = {
            let mut bindings = self.bindings.write();
            let node = bindings
                .get(&AttachPoint::Audio(audio))
                .map(|a| a.node)
                .ok_or(Error::AudioNotFound(audio))?;

            let points: Vec<AttachPoint> = bindings
                .keys()
                .copied()
                .filter(|p| match p {
                    AttachPoint::Audio(a) => *a == audio,
                    AttachPoint::Channel(c) => c.audio == audio,
                })
                .collect();
            for point in &points {
                bindings.remove(point);
            }
            (node, points)
        };
        self.tree.remove_node(node)?;
        self.detach_points(&points)
    }

    pub fn remove_channel(&self, channel: ChannelId) -> Result<()> {
        let point = AttachPoint::Channel(channel);
        let node = self
            .bindings
            .write()
            .remove(&point)
            .map(|a| a.node)
            .ok_or(Error::ChannelNotFound(channel))?;
        self.tree.remove_node(node)?;
        self.detach_points(&[point])
    }

    pub fn node_of(&self, point: impl Into<AttachPoint>) -> Option<NodeId> {
        self.bindings.read().get(&point.into()).map(|a| a.node)
    }

    // ---- playback -------------------------------------------------------

    fn binding(&self, point: AttachPoint) -> Result<Arc<Binding>> {
        self.bindings
            .read()
            .get(&point)
            .map(|a| Arc::clone(&a.binding))
            .ok_or_else(|| Self::not_found(point))
    }

    /// Run the instances bound to `recall_id` at `point` in `scope`'s stages.
    pub fn bind(
        &self,
        point: impl Into<AttachPoint>,
        scope: SoundScope,
        recall_id: RecallId,
    ) -> Result<()> {
        let binding = self.binding(point.into())?;
        self.shared.graph.resolve(recall_id)?;
        let mut ids = binding.recall_ids[scope.index()].write();
        if !ids.contains(&recall_id) {
            ids.push(recall_id);
        }
        Ok(())
    }

    /// Returns whether `recall_id` was bound.
    pub fn unbind(
        &self,
        point: impl Into<AttachPoint>,
        scope: SoundScope,
        recall_id: RecallId,
    ) -> Result<bool> {
        let binding = self.binding(point.into())?;
        let mut ids = binding.recall_ids[scope.index()].write();
        let before = ids.len();
        ids.retain(|id| *id != recall_id);
        Ok(ids.len() != before)
    }

    pub fn bound(&self, point: impl Into<AttachPoint>, scope: SoundScope) -> Result<Vec<RecallId>> {
        let binding = self.binding(point.into())?;
        let ids = binding.recall_ids[scope.index()].read().to_vec();
        Ok(ids)
    }

    /// Start playing `point` in `scope` over `recycling`.
    ///
    /// Creates a root recycling context, instantiates every container at the
    /// point (and at the channels of an audio object) for its recall id, and
    /// binds that id to the nodes.
    pub fn play(
        &self,
        point: impl Into<AttachPoint>,
        scope: SoundScope,
        recycling: Vec<RecyclingId>,
    ) -> Result<RecallId> {
        let point = point.into();
        let targets: Vec<Arc<Binding>> = {
            let bindings = self.bindings.read();
            let main = bindings.get(&point).ok_or_else(|| Self::not_found(point))?;
            let mut targets = vec![Arc::clone(&main.binding)];
            if let AttachPoint::Audio(audio) = point {
                let mut channels: Vec<(&AttachPoint, &Attached)> = bindings
                    .iter()
                    .filter(|(p, _)| matches!(p, AttachPoint::Channel(c) if c.audio == audio))
                    .collect();
                channels.sort_by_key(|(p, _)| match p {
                    AttachPoint::Channel(c) => c.line,
                    AttachPoint::Audio(_) => 0,
                });
                targets.extend(channels.into_iter().map(|(_, a)| Arc::clone(&a.binding)));
            }
            targets
        };

        let graph = &self.shared.graph;
        let context = graph.create_context(None, scope, Some(recycling))?;
        let recall_id = graph.recall_id_of(context)?;
        for target in &targets {
            for container in graph.containers_at(target.point) {
                graph.instantiate(container, recall_id)?;
            }
        }
        for target in &targets {
            target.recall_ids[scope.index()].write().push(recall_id);
        }
        tracing::debug!(?point, %scope, ?recall_id, nodes = targets.len(), "playback started");
        Ok(recall_id)
    }

    /// Stop `recall_id`: remove its recycling context with all descendants,
    /// cancel and free their instances, and unbind the ids from every node.
    /// Returns the number of instances cancelled.
    pub fn cancel(&self, recall_id: RecallId) -> Result<usize> {
        let graph = &self.shared.graph;
        let (context, _) = graph.resolve(recall_id)?;
        let cancelled = graph.remove_context(context)?;

        for attached in self.bindings.read().values() {
            for ids in &attached.binding.recall_ids {
                ids.write().retain(|id| graph.resolve(*id).is_ok());
            }
        }
        let freed = graph.purge_cancelled();
        tracing::debug!(?recall_id, cancelled, freed, "playback cancelled");
        Ok(cancelled)
    }

    // ---- driving --------------------------------------------------------

    /// Render one buffer into the ring without consuming.
    pub fn cycle(&self) -> Result<CycleReport> {
        let _driver = self.driver.lock();
        let started = Instant::now();
        let frame = self.shared.card.begin_cycle();
        self.render(frame, started)
    }

    /// Backend callback: hand the last rendered buffer to `out` (interleaved,
    /// `buffer_size × pcm_channels` samples), then render the next one.
    ///
    /// The first call has nothing rendered yet and reports underflow.
    pub fn process(&self, out: &mut [f32]) -> Result<ConsumeStatus> {
        let _driver = self.driver.lock();
        let needed = self.shared.card.ring().samples_per_buffer();
        if out.len() < needed {
            return Err(tactus_core::Error::OutputTooSmall {
                needed,
                got: out.len(),
            }
            .into());
        }

        let started = Instant::now();
        let frame = self.shared.card.begin_cycle();
        let status = frame.ring.consume(out)?;

        let needed = frame.ring.samples_per_buffer();
        self.master
            .set(out[..needed].iter().fold(0.0f32, |m, s| m.max(s.abs())));

        self.render(frame, started)?;
        Ok(status)
    }

    /// [`process`](Self::process) encoded in the configured sample format.
    pub fn process_encoded(&self, out: &mut [u8]) -> Result<ConsumeStatus> {
        let _driver = self.driver.lock();
        let ring = self.shared.card.ring();
        let needed = ring.samples_per_buffer() * ring.format().word_size();
        if out.len() < needed {
            return Err(tactus_core::Error::OutputTooSmall {
                needed,
                got: out.len(),
            }
            .into());
        }

        let started = Instant::now();
        let frame = self.shared.card.begin_cycle();
        let status = frame.ring.consume_encoded(out)?;
        self.render(frame, started)?;
        Ok(status)
    }

    fn render(&self, frame: CycleFrame, started: Instant) -> Result<CycleReport> {
        let mut events = Vec::with_capacity(self.events.len());
        self.events.drain_into(&mut events);

        let committed = self.shared.graph.commit_pending();
        if committed > 0 {
            tracing::trace!(committed, "recycling edits published");
        }

        let tick = frame.tick.clone();
        let slot = frame.slot;
        let ring = Arc::clone(&frame.ring);
        let samplerate = frame.config.samplerate;
        self.shared.cycle.store(Some(Arc::new(CycleState {
            frame,
            events,
            samplerate,
        })));

        let dispatched = self.tree.dispatch_cycle(self.tree.scopes());
        self.shared.cycle.store(None);
        let scopes = dispatched?;

        ring.mark_complete(slot)?;
        self.shared.cpu.load().record(started.elapsed());
        Ok(CycleReport { tick, slot, scopes })
    }

    // ---- metering -------------------------------------------------------

    pub fn cpu_metrics(&self) -> CpuMetrics {
        self.shared.cpu.load().metrics()
    }

    pub fn underflow_count(&self) -> u64 {
        self.shared.card.ring().underflow_count()
    }

    pub fn meter_registry(&self) -> Arc<MeterRegistry> {
        Arc::clone(&self.meters)
    }

    /// Read-only handle to the latest meter snapshot.
    pub fn meters(&self) -> MeterHandle {
        self.sampler.lock().handle()
    }

    pub fn start_metering(&self) -> Result<()> {
        Ok(self.sampler.lock().start()?)
    }

    pub fn stop_metering(&self) {
        self.sampler.lock().stop();
    }

    // ---- audio device ---------------------------------------------------

    /// Drive the engine from an output device. `None` picks the default one.
    #[cfg(feature = "cpal")]
    pub fn start_output(self: &Arc<Self>, device: Option<usize>) -> Result<()> {
        let mut output = self.output.lock();
        if output.is_some() {
            return Ok(());
        }
        *output = Some(crate::output::AudioOutput::start(Arc::downgrade(self), device)?);
        Ok(())
    }

    #[cfg(feature = "cpal")]
    pub fn stop_output(&self) {
        self.output.lock().take();
    }

    #[cfg(feature = "cpal")]
    pub fn list_output_devices() -> Result<Vec<String>> {
        crate::output::AudioOutput::list_devices()
    }

    /// Stop the output stream, the meter sampler and every worker thread.
    pub fn shutdown(&self) {
        #[cfg(feature = "cpal")]
        self.stop_output();
        self.sampler.lock().stop();
        self.tree.shutdown();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn channel_meter_name(channel: ChannelId) -> String {
    format!("audio{}/line{}", channel.audio.0, channel.line)
}
