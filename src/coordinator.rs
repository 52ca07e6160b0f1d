// SPDX-License-Identifier: MPL-2.0

//! Hot-swapping of the active media against playback and decoding.
//!
//! The coordinator lives on the render thread. Decodes run on short-lived
//! worker threads and deposit their result into a mutex-guarded slot, then
//! wake the render loop through a calloop channel. Every result carries the
//! generation it was started for; results of superseded generations are
//! dropped without ever becoming visible.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
    time::Instant,
};

use calloop::{
    LoopHandle, RegistrationToken,
    channel::{self, Channel, Sender},
};
use jumpscare_config::{Config, MediaSelection, TriggerBounds};
use tracing::{debug, info, trace, warn};

use crate::animated::{
    DecodeOptions, DecodedSequence, PlaybackEngine, PlaybackPhase, SequenceKind, decode,
};
use crate::error::DecodeError;
use crate::scheduler::{TriggerPhase, TriggerScheduler};
use crate::scratch::ScratchArena;
use crate::sound::CuePlayer;
use crate::texture::{Materializer, RenderThread, Sequence, TextureFactory};

/// Sent by a worker once its result is in the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeReady {
    pub generation: u64,
}

/// Why no media can be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    NoSelection,
    NotFound(PathBuf),
    Undecodable(String),
    NoRenderableFrames,
}

impl From<&DecodeError> for UnavailableReason {
    fn from(why: &DecodeError) -> Self {
        match why {
            DecodeError::NotFound(path) => Self::NotFound(path.clone()),
            other => Self::Undecodable(other.to_string()),
        }
    }
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSelection => f.write_str("no media selected"),
            Self::NotFound(path) => write!(f, "media not found: {}", path.display()),
            Self::Undecodable(reason) => write!(f, "media undecodable: {reason}"),
            Self::NoRenderableFrames => f.write_str("no renderable frames"),
        }
    }
}

#[derive(Debug)]
enum SlotStatus {
    Empty,
    Decoding,
    Decoded(DecodedSequence),
    /// Taken over by the render thread.
    Delivered,
    Failed(UnavailableReason),
}

/// State shared between the render thread and decode workers.
#[derive(Debug)]
struct MediaSlot {
    generation: u64,
    status: SlotStatus,
}

fn lock(slot: &Mutex<MediaSlot>) -> MutexGuard<'_, MediaSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Decode `path` on a worker and publish the result if `generation` is
/// still current by then.
fn spawn_decode(
    slot: &Arc<Mutex<MediaSlot>>,
    sender: Sender<DecodeReady>,
    path: PathBuf,
    options: DecodeOptions,
    generation: u64,
) -> Result<JoinHandle<()>, UnavailableReason> {
    if !path.exists() {
        return Err(UnavailableReason::NotFound(path));
    }

    let slot = Arc::clone(slot);
    thread::Builder::new()
        .name(format!("jumpscare-decode-{generation}"))
        .spawn(move || {
            let result = decode(&path, generation, &options);

            {
                let mut slot = lock(&slot);
                if slot.generation != generation {
                    trace!(generation, current = slot.generation, "dropping stale decode");
                    return;
                }
                slot.status = match result {
                    Ok(sequence) => SlotStatus::Decoded(sequence),
                    Err(why) => {
                        warn!(%why, generation, "decode failed");
                        SlotStatus::Failed(UnavailableReason::from(&why))
                    }
                };
            }

            if sender.send(DecodeReady { generation }).is_err() {
                debug!(generation, "render loop is gone");
            }
        })
        .map_err(|why| UnavailableReason::Undecodable(why.to_string()))
}

/// Render-side view of the current generation.
enum Media<H> {
    None,
    Pending,
    Ready(Sequence<H>),
    Unavailable(UnavailableReason),
}

/// What the host should draw this tick.
#[derive(Debug)]
pub enum DisplayState<'a, H> {
    Hidden,
    Counting {
        remaining_secs: u64,
    },
    /// Due, but the media is still decoding.
    Preparing,
    Playing {
        frame: &'a H,
        /// Drawn beneath `frame` while fading out.
        previous: Option<&'a H>,
        index: usize,
        alpha: f32,
    },
    Unavailable(UnavailableReason),
}

/// Coarse state for status indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Idle,
    CountingDown(u64),
    Preparing,
    Playing,
}

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub bounds: TriggerBounds,
    pub fade_duration_ms: u32,
    pub still_hold_ms: u32,
    pub show_countdown: bool,
    /// Stage decoded frames here instead of keeping them in memory.
    pub scratch: Option<ScratchArena>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default(), None)
    }
}

impl CoordinatorSettings {
    #[must_use]
    pub fn from_config(config: &Config, arena: Option<&ScratchArena>) -> Self {
        Self {
            bounds: config.bounds(),
            fade_duration_ms: config.fade_duration_ms,
            still_hold_ms: config.still_hold_ms,
            show_countdown: config.show_countdown,
            scratch: arena.filter(|_| config.stage_frames).cloned(),
        }
    }
}

/// Picks the media of the next cycle.
pub type SelectionPolicy = Box<dyn FnMut() -> MediaSelection>;

pub struct ReloadCoordinator<F: TextureFactory> {
    render_thread: RenderThread,
    materializer: Materializer<F>,
    cues: Box<dyn CuePlayer>,
    slot: Arc<Mutex<MediaSlot>>,
    sender: Sender<DecodeReady>,
    workers: Vec<JoinHandle<()>>,
    settings: CoordinatorSettings,
    selection: Option<MediaSelection>,
    policy: Option<SelectionPolicy>,
    scheduler: TriggerScheduler,
    engine: PlaybackEngine,
    media: Media<F::Handle>,
    last_tick: Option<Instant>,
}

impl<F: TextureFactory> ReloadCoordinator<F> {
    /// Create a coordinator and the channel its workers report on.
    ///
    /// The channel must be inserted into the render loop, see
    /// [`insert_decode_source`].
    pub fn new(
        render_thread: RenderThread,
        factory: F,
        cues: Box<dyn CuePlayer>,
        settings: CoordinatorSettings,
    ) -> (Self, Channel<DecodeReady>) {
        let (sender, channel) = channel::channel();
        let coordinator = Self {
            render_thread,
            materializer: Materializer::new(factory),
            cues,
            slot: Arc::new(Mutex::new(MediaSlot {
                generation: 0,
                status: SlotStatus::Empty,
            })),
            sender,
            workers: Vec::new(),
            scheduler: TriggerScheduler::new(settings.bounds),
            engine: PlaybackEngine::new(settings.fade_duration_ms as f32),
            settings,
            selection: None,
            policy: None,
            media: Media::None,
            last_tick: None,
        };
        (coordinator, channel)
    }

    /// Replace the media. Tears down the current cycle and starts decoding
    /// the new selection; re-arms only if the trigger was active.
    pub fn reload(&mut self, selection: MediaSelection, now: Instant) {
        info!(image = %selection.image.display(), "reloading media");
        self.selection = Some(selection);
        self.restart(now);
    }

    /// Start the cycle over with the current selection.
    pub fn reset_cycle(&mut self, now: Instant) {
        debug!("resetting cycle");
        self.restart(now);
    }

    fn restart(&mut self, now: Instant) {
        let was_active = self.scheduler.is_active();
        self.scheduler.cancel();
        self.engine = PlaybackEngine::new(self.settings.fade_duration_ms as f32);
        self.media = Media::None;

        {
            let mut slot = lock(&self.slot);
            slot.generation += 1;
            // drops an undelivered sequence and its staged frames
            slot.status = SlotStatus::Empty;
            let generation = slot.generation;

            let started = self
                .selection
                .as_ref()
                .ok_or(UnavailableReason::NoSelection)
                .and_then(|selection| {
                    spawn_decode(
                        &self.slot,
                        self.sender.clone(),
                        selection.image.clone(),
                        DecodeOptions {
                            scratch: self.settings.scratch.clone(),
                        },
                        generation,
                    )
                });

            match started {
                Ok(worker) => {
                    slot.status = SlotStatus::Decoding;
                    self.media = Media::Pending;
                    self.workers.retain(|worker| !worker.is_finished());
                    self.workers.push(worker);
                    debug!(generation, "decode started");
                }
                Err(reason) => {
                    warn!(%reason, generation, "media unavailable");
                    slot.status = SlotStatus::Failed(reason.clone());
                    self.media = Media::Unavailable(reason);
                }
            }
        }

        if was_active {
            self.scheduler.arm(self.settings.bounds, now);
        }
    }

    /// Take a finished decode over on the render thread.
    pub fn on_decoded(&mut self, ready: DecodeReady) {
        let mut slot = lock(&self.slot);
        if ready.generation != slot.generation {
            trace!(
                generation = ready.generation,
                current = slot.generation,
                "ignoring stale decode"
            );
            return;
        }

        match std::mem::replace(&mut slot.status, SlotStatus::Delivered) {
            SlotStatus::Decoded(decoded) => {
                let mut sequence = Sequence::from(decoded);
                let materialized = self
                    .materializer
                    .materialize(&self.render_thread, &mut sequence)
                    .map(|materialized| materialized.len());
                match materialized {
                    Ok(frames) => {
                        info!(generation = ready.generation, frames, "media ready");
                        self.media = Media::Ready(sequence);
                    }
                    Err(why) => {
                        warn!(%why, generation = ready.generation, "media unavailable");
                        slot.status = SlotStatus::Failed(UnavailableReason::NoRenderableFrames);
                        self.media = Media::Unavailable(UnavailableReason::NoRenderableFrames);
                    }
                }
            }
            SlotStatus::Failed(reason) => {
                self.media = Media::Unavailable(reason.clone());
                slot.status = SlotStatus::Failed(reason);
            }
            other => slot.status = other,
        }
    }

    /// Start the countdown unless it is already running.
    pub fn arm(&mut self, now: Instant) {
        if !self.scheduler.is_active() {
            self.scheduler.arm(self.settings.bounds, now);
        }
    }

    /// Stop the countdown and any running playback. The decoded media is
    /// kept for the next arm.
    pub fn cancel(&mut self) {
        self.scheduler.cancel();
        self.engine.reset();
    }

    /// Arm if idle, cancel otherwise. Returns whether the trigger is active
    /// afterwards.
    pub fn toggle(&mut self, now: Instant) -> bool {
        if self.scheduler.is_active() {
            info!("jumpscare stopped");
            self.cancel();
            false
        } else {
            info!("jumpscare started");
            self.arm(now);
            true
        }
    }

    /// New trigger bounds take effect on the next arm.
    pub fn set_bounds(&mut self, bounds: TriggerBounds) {
        self.settings.bounds = bounds;
        self.scheduler.set_bounds(bounds);
    }

    /// Replace settings without touching the running cycle.
    pub fn set_settings(&mut self, settings: CoordinatorSettings) {
        self.set_bounds(settings.bounds);
        self.settings = settings;
    }

    /// Ask `policy` for fresh media after every completed cycle.
    pub fn set_policy(&mut self, policy: Option<SelectionPolicy>) {
        self.policy = policy;
    }

    /// Advance to `now` and report what to draw.
    pub fn render(&mut self, now: Instant) -> DisplayState<'_, F::Handle> {
        let delta_ms = self
            .last_tick
            .replace(now)
            .map_or(0.0, |last| now.saturating_duration_since(last).as_secs_f32() * 1000.0);

        if self.scheduler.poll(now) == TriggerPhase::Due {
            self.on_due(delta_ms, now);
        }

        self.display(now)
    }

    fn on_due(&mut self, delta_ms: f32, now: Instant) {
        if self.engine.phase() == PlaybackPhase::NotReady {
            match &self.media {
                Media::Ready(sequence) => {
                    if let Some(materialized) = sequence.materialized() {
                        let sound = self.selection.as_ref().and_then(|s| s.sound.clone());
                        self.engine.begin(materialized.delays(), sound);
                    }
                }
                Media::Unavailable(reason) => {
                    warn!(%reason, "trigger due without media, skipping cycle");
                    self.complete_cycle(now);
                    return;
                }
                Media::None | Media::Pending => return,
            }
        }

        let phase = self.engine.tick(delta_ms, self.cues.as_mut());

        if phase == PlaybackPhase::Playing
            && self.engine.is_still()
            && self.engine.playing_ms() >= self.settings.still_hold_ms as f32
        {
            self.engine.fade_out();
        }

        if phase == PlaybackPhase::Faded {
            self.complete_cycle(now);
        }
    }

    fn complete_cycle(&mut self, now: Instant) {
        info!("cycle complete");
        match self.policy.as_mut().map(|policy| policy()) {
            Some(selection) => self.reload(selection, now),
            None => self.reset_cycle(now),
        }
        self.arm(now);
    }

    fn display(&self, now: Instant) -> DisplayState<'_, F::Handle> {
        if let Media::Unavailable(reason) = &self.media {
            return DisplayState::Unavailable(reason.clone());
        }

        match self.engine.phase() {
            PlaybackPhase::Playing | PlaybackPhase::Finishing => {
                let frame = |index: usize| match &self.media {
                    Media::Ready(sequence) => sequence
                        .materialized()
                        .and_then(|m| m.frame(index))
                        .map(|f| &f.handle),
                    _ => None,
                };
                let index = self.engine.current_index();
                if let Some(handle) = frame(index) {
                    return DisplayState::Playing {
                        frame: handle,
                        previous: self.engine.previous_index().and_then(frame),
                        index,
                        alpha: self.engine.alpha(),
                    };
                }
            }
            PlaybackPhase::NotReady | PlaybackPhase::Faded => {}
        }

        match self.scheduler.phase() {
            TriggerPhase::Due => DisplayState::Preparing,
            TriggerPhase::Armed if self.settings.show_countdown => DisplayState::Counting {
                remaining_secs: self.scheduler.remaining_secs(now).unwrap_or(0),
            },
            TriggerPhase::Armed | TriggerPhase::Idle => DisplayState::Hidden,
        }
    }

    #[must_use]
    pub fn status(&self, now: Instant) -> PlaybackStatus {
        match (self.scheduler.phase(), self.engine.phase()) {
            (_, PlaybackPhase::Playing | PlaybackPhase::Finishing) => PlaybackStatus::Playing,
            (TriggerPhase::Due, _) => PlaybackStatus::Preparing,
            (TriggerPhase::Armed, _) => {
                PlaybackStatus::CountingDown(self.scheduler.remaining_secs(now).unwrap_or(0))
            }
            (TriggerPhase::Idle, _) => PlaybackStatus::Idle,
        }
    }

    /// Whether the current generation is still decoding.
    #[must_use]
    pub fn decode_in_flight(&self) -> bool {
        matches!(lock(&self.slot).status, SlotStatus::Decoding)
    }

    /// Number of decode workers that have not exited yet, stale ones included.
    pub fn running_workers(&mut self) -> usize {
        self.workers.retain(|worker| !worker.is_finished());
        self.workers.len()
    }

    /// Current media is materialized and can play.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(&self.media, Media::Ready(_))
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        lock(&self.slot).generation
    }

    #[must_use]
    pub fn selection(&self) -> Option<&MediaSelection> {
        self.selection.as_ref()
    }

    #[must_use]
    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.scheduler.is_active()
    }

    /// Dimensions and kind of the playable media.
    #[must_use]
    pub fn media_info(&self) -> Option<((u32, u32), SequenceKind)> {
        match &self.media {
            Media::Ready(sequence) => sequence
                .materialized()
                .map(|m| (m.dimensions(), m.kind())),
            _ => None,
        }
    }

    pub fn texture_factory(&self) -> &F {
        self.materializer.factory()
    }
}

/// Insert the worker channel of a coordinator into the render loop.
///
/// # Errors
///
/// Fails if the event loop refuses the source.
pub fn insert_decode_source<D, F>(
    handle: &LoopHandle<'static, D>,
    channel: Channel<DecodeReady>,
    access: fn(&mut D) -> &mut ReloadCoordinator<F>,
) -> Result<RegistrationToken, calloop::Error>
where
    D: 'static,
    F: TextureFactory + 'static,
{
    handle
        .insert_source(channel, move |event, _, state: &mut D| match event {
            channel::Event::Msg(ready) => access(state).on_decoded(ready),
            channel::Event::Closed => debug!("decode channel closed"),
        })
        .map_err(|why| why.error)
}
