// SPDX-License-Identifier: MPL-2.0

//! Frame-accurate playback of one overlay cycle.
//!
//! [`PlaybackEngine`] advances over the delay timeline of a materialized
//! sequence from wall-clock deltas, fires the sound cue once, and fades the
//! overlay out after the last frame.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::sound::{CueHandle, CuePlayer};

/// Fade duration used when none is configured.
pub const DEFAULT_FADE_DURATION_MS: f32 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No sequence has been handed over yet.
    NotReady,
    Playing,
    /// Holding the last frame while alpha falls to zero.
    Finishing,
    /// Terminal for the cycle.
    Faded,
}

/// Playback state of one cycle. Lives on the render thread.
#[derive(Debug)]
pub struct PlaybackEngine {
    phase: Phase,
    delays: Vec<u32>,
    current_index: usize,
    previous_index: Option<usize>,
    elapsed_ms: f32,
    fade_timer_ms: f32,
    fade_duration_ms: f32,
    /// Set by `begin`, cleared by the first tick.
    skip_next_tick: bool,
    playing_ms: f32,
    sound: Option<PathBuf>,
    sound_fired: bool,
    cue: Option<CueHandle>,
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new(DEFAULT_FADE_DURATION_MS)
    }
}

impl PlaybackEngine {
    #[must_use]
    pub fn new(fade_duration_ms: f32) -> Self {
        let fade_duration_ms = if fade_duration_ms.is_finite() {
            fade_duration_ms.max(1.0)
        } else {
            DEFAULT_FADE_DURATION_MS
        };

        Self {
            phase: Phase::NotReady,
            delays: Vec::new(),
            current_index: 0,
            previous_index: None,
            elapsed_ms: 0.0,
            fade_timer_ms: 0.0,
            fade_duration_ms,
            skip_next_tick: false,
            playing_ms: 0.0,
            sound: None,
            sound_fired: false,
            cue: None,
        }
    }

    /// Start a cycle over `delays`.
    ///
    /// Ignored unless the engine is `NotReady` and the timeline has frames.
    pub fn begin(&mut self, delays: Vec<u32>, sound: Option<PathBuf>) {
        if self.phase != Phase::NotReady {
            warn!(phase = ?self.phase, "playback already started");
            return;
        }
        if delays.is_empty() {
            warn!("refusing to play an empty timeline");
            return;
        }

        debug!(frames = delays.len(), "playback started");
        self.delays = delays;
        self.sound = sound;
        self.skip_next_tick = true;
        self.phase = Phase::Playing;
    }

    /// Advance by `delta_ms` of wall-clock time.
    ///
    /// Deltas that are negative or not finite count as zero.
    pub fn tick(&mut self, delta_ms: f32, cues: &mut dyn CuePlayer) -> Phase {
        let mut delta = if delta_ms.is_finite() {
            delta_ms.max(0.0)
        } else {
            0.0
        };

        match self.phase {
            Phase::NotReady | Phase::Faded => {}

            Phase::Playing => {
                if !self.sound_fired {
                    self.fire_cue(cues);
                }

                // the first frame may have taken arbitrarily long to show up
                if std::mem::take(&mut self.skip_next_tick) {
                    delta = 0.0;
                }

                self.playing_ms += delta;
                if !self.is_still() {
                    self.advance(delta);
                }
            }

            Phase::Finishing => {
                self.fade_timer_ms = (self.fade_timer_ms + delta).min(self.fade_duration_ms);
                if self.fade_timer_ms >= self.fade_duration_ms {
                    debug!("playback faded");
                    self.phase = Phase::Faded;
                }
            }
        }

        self.phase
    }

    fn advance(&mut self, delta: f32) {
        self.elapsed_ms += delta;

        while let Some(&delay) = self.delays.get(self.current_index) {
            let delay = delay as f32;
            if self.elapsed_ms < delay {
                break;
            }
            self.elapsed_ms -= delay;

            if self.current_index + 1 >= self.delays.len() {
                debug!(index = self.current_index, "last frame shown, fading out");
                self.enter_finishing();
                break;
            }

            self.previous_index = Some(self.current_index);
            self.current_index += 1;
        }
    }

    fn enter_finishing(&mut self) {
        self.phase = Phase::Finishing;
        self.fade_timer_ms = 0.0;
    }

    fn fire_cue(&mut self, cues: &mut dyn CuePlayer) {
        self.sound_fired = true;
        let Some(sound) = self.sound.as_deref() else {
            return;
        };

        match cues.play(sound) {
            Ok(handle) => self.cue = Some(handle),
            Err(why) => warn!(%why, "sound cue failed"),
        }
    }

    /// Start the fade explicitly. Used to end stills, which never finish by
    /// themselves.
    pub fn fade_out(&mut self) -> bool {
        if self.phase != Phase::Playing {
            return false;
        }
        self.enter_finishing();
        true
    }

    /// Drop the timeline and the cue handle.
    pub fn reset(&mut self) {
        *self = Self::new(self.fade_duration_ms);
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Overlay opacity in `[0, 1]`.
    #[must_use]
    pub fn alpha(&self) -> f32 {
        match self.phase {
            Phase::NotReady | Phase::Faded => 0.0,
            Phase::Playing => 1.0,
            Phase::Finishing => 1.0 - self.fade_timer_ms / self.fade_duration_ms,
        }
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// The frame shown before the current one, exposed while finishing so it
    /// can be drawn beneath.
    #[must_use]
    pub fn previous_index(&self) -> Option<usize> {
        match self.phase {
            Phase::Finishing => self.previous_index,
            _ => None,
        }
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> f32 {
        self.elapsed_ms
    }

    #[must_use]
    pub fn fade_timer_ms(&self) -> f32 {
        self.fade_timer_ms
    }

    #[must_use]
    pub fn fade_duration_ms(&self) -> f32 {
        self.fade_duration_ms
    }

    #[must_use]
    pub fn sound_fired(&self) -> bool {
        self.sound_fired
    }

    #[must_use]
    pub fn is_still(&self) -> bool {
        self.delays.len() == 1
    }

    /// Time spent in `Playing` since `begin`.
    #[must_use]
    pub fn playing_ms(&self) -> f32 {
        self.playing_ms
    }

    #[must_use]
    pub fn total_duration_ms(&self) -> u64 {
        self.delays.iter().copied().map(u64::from).sum()
    }
}
