// SPDX-License-Identifier: MPL-2.0

use std::time::{Duration, Instant};

use calloop::{
    EventLoop,
    signals::{Signal, Signals},
    timer::{TimeoutAction, Timer},
};
use eyre::WrapErr;
use jumpscare::{
    CoordinatorSettings, DisplayState, ReloadCoordinator, RenderThread, ShmTextures,
    config::Config,
    coordinator::SelectionPolicy,
    insert_decode_source,
    scratch::ScratchArena,
    sound::default_cue_player,
    watch,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Render tick, roughly 60 Hz.
const TICK: Duration = Duration::from_millis(16);

/// Coarse display state, logged whenever it changes.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Presented {
    Hidden,
    Counting(u64),
    Preparing,
    Playing(usize),
    Fading,
    Unavailable,
}

struct Overlay {
    coordinator: ReloadCoordinator<ShmTextures>,
    config: Config,
    arena: ScratchArena,
    presented: Presented,
    exit: bool,
}

impl Overlay {
    fn present(&mut self, now: Instant) {
        let presented = match self.coordinator.render(now) {
            DisplayState::Hidden => Presented::Hidden,
            DisplayState::Counting { remaining_secs } => Presented::Counting(remaining_secs),
            DisplayState::Preparing => Presented::Preparing,
            DisplayState::Playing { index, alpha, .. } if alpha >= 1.0 => {
                Presented::Playing(index)
            }
            DisplayState::Playing { .. } => Presented::Fading,
            DisplayState::Unavailable(reason) => {
                if self.presented != Presented::Unavailable {
                    warn!(%reason, "overlay unavailable");
                }
                Presented::Unavailable
            }
        };

        if presented == self.presented {
            return;
        }

        match presented {
            Presented::Counting(secs) => debug!(secs, "countdown"),
            Presented::Playing(index) => debug!(index, "frame"),
            Presented::Unavailable => {}
            other => info!(state = ?other, "overlay"),
        }
        self.presented = presented;
    }

    fn reload_config(&mut self) {
        let config = match Config::load() {
            Ok(config) => config,
            Err(why) => {
                warn!(%why, "ignoring invalid config");
                return;
            }
        };
        if config == self.config {
            return;
        }

        let now = Instant::now();
        let settings = CoordinatorSettings::from_config(&config, Some(&self.arena));
        let media_changed = config.image != self.config.image
            || config.sound != self.config.sound
            || config.image_options != self.config.image_options
            || config.sound_options != self.config.sound_options
            || config.randomize_images != self.config.randomize_images
            || config.randomize_sounds != self.config.randomize_sounds
            || config.stage_frames != self.config.stage_frames;

        self.coordinator.set_settings(settings);
        self.coordinator.set_policy(selection_policy(&config));
        if media_changed {
            info!("media settings changed");
            self.coordinator
                .reload(config.selection(&mut rand::rng()), now);
        } else {
            info!("timing settings changed");
        }
        self.config = config;
    }
}

/// Re-roll the media every cycle when any pool is randomized.
fn selection_policy(config: &Config) -> Option<SelectionPolicy> {
    if !(config.randomize_images || config.randomize_sounds) {
        return None;
    }
    let config = config.clone();
    Some(Box::new(move || config.selection(&mut rand::rng())))
}

fn coordinator(overlay: &mut Overlay) -> &mut ReloadCoordinator<ShmTextures> {
    &mut overlay.coordinator
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(why) => {
            warn!(%why, "config file error, falling back to defaults");
            Config::default()
        }
    };

    let arena = ScratchArena::for_process();
    arena.purge();

    let render_thread =
        RenderThread::claim().ok_or_else(|| eyre::eyre!("render thread already claimed"))?;
    let mut event_loop: EventLoop<Overlay> =
        EventLoop::try_new().wrap_err("failed to create event loop")?;

    let (coordinator_, decode_channel) = ReloadCoordinator::new(
        render_thread,
        ShmTextures::default(),
        default_cue_player(),
        CoordinatorSettings::from_config(&config, Some(&arena)),
    );
    insert_decode_source(&event_loop.handle(), decode_channel, coordinator)
        .wrap_err("failed to watch decode workers")?;

    event_loop
        .handle()
        .insert_source(Timer::from_duration(TICK), |_, _, overlay: &mut Overlay| {
            let span = tracing::debug_span!("Overlay::tick");
            let _handle = span.enter();

            overlay.present(Instant::now());
            TimeoutAction::ToDuration(TICK)
        })
        .map_err(|why| why.error)
        .wrap_err("failed to insert tick timer")?;

    let signals = Signals::new(&[
        Signal::SIGINT,
        Signal::SIGTERM,
        Signal::SIGUSR1,
        Signal::SIGUSR2,
    ])
    .wrap_err("failed to install signal handlers")?;
    event_loop
        .handle()
        .insert_source(signals, |event, _, overlay: &mut Overlay| {
            let now = Instant::now();
            match event.signal() {
                Signal::SIGUSR1 => {
                    overlay.coordinator.toggle(now);
                }
                Signal::SIGUSR2 => {
                    info!("resetting cycle");
                    overlay.coordinator.reset_cycle(now);
                }
                signal => {
                    info!(?signal, "shutting down");
                    overlay.exit = true;
                }
            }
        })
        .map_err(|why| why.error)
        .wrap_err("failed to insert signal source")?;

    // the watcher stops when dropped
    let _watcher = match Config::path() {
        Some(path) => {
            let tx = watch::change_source(&event_loop.handle(), |overlay: &mut Overlay, _| {
                overlay.reload_config();
            })
            .wrap_err("failed to insert config watcher")?;
            match watch::watch_file(&path, tx) {
                Ok(watcher) => Some(watcher),
                Err(why) => {
                    warn!(%why, path = %path.display(), "config changes will not be picked up");
                    None
                }
            }
        }
        None => None,
    };

    let mut overlay = Overlay {
        coordinator: coordinator_,
        presented: Presented::Hidden,
        exit: false,
        config,
        arena,
    };

    let now = Instant::now();
    let selection = overlay.config.selection(&mut rand::rng());
    overlay
        .coordinator
        .set_policy(selection_policy(&overlay.config));
    overlay.coordinator.reload(selection, now);
    overlay.coordinator.arm(now);

    info!("jumpscare running, SIGUSR1 toggles, SIGUSR2 resets");
    while !overlay.exit {
        event_loop.dispatch(None, &mut overlay)?;
    }

    drop(overlay.coordinator);
    overlay.arena.purge();
    Ok(())
}
