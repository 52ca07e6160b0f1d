// SPDX-License-Identifier: MPL-2.0

//! Settings for the jumpscare overlay.
//!
//! The overlay core only consumes a [`MediaSelection`] and a [`TriggerBounds`];
//! everything else here (pools, randomization, admission of new files, RON
//! persistence) belongs to the settings side.

pub mod media;

use std::{
    fs,
    path::{Path, PathBuf},
};

use derive_setters::Setters;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub use media::{AdmitError, MediaKind, MediaSelection, MAX_MEDIA_BYTES};

pub const NAME: &str = "jumpscare";
pub const CONFIG_FILE: &str = "config.ron";

/// Lowest accepted trigger delay in seconds.
pub const MIN_TRIGGER_SECS: u32 = 10;
/// Highest accepted trigger delay in seconds.
pub const MAX_TRIGGER_SECS: u32 = 100_000;

pub const DEFAULT_IMAGE: &str = "visual/default.gif";
pub const DEFAULT_SOUND: &str = "audio/foxy.wav";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no configuration directory available on this system")]
    NoConfigDir,
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),
}

/// Inclusive range the random trigger delay is drawn from.
///
/// Always satisfies `MIN_TRIGGER_SECS <= min < max <= MAX_TRIGGER_SECS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerBounds {
    min_secs: u32,
    max_secs: u32,
}

impl TriggerBounds {
    /// Strict constructor, `None` unless the pair is already valid.
    #[must_use]
    pub fn new(min_secs: u32, max_secs: u32) -> Option<Self> {
        (min_secs >= MIN_TRIGGER_SECS && max_secs <= MAX_TRIGGER_SECS && max_secs > min_secs)
            .then_some(Self { min_secs, max_secs })
    }

    /// Forces an arbitrary pair into a valid range, max first and then min.
    #[must_use]
    pub fn clamped(min_secs: u32, max_secs: u32) -> Self {
        let max_secs = max_secs.clamp(MIN_TRIGGER_SECS + 1, MAX_TRIGGER_SECS);
        let min_secs = min_secs.clamp(MIN_TRIGGER_SECS, max_secs - 1);
        Self { min_secs, max_secs }
    }

    #[must_use]
    pub fn min_secs(&self) -> u32 {
        self.min_secs
    }

    #[must_use]
    pub fn max_secs(&self) -> u32 {
        self.max_secs
    }
}

impl Default for TriggerBounds {
    fn default() -> Self {
        Self {
            min_secs: 60,
            max_secs: 600,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Setters)]
#[serde(default, deny_unknown_fields)]
#[must_use]
pub struct Config {
    /// the selected image, relative paths resolve against [`Config::data_dir`]
    pub image: PathBuf,
    /// the selected sound cue
    pub sound: Option<PathBuf>,
    /// images offered for selection, files or directories
    pub image_options: Vec<PathBuf>,
    /// sounds offered for selection, files or directories
    pub sound_options: Vec<PathBuf>,
    /// pick a random image from `image_options` on every cycle
    pub randomize_images: bool,
    /// pick a random sound from `sound_options` on every cycle
    pub randomize_sounds: bool,
    #[setters(skip)]
    pub min_trigger_secs: u32,
    #[setters(skip)]
    pub max_trigger_secs: u32,
    /// whether the host should draw the countdown while armed
    pub show_countdown: bool,
    /// length of the fade at the end of an animation
    pub fade_duration_ms: u32,
    /// how long a still image stays up before it fades
    pub still_hold_ms: u32,
    /// stage decoded frames as PNG files instead of keeping them in memory
    pub stage_frames: bool,
}

impl Default for Config {
    fn default() -> Self {
        let bounds = TriggerBounds::default();
        Self {
            image: PathBuf::from(DEFAULT_IMAGE),
            sound: Some(PathBuf::from(DEFAULT_SOUND)),
            image_options: default_image_options(),
            sound_options: default_sound_options(),
            randomize_images: false,
            randomize_sounds: false,
            min_trigger_secs: bounds.min_secs(),
            max_trigger_secs: bounds.max_secs(),
            show_countdown: false,
            fade_duration_ms: 1000,
            still_hold_ms: 3000,
            stage_frames: false,
        }
    }
}

fn default_image_options() -> Vec<PathBuf> {
    vec![PathBuf::from(DEFAULT_IMAGE)]
}

fn default_sound_options() -> Vec<PathBuf> {
    vec![PathBuf::from(DEFAULT_SOUND)]
}

impl Config {
    /// Location of the config file, `None` if the platform has no config dir.
    #[must_use]
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(NAME).join(CONFIG_FILE))
    }

    /// Directory bundled media is looked up in.
    #[must_use]
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(NAME)
            .join("data")
    }

    /// Load the config from its default location.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path().ok_or(ConfigError::NoConfigDir)?;
        Self::load_from(&path)
    }

    /// Load the config from `path`, defaults if the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(why) if why.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let mut config: Self = ron::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.ensure_defaults();
        Ok(config)
    }

    /// Persist to the default location.
    ///
    /// # Errors
    ///
    /// Fails if the config dir is unavailable or the file cannot be written.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Persist to `path`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be serialized or written.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::new())?;
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, text).map_err(io_err)
    }

    /// Repairs a loaded config: empty pools get their defaults, the selected
    /// media is always part of its pool, and the trigger bounds are valid.
    pub fn ensure_defaults(&mut self) {
        if self.image_options.is_empty() {
            self.image_options = default_image_options();
        }
        if self.sound_options.is_empty() {
            self.sound_options = default_sound_options();
        }
        if !self.image_options.contains(&self.image) {
            self.image_options.push(self.image.clone());
        }
        if let Some(sound) = &self.sound {
            if !self.sound_options.contains(sound) {
                self.sound_options.push(sound.clone());
            }
        }
        let bounds = self.bounds();
        self.min_trigger_secs = bounds.min_secs();
        self.max_trigger_secs = bounds.max_secs();
    }

    #[must_use]
    pub fn bounds(&self) -> TriggerBounds {
        TriggerBounds::clamped(self.min_trigger_secs, self.max_trigger_secs)
    }

    /// Sets the lower trigger bound, clamped below the current upper bound.
    pub fn set_min_trigger_secs(&mut self, secs: u32) {
        let upper = self.max_trigger_secs.max(MIN_TRIGGER_SECS + 1) - 1;
        self.min_trigger_secs = secs.clamp(MIN_TRIGGER_SECS, upper);
    }

    /// Sets the upper trigger bound, clamped above the current lower bound.
    pub fn set_max_trigger_secs(&mut self, secs: u32) {
        let lower = (self.min_trigger_secs.max(MIN_TRIGGER_SECS) + 1).min(MAX_TRIGGER_SECS);
        self.max_trigger_secs = secs.clamp(lower, MAX_TRIGGER_SECS);
    }

    pub fn reset_image_options(&mut self) {
        self.image_options = default_image_options();
        self.image = PathBuf::from(DEFAULT_IMAGE);
    }

    pub fn reset_sound_options(&mut self) {
        self.sound_options = default_sound_options();
        self.sound = Some(PathBuf::from(DEFAULT_SOUND));
    }

    /// Adds a new image to the pool and selects it.
    ///
    /// Returns `Ok(false)` when the path was already offered.
    ///
    /// # Errors
    ///
    /// Fails with the rejection reason if the file is not acceptable.
    pub fn add_image_option(&mut self, path: PathBuf) -> Result<bool, AdmitError> {
        media::admit(&path, MediaKind::Image)?;
        if self.image_options.contains(&path) {
            return Ok(false);
        }
        self.image_options.push(path.clone());
        self.image = path;
        Ok(true)
    }

    /// Adds a new sound to the pool and selects it.
    ///
    /// # Errors
    ///
    /// Fails with the rejection reason if the file is not acceptable.
    pub fn add_sound_option(&mut self, path: PathBuf) -> Result<bool, AdmitError> {
        media::admit(&path, MediaKind::Sound)?;
        if self.sound_options.contains(&path) {
            return Ok(false);
        }
        self.sound_options.push(path.clone());
        self.sound = Some(path);
        Ok(true)
    }

    /// Resolves a configured path, relative ones against [`Config::data_dir`].
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Self::data_dir().join(path)
        }
    }

    /// The media for the next cycle, honoring the randomization toggles.
    pub fn selection<R: Rng + ?Sized>(&self, rng: &mut R) -> MediaSelection {
        let image = if self.randomize_images {
            media::pick(&self.pool(&self.image_options, MediaKind::Image), rng)
        } else {
            None
        }
        .unwrap_or_else(|| self.resolve(&self.image));

        let sound = if self.randomize_sounds {
            media::pick(&self.pool(&self.sound_options, MediaKind::Sound), rng)
        } else {
            None
        }
        .or_else(|| self.sound.as_deref().map(|sound| self.resolve(sound)));

        MediaSelection { image, sound }
    }

    fn pool(&self, entries: &[PathBuf], kind: MediaKind) -> Vec<PathBuf> {
        let resolved: Vec<PathBuf> = entries.iter().map(|p| self.resolve(p)).collect();
        media::expand_pool(&resolved, kind)
    }
}
