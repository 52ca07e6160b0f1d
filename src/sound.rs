// SPDX-License-Identifier: MPL-2.0

//! One-shot sound cues.
//!
//! Every playback cycle fires at most one cue. The returned [`CueHandle`]
//! keeps the sound alive and is owned by the playback engine until the cycle
//! ends. Dropping it stops the sound.

use std::{any::Any, path::Path};

use tracing::info;

use crate::error::SoundError;

/// Keeps a playing cue alive.
pub struct CueHandle {
    _keep: Option<Box<dyn Any>>,
}

impl CueHandle {
    pub fn new(keep: impl Any) -> Self {
        Self {
            _keep: Some(Box::new(keep)),
        }
    }

    /// A handle for a cue that needs nothing kept alive.
    #[must_use]
    pub fn detached() -> Self {
        Self { _keep: None }
    }
}

impl std::fmt::Debug for CueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CueHandle").finish_non_exhaustive()
    }
}

/// Plays a sound file once.
pub trait CuePlayer {
    /// # Errors
    ///
    /// Fails if the file is missing, undecodable, or no output is available.
    fn play(&mut self, path: &Path) -> Result<CueHandle, SoundError>;
}

/// Logs cues instead of playing them.
#[derive(Debug, Default)]
pub struct SilentCues;

impl CuePlayer for SilentCues {
    fn play(&mut self, path: &Path) -> Result<CueHandle, SoundError> {
        if !path.exists() {
            return Err(SoundError::NotFound(path.to_path_buf()));
        }
        info!(path = %path.display(), "sound cue (audio output disabled)");
        Ok(CueHandle::detached())
    }
}

#[cfg(feature = "audio")]
pub use self::rodio_cues::RodioCues;

#[cfg(feature = "audio")]
mod rodio_cues {
    use std::{fs::File, io::BufReader, path::Path};

    use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
    use tracing::debug;

    use super::{CueHandle, CuePlayer};
    use crate::error::SoundError;

    /// Plays cues on the default audio output.
    pub struct RodioCues {
        stream: OutputStream,
    }

    impl RodioCues {
        /// # Errors
        ///
        /// Fails if no default output device can be opened.
        pub fn open_default() -> Result<Self, SoundError> {
            let stream = OutputStreamBuilder::open_default_stream()
                .map_err(|why| SoundError::Output(why.to_string()))?;
            Ok(Self { stream })
        }
    }

    impl CuePlayer for RodioCues {
        fn play(&mut self, path: &Path) -> Result<CueHandle, SoundError> {
            let file = File::open(path).map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    SoundError::NotFound(path.to_path_buf())
                } else {
                    SoundError::Open {
                        path: path.to_path_buf(),
                        source,
                    }
                }
            })?;

            let decoder = Decoder::new(BufReader::new(file)).map_err(|why| SoundError::Decode {
                path: path.to_path_buf(),
                reason: why.to_string(),
            })?;

            let sink = Sink::connect_new(self.stream.mixer());
            sink.append(decoder);
            debug!(path = %path.display(), "sound cue started");

            Ok(CueHandle::new(sink))
        }
    }
}

/// The cue player for this build: rodio when the `audio` feature is on and an
/// output device exists, the silent player otherwise.
#[must_use]
pub fn default_cue_player() -> Box<dyn CuePlayer> {
    #[cfg(feature = "audio")]
    {
        match RodioCues::open_default() {
            Ok(player) => return Box::new(player),
            Err(why) => tracing::warn!(%why, "audio output unavailable, cues are silent"),
        }
    }

    Box::new(SilentCues)
}
