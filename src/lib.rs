// SPDX-License-Identifier: MPL-2.0

//! Core of the jumpscare overlay.
//!
//! A randomized countdown fires a full-screen animated overlay together with
//! a one-shot sound, fades it out after the last frame and arms itself again.
//!
//! - [`animated`] decodes media on worker threads and times playback
//! - [`texture`] turns decoded frames into render handles on the render thread
//! - [`scheduler`] draws and tracks the countdown
//! - [`coordinator`] ties them together and hot-swaps media safely

pub mod animated;
pub mod coordinator;
pub mod error;
pub mod scheduler;
pub mod scratch;
pub mod sound;
pub mod texture;
pub mod watch;

pub use jumpscare_config as config;

pub use coordinator::{
    CoordinatorSettings, DecodeReady, DisplayState, PlaybackStatus, ReloadCoordinator,
    UnavailableReason, insert_decode_source,
};
pub use texture::{RenderThread, ShmTextures, TextureFactory};
