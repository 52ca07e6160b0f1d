// SPDX-License-Identifier: MPL-2.0

//! Animated overlay media.
//!
//! # Module Structure
//!
//! - [`types`]: Frame descriptors, decoded sequences and the delay heuristic
//! - [`detection`]: File type detection
//! - [`decoder`]: GIF and still image decoding, runs on worker threads
//! - [`player`]: Frame timing and fade-out of one playback cycle
//!
//! # Supported Formats
//!
//! | Format | Extension | Frames |
//! |--------|-----------|--------|
//! | GIF    | `.gif`    | All frames, composited onto the logical screen |
//! | PNG    | `.png`    | Single frame |
//! | JPEG   | `.jpg`, `.jpeg` | Single frame |
//! | WebP   | `.webp`   | Single frame |

pub mod decoder;
pub mod detection;
pub mod player;
pub mod types;

pub use decoder::{DecodeOptions, decode};
pub use detection::{MediaFormat, detect};
pub use player::{PlaybackEngine, Phase as PlaybackPhase};
pub use types::{DecodedSequence, FrameDescriptor, PixelSource, SequenceKind};

#[cfg(test)]
mod tests;
