// SPDX-License-Identifier: MPL-2.0

//! Core types for decoded overlay media.

use std::path::{Path, PathBuf};

use image::RgbaImage;

use crate::scratch::StagedFrames;

/// Delay used when a frame carries no usable timing metadata.
pub const DEFAULT_FRAME_DELAY_MS: u32 = 100;

/// Shortest delay a frame may have.
pub const MIN_FRAME_DELAY_MS: u32 = 10;

/// Raw delays up to this value are read as hundredths of a second.
pub const CENTISECOND_CEILING: u32 = 1000;

/// Interpret a raw container delay as milliseconds.
///
/// Values up to [`CENTISECOND_CEILING`] are centiseconds, larger values are
/// taken as milliseconds already. The result is never below
/// [`MIN_FRAME_DELAY_MS`]. `None` means the frame has no usable delay and the
/// caller falls back to [`DEFAULT_FRAME_DELAY_MS`].
#[must_use]
pub fn delay_from_raw(raw: u32) -> Option<u32> {
    match raw {
        0 => None,
        r if r <= CENTISECOND_CEILING => Some((r * 10).max(MIN_FRAME_DELAY_MS)),
        r => Some(r),
    }
}

/// Where the pixels of a decoded frame live.
#[derive(Clone)]
pub enum PixelSource {
    /// RGBA raster kept in memory.
    Memory(RgbaImage),
    /// PNG staged in the scratch arena.
    Staged(PathBuf),
}

impl std::fmt::Debug for PixelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory(image) => write!(f, "Memory({}x{})", image.width(), image.height()),
            Self::Staged(path) => write!(f, "Staged({})", path.display()),
        }
    }
}

/// One decoded frame with its display duration.
#[derive(Debug, Clone)]
pub struct FrameDescriptor {
    pixels: PixelSource,
    delay_ms: u32,
}

impl FrameDescriptor {
    #[must_use]
    pub fn new(pixels: PixelSource, delay_ms: u32) -> Self {
        Self {
            pixels,
            delay_ms: delay_ms.max(1),
        }
    }

    #[must_use]
    pub fn pixels(&self) -> &PixelSource {
        &self.pixels
    }

    /// Always positive.
    #[must_use]
    pub fn delay_ms(&self) -> u32 {
        self.delay_ms
    }
}

/// Still images never advance past their only frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    Still,
    Animated,
}

/// The ordered frames decoded from one media file for one generation.
#[derive(Debug)]
pub struct DecodedSequence {
    pub(crate) source: PathBuf,
    pub(crate) generation: u64,
    pub(crate) kind: SequenceKind,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) frames: Vec<FrameDescriptor>,
    /// Keeps staged files alive until the sequence is dropped.
    pub(crate) staging: Option<StagedFrames>,
}

impl DecodedSequence {
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn kind(&self) -> SequenceKind {
        self.kind
    }

    /// Canvas size of the container.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn frames(&self) -> &[FrameDescriptor] {
        &self.frames
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Sum of all frame delays.
    #[must_use]
    pub fn total_duration_ms(&self) -> u64 {
        self.frames.iter().map(|f| u64::from(f.delay_ms)).sum()
    }

    #[must_use]
    pub fn is_staged(&self) -> bool {
        self.staging.is_some()
    }
}
