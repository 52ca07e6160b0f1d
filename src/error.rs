// SPDX-License-Identifier: MPL-2.0

//! Error types of the overlay pipeline.
//!
//! None of these cross the worker/render handoff as errors; the coordinator
//! folds them into an [`UnavailableReason`](crate::coordinator::UnavailableReason).

use std::path::PathBuf;

/// Failure to turn a media file into a frame sequence.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("media not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid GIF {}: {source}", .path.display())]
    Gif {
        path: PathBuf,
        #[source]
        source: gif::DecodingError,
    },
    #[error("failed to decode image {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{} contains no frames", .0.display())]
    Empty(PathBuf),
    #[error("failed to create staging directory {}: {source}", .dir.display())]
    ScratchDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to stage frames of generation {generation}: {source}")]
    Scratch {
        generation: u64,
        #[source]
        source: image::ImageError,
    },
}

/// Failure to create a renderable handle for one frame.
#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("frame has no pixels")]
    EmptyImage,
    #[error("failed to load staged frame: {0}")]
    Load(#[from] image::ImageError),
    #[error("texture backend refused frame: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error("frame {index} could not be materialized: {source}")]
    Frame {
        index: usize,
        #[source]
        source: TextureError,
    },
    #[error("no frame of the sequence could be materialized")]
    NoFrames,
}

#[derive(Debug, thiserror::Error)]
pub enum SoundError {
    #[error("sound file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to open sound {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode sound {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },
    #[error("no audio output available: {0}")]
    Output(String),
}
