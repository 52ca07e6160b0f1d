// SPDX-License-Identifier: MPL-2.0

//! Frame decoding for overlay media.
//!
//! [`decode`] reads a GIF or a still image into a [`DecodedSequence`]. It runs
//! on a worker thread and never creates render resources.

use std::{fs::File, io::BufReader, path::Path};

use gif::DisposalMethod;
use image::{ImageReader, Rgba, RgbaImage};
use tracing::{debug, debug_span, info, warn};

use super::detection::{MediaFormat, detect};
use super::types::{
    DEFAULT_FRAME_DELAY_MS, DecodedSequence, FrameDescriptor, PixelSource, SequenceKind,
    delay_from_raw,
};
use crate::error::DecodeError;
use crate::scratch::{ScratchArena, StagedFrames};

/// Options for one decode.
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Stage every frame as PNG below this arena instead of keeping the
    /// rasters in memory.
    pub scratch: Option<ScratchArena>,
}

impl DecodeOptions {
    #[must_use]
    pub fn staged(arena: ScratchArena) -> Self {
        Self {
            scratch: Some(arena),
        }
    }
}

/// Decode `path` into an ordered frame sequence tagged with `generation`.
///
/// # Errors
///
/// `NotFound` if the path does not exist; any other variant if the file
/// could not be read as an image, yielded no frame, or staging failed.
pub fn decode(
    path: &Path,
    generation: u64,
    options: &DecodeOptions,
) -> Result<DecodedSequence, DecodeError> {
    let _span = debug_span!("decode", path = %path.display(), generation).entered();

    match std::fs::metadata(path) {
        Ok(_) => {}
        Err(why) if why.kind() == std::io::ErrorKind::NotFound => {
            return Err(DecodeError::NotFound(path.to_path_buf()));
        }
        Err(source) => {
            return Err(DecodeError::Open {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    let (width, height, rasters) = match detect(path) {
        MediaFormat::Gif => decode_gif(path)?,
        MediaFormat::Still => decode_still(path)?,
    };

    if rasters.is_empty() {
        return Err(DecodeError::Empty(path.to_path_buf()));
    }

    let kind = if rasters.len() == 1 {
        SequenceKind::Still
    } else {
        SequenceKind::Animated
    };

    let (frames, staging) = match &options.scratch {
        Some(arena) => {
            let staged = arena
                .stage(generation)
                .map_err(|source| DecodeError::ScratchDir {
                    dir: arena.root().to_path_buf(),
                    source,
                })?;
            let frames = stage_frames(&staged, rasters, generation)?;
            (frames, Some(staged))
        }
        None => (
            rasters
                .into_iter()
                .map(|(raster, delay)| FrameDescriptor::new(PixelSource::Memory(raster), delay))
                .collect(),
            None,
        ),
    };

    let sequence = DecodedSequence {
        source: path.to_path_buf(),
        generation,
        kind,
        width,
        height,
        frames,
        staging,
    };

    info!(
        path = %path.display(),
        generation,
        frames = sequence.len(),
        duration_ms = sequence.total_duration_ms(),
        staged = sequence.is_staged(),
        "decoded media"
    );

    Ok(sequence)
}

type Rasters = Vec<(RgbaImage, u32)>;

fn stage_frames(
    staged: &StagedFrames,
    rasters: Rasters,
    generation: u64,
) -> Result<Vec<FrameDescriptor>, DecodeError> {
    rasters
        .into_iter()
        .enumerate()
        .map(|(index, (raster, delay))| {
            staged
                .write_frame(index, &raster)
                .map(|path| FrameDescriptor::new(PixelSource::Staged(path), delay))
                .map_err(|source| DecodeError::Scratch { generation, source })
        })
        .collect()
}

fn decode_still(path: &Path) -> Result<(u32, u32, Rasters), DecodeError> {
    let open_err = |source| DecodeError::Open {
        path: path.to_path_buf(),
        source,
    };

    let image = ImageReader::open(path)
        .map_err(open_err)?
        .with_guessed_format()
        .map_err(open_err)?
        .decode()
        .map_err(|source| DecodeError::Image {
            path: path.to_path_buf(),
            source,
        })?
        .into_rgba8();

    debug!(width = image.width(), height = image.height(), "decoded still image");
    Ok((
        image.width(),
        image.height(),
        vec![(image, DEFAULT_FRAME_DELAY_MS)],
    ))
}

/// Rectangle a GIF frame occupies on the logical screen.
#[derive(Debug, Clone, Copy)]
struct FrameRect {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
}

/// What to do to the canvas before drawing the next frame.
enum Pending {
    Nothing,
    Clear(FrameRect),
    Restore(RgbaImage),
}

fn decode_gif(path: &Path) -> Result<(u32, u32, Rasters), DecodeError> {
    let gif_err = |source| DecodeError::Gif {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(|source| DecodeError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::RGBA);
    let mut decoder = options.read_info(BufReader::new(file)).map_err(gif_err)?;

    let width = u32::from(decoder.width());
    let height = u32::from(decoder.height());
    let mut canvas = RgbaImage::new(width, height);
    let mut pending = Pending::Nothing;
    let mut rasters = Rasters::new();

    loop {
        let frame = match decoder.read_next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(why) if !rasters.is_empty() => {
                warn!(?why, decoded = rasters.len(), "GIF stream broken, keeping decoded frames");
                break;
            }
            Err(why) => return Err(gif_err(why)),
        };

        let index = rasters.len();
        let delay = delay_from_raw(u32::from(frame.delay)).unwrap_or_else(|| {
            debug!(frame = index, "frame has no delay metadata, using default");
            DEFAULT_FRAME_DELAY_MS
        });
        let rect = FrameRect {
            left: u32::from(frame.left),
            top: u32::from(frame.top),
            width: u32::from(frame.width),
            height: u32::from(frame.height),
        };

        match std::mem::replace(&mut pending, Pending::Nothing) {
            Pending::Nothing => {}
            Pending::Clear(previous) => clear_rect(&mut canvas, previous),
            Pending::Restore(saved) => canvas = saved,
        }

        if frame.dispose == DisposalMethod::Previous {
            pending = Pending::Restore(canvas.clone());
        }

        let expected = rect.width as usize * rect.height as usize * 4;
        if frame.buffer.len() == expected {
            blit(&mut canvas, &frame.buffer, rect);
            rasters.push((canvas.clone(), delay));
        } else {
            warn!(
                frame = index,
                expected,
                actual = frame.buffer.len(),
                "frame buffer size mismatch, repeating canvas"
            );
            rasters.push((canvas.clone(), DEFAULT_FRAME_DELAY_MS));
        }

        if frame.dispose == DisposalMethod::Background {
            pending = Pending::Clear(rect);
        }
    }

    debug!(width, height, frames = rasters.len(), "decoded GIF");
    Ok((width, height, rasters))
}

/// Draw the opaque pixels of a frame onto the canvas, clipped to its bounds.
fn blit(canvas: &mut RgbaImage, buffer: &[u8], rect: FrameRect) {
    if rect.width == 0 {
        return;
    }
    for (row, line) in buffer.chunks_exact(rect.width as usize * 4).enumerate() {
        let y = rect.top + row as u32;
        if y >= canvas.height() {
            break;
        }
        for (col, px) in line.chunks_exact(4).enumerate() {
            let x = rect.left + col as u32;
            if x >= canvas.width() {
                break;
            }
            if px[3] != 0 {
                canvas.put_pixel(x, y, Rgba([px[0], px[1], px[2], px[3]]));
            }
        }
    }
}

fn clear_rect(canvas: &mut RgbaImage, rect: FrameRect) {
    let right = (rect.left + rect.width).min(canvas.width());
    let bottom = (rect.top + rect.height).min(canvas.height());
    for y in rect.top..bottom {
        for x in rect.left..right {
            canvas.put_pixel(x, y, Rgba([0, 0, 0, 0]));
        }
    }
}
