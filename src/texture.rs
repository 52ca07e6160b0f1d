// SPDX-License-Identifier: MPL-2.0

//! Render-thread materialization of decoded frames.
//!
//! Texture handles may only be created on the render thread. That thread
//! holds the single [`RenderThread`] token, which is neither `Send` nor
//! `Sync`, and every materialization borrows it. Only one token exists in
//! the process at a time, so a worker can neither receive the render
//! thread's token nor claim one of its own.

use std::{
    marker::PhantomData,
    path::{Path, PathBuf},
    rc::Rc,
    sync::atomic::{AtomicBool, Ordering},
};

use image::RgbaImage;
use tracing::{debug, warn};

use crate::animated::{DecodedSequence, PixelSource, SequenceKind};
use crate::error::{MaterializeError, TextureError};
use crate::scratch::StagedFrames;

static CLAIMED: AtomicBool = AtomicBool::new(false);

/// Proof that the current thread is the render thread.
#[derive(Debug)]
pub struct RenderThread {
    _not_send: PhantomData<*const ()>,
}

impl RenderThread {
    /// Claim the current thread as render thread.
    ///
    /// Returns `None` while any thread of the process holds a token.
    #[must_use]
    pub fn claim() -> Option<Self> {
        CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                _not_send: PhantomData,
            })
    }

    /// Wait until the token is free. Tests run in parallel and share it.
    #[cfg(test)]
    pub(crate) fn claim_when_free() -> Self {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(120);
        loop {
            if let Some(token) = Self::claim() {
                return token;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "render thread token was never released"
            );
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        CLAIMED.store(false, Ordering::Release);
    }
}

/// Creates renderable handles from RGBA rasters.
pub trait TextureFactory {
    type Handle: Clone;

    /// # Errors
    ///
    /// Fails if the backend cannot hold the frame.
    fn create(
        &mut self,
        render_thread: &RenderThread,
        image: &RgbaImage,
    ) -> Result<Self::Handle, TextureError>;
}

/// Pixel buffer in the little-endian ARGB8888 layout of a shm pool.
#[derive(Debug, PartialEq, Eq)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub data: Vec<u8>,
}

/// Texture factory producing shared-memory style pixel buffers.
#[derive(Debug, Default)]
pub struct ShmTextures {
    created: usize,
}

impl ShmTextures {
    /// Number of handles created so far.
    #[must_use]
    pub fn created(&self) -> usize {
        self.created
    }
}

impl TextureFactory for ShmTextures {
    type Handle = Rc<Texture>;

    fn create(&mut self, _: &RenderThread, image: &RgbaImage) -> Result<Self::Handle, TextureError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(TextureError::EmptyImage);
        }

        let mut data = vec![0u8; image.as_raw().len()];
        argb8888_canvas(&mut data, image);
        self.created += 1;

        Ok(Rc::new(Texture {
            width: image.width(),
            height: image.height(),
            stride: image.width() * 4,
            data,
        }))
    }
}

/// Draws the image on an 8-bit canvas with alpha.
pub fn argb8888_canvas(canvas: &mut [u8], image: &RgbaImage) {
    for (pos, pixel) in image.pixels().enumerate() {
        let indice = pos * 4;

        let [r, g, b, a] = pixel.0;

        let a = u32::from(a) << 24;
        let r = u32::from(r) << 16;
        let g = u32::from(g) << 8;
        let b = u32::from(b);

        canvas[indice..indice + 4].copy_from_slice(&(a | r | g | b).to_le_bytes());
    }
}

/// A sequence before or after materialization.
#[derive(Debug)]
pub enum Sequence<H> {
    Decoded(DecodedSequence),
    Materialized(MaterializedSequence<H>),
}

impl<H> Sequence<H> {
    #[must_use]
    pub fn generation(&self) -> u64 {
        match self {
            Self::Decoded(decoded) => decoded.generation(),
            Self::Materialized(materialized) => materialized.generation,
        }
    }

    #[must_use]
    pub fn materialized(&self) -> Option<&MaterializedSequence<H>> {
        match self {
            Self::Materialized(materialized) => Some(materialized),
            Self::Decoded(_) => None,
        }
    }
}

impl<H> From<DecodedSequence> for Sequence<H> {
    fn from(decoded: DecodedSequence) -> Self {
        Self::Decoded(decoded)
    }
}

#[derive(Debug, Clone)]
pub struct MaterializedFrame<H> {
    pub handle: H,
    pub delay_ms: u32,
    /// Index of the frame in the decoded sequence.
    pub source_index: usize,
}

/// Frames with live render handles, ready for playback.
#[derive(Debug)]
pub struct MaterializedSequence<H> {
    generation: u64,
    source: PathBuf,
    kind: SequenceKind,
    width: u32,
    height: u32,
    frames: Vec<MaterializedFrame<H>>,
    _staging: Option<StagedFrames>,
}

impl<H> MaterializedSequence<H> {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    #[must_use]
    pub fn kind(&self) -> SequenceKind {
        self.kind
    }

    /// Size of the first frame that materialized.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[must_use]
    pub fn frame(&self, index: usize) -> Option<&MaterializedFrame<H>> {
        self.frames.get(index)
    }

    /// Delay timeline handed to the playback engine.
    #[must_use]
    pub fn delays(&self) -> Vec<u32> {
        self.frames.iter().map(|f| f.delay_ms).collect()
    }
}

pub struct Materializer<F> {
    factory: F,
}

impl<F: TextureFactory> Materializer<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Turn a decoded sequence into render handles in place.
    ///
    /// A sequence that is already materialized is returned untouched. Frames
    /// whose handle cannot be created are skipped.
    ///
    /// # Errors
    ///
    /// `NoFrames` if not a single frame could be materialized. The sequence
    /// stays decoded in that case.
    pub fn materialize<'s>(
        &mut self,
        render_thread: &RenderThread,
        sequence: &'s mut Sequence<F::Handle>,
    ) -> Result<&'s MaterializedSequence<F::Handle>, MaterializeError> {
        if let Sequence::Decoded(decoded) = &mut *sequence {
            let materialized = self.build(render_thread, decoded)?;
            *sequence = Sequence::Materialized(materialized);
        }

        match sequence {
            Sequence::Materialized(materialized) => Ok(materialized),
            Sequence::Decoded(_) => Err(MaterializeError::NoFrames),
        }
    }

    fn build(
        &mut self,
        render_thread: &RenderThread,
        decoded: &mut DecodedSequence,
    ) -> Result<MaterializedSequence<F::Handle>, MaterializeError> {
        let mut frames = Vec::with_capacity(decoded.len());
        let mut dimensions = None;

        for (index, descriptor) in decoded.frames().iter().enumerate() {
            let created = match descriptor.pixels() {
                PixelSource::Memory(image) => self
                    .factory
                    .create(render_thread, image)
                    .map(|handle| (handle, image.dimensions())),
                PixelSource::Staged(path) => image::open(path)
                    .map_err(TextureError::from)
                    .and_then(|image| {
                        let image = image.into_rgba8();
                        self.factory
                            .create(render_thread, &image)
                            .map(|handle| (handle, image.dimensions()))
                    }),
            };

            match created {
                Ok((handle, size)) => {
                    dimensions.get_or_insert(size);
                    frames.push(MaterializedFrame {
                        handle,
                        delay_ms: descriptor.delay_ms(),
                        source_index: index,
                    });
                }
                Err(source) => {
                    let why = MaterializeError::Frame { index, source };
                    warn!(%why, generation = decoded.generation(), "skipping frame");
                }
            }
        }

        let Some((width, height)) = dimensions else {
            return Err(MaterializeError::NoFrames);
        };

        debug!(
            generation = decoded.generation(),
            frames = frames.len(),
            skipped = decoded.len() - frames.len(),
            "materialized sequence"
        );

        Ok(MaterializedSequence {
            generation: decoded.generation(),
            source: decoded.source().to_path_buf(),
            kind: decoded.kind(),
            width,
            height,
            frames,
            _staging: decoded.staging.take(),
        })
    }
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;
    use crate::animated::FrameDescriptor;

    fn decoded(frames: Vec<RgbaImage>) -> DecodedSequence {
        let kind = if frames.len() == 1 {
            SequenceKind::Still
        } else {
            SequenceKind::Animated
        };
        DecodedSequence {
            source: PathBuf::from("/tmp/test.gif"),
            generation: 7,
            kind,
            width: 4,
            height: 4,
            frames: frames
                .into_iter()
                .map(|f| FrameDescriptor::new(PixelSource::Memory(f), 50))
                .collect(),
            staging: None,
        }
    }

    /// Refuses every frame whose first pixel is red.
    struct PickyTextures(ShmTextures);

    impl TextureFactory for PickyTextures {
        type Handle = Rc<Texture>;

        fn create(
            &mut self,
            render_thread: &RenderThread,
            image: &RgbaImage,
        ) -> Result<Self::Handle, TextureError> {
            if image.get_pixel(0, 0).0[0] == 255 {
                return Err(TextureError::Backend("red".into()));
            }
            self.0.create(render_thread, image)
        }
    }

    #[test]
    fn test_claim_once_per_process() {
        let rt = RenderThread::claim_when_free();
        assert!(RenderThread::claim().is_none());

        let worker = std::thread::spawn(|| RenderThread::claim().is_some());
        assert!(!worker.join().unwrap());

        drop(rt);
        let _again = RenderThread::claim_when_free();
    }

    #[test]
    fn test_materialize_is_idempotent() {
        let rt = RenderThread::claim_when_free();
        let mut materializer = Materializer::new(ShmTextures::default());
        let mut sequence = Sequence::from(decoded(vec![
            RgbaImage::new(4, 4),
            RgbaImage::new(4, 4),
        ]));

        let first = materializer
            .materialize(&rt, &mut sequence)
            .unwrap()
            .frame(0)
            .unwrap()
            .handle
            .clone();
        let again = materializer.materialize(&rt, &mut sequence).unwrap();

        assert_eq!(again.len(), 2);
        assert!(Rc::ptr_eq(&first, &again.frame(0).unwrap().handle));
        assert_eq!(materializer.factory().created(), 2);
    }

    #[test]
    fn test_failed_frames_are_skipped() {
        let rt = RenderThread::claim_when_free();
        let mut materializer = Materializer::new(PickyTextures(ShmTextures::default()));
        let red = RgbaImage::from_pixel(3, 2, Rgba([255, 0, 0, 255]));
        let blue = RgbaImage::from_pixel(3, 2, Rgba([0, 0, 255, 255]));
        let mut sequence = Sequence::from(decoded(vec![red.clone(), blue, red]));

        let materialized = materializer.materialize(&rt, &mut sequence).unwrap();
        assert_eq!(materialized.len(), 1);
        assert_eq!(materialized.frame(0).unwrap().source_index, 1);
        assert_eq!(materialized.dimensions(), (3, 2));
        assert_eq!(materialized.delays(), vec![50]);
    }

    #[test]
    fn test_no_usable_frames() {
        let rt = RenderThread::claim_when_free();
        let mut materializer = Materializer::new(PickyTextures(ShmTextures::default()));
        let red = RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 255]));
        let mut sequence = Sequence::from(decoded(vec![red]));

        assert!(matches!(
            materializer.materialize(&rt, &mut sequence),
            Err(MaterializeError::NoFrames)
        ));
        assert!(sequence.materialized().is_none());
    }

    #[test]
    fn test_argb_layout() {
        let image = RgbaImage::from_pixel(1, 1, Rgba([0x11, 0x22, 0x33, 0x44]));
        let mut canvas = [0u8; 4];
        argb8888_canvas(&mut canvas, &image);
        assert_eq!(canvas, [0x33, 0x22, 0x11, 0x44]);
    }
}
