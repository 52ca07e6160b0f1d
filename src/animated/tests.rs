// SPDX-License-Identifier: MPL-2.0

//! Unit tests for overlay media decoding.

#[cfg(test)]
mod tests {
    use std::{fs::File, path::Path};

    use gif::DisposalMethod;
    use image::{Rgba, RgbaImage};

    use super::super::decoder::{DecodeOptions, decode};
    use super::super::detection::{MediaFormat, detect, has_gif_signature, is_gif_file};
    use super::super::types::{
        DEFAULT_FRAME_DELAY_MS, PixelSource, SequenceKind, delay_from_raw,
    };
    use crate::error::DecodeError;
    use crate::scratch::ScratchArena;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];
    const GREEN: [u8; 4] = [0, 255, 0, 255];
    const CLEAR: [u8; 4] = [0, 0, 0, 0];

    /// A frame of one solid color placed at `left`/`top`.
    struct Patch {
        left: u16,
        top: u16,
        size: u16,
        color: [u8; 4],
        delay: u16,
        dispose: DisposalMethod,
    }

    impl Patch {
        fn full(size: u16, color: [u8; 4], delay: u16) -> Self {
            Self {
                left: 0,
                top: 0,
                size,
                color,
                delay,
                dispose: DisposalMethod::Keep,
            }
        }
    }

    fn write_gif(path: &Path, size: u16, patches: &[Patch]) {
        let file = File::create(path).unwrap();
        let mut encoder = gif::Encoder::new(file, size, size, &[]).unwrap();
        for patch in patches {
            let mut rgba = patch.color.repeat(usize::from(patch.size) * usize::from(patch.size));
            let mut frame = gif::Frame::from_rgba_speed(patch.size, patch.size, &mut rgba, 10);
            frame.left = patch.left;
            frame.top = patch.top;
            frame.delay = patch.delay;
            frame.dispose = patch.dispose;
            encoder.write_frame(&frame).unwrap();
        }
    }

    fn memory(pixels: &PixelSource) -> &RgbaImage {
        match pixels {
            PixelSource::Memory(image) => image,
            PixelSource::Staged(path) => panic!("unexpected staged frame {}", path.display()),
        }
    }

    #[test]
    fn test_is_gif_file() {
        assert!(is_gif_file(Path::new("test.gif")));
        assert!(is_gif_file(Path::new("test.GIF")));
        assert!(is_gif_file(Path::new("test.Gif")));
        assert!(is_gif_file(Path::new("/path/to/animation.gif")));
        assert!(is_gif_file(Path::new(".hidden.gif")));
        assert!(is_gif_file(Path::new("test.backup.gif")));
        assert!(!is_gif_file(Path::new("test.png")));
        assert!(!is_gif_file(Path::new("test.webp")));
        assert!(!is_gif_file(Path::new("gif")));
        assert!(!is_gif_file(Path::new("/path/to/file")));
    }

    #[test]
    fn test_signature_beats_extension() {
        let dir = tempfile::tempdir().unwrap();

        let disguised = dir.path().join("actually_a_gif.png");
        write_gif(&disguised, 2, &[Patch::full(2, RED, 10)]);
        assert_eq!(has_gif_signature(&disguised), Some(true));
        assert_eq!(detect(&disguised), MediaFormat::Gif);

        let misnamed = dir.path().join("actually_a_png.gif");
        RgbaImage::from_pixel(2, 2, Rgba(RED))
            .save_with_format(&misnamed, image::ImageFormat::Png)
            .unwrap();
        assert_eq!(has_gif_signature(&misnamed), Some(false));
        assert_eq!(detect(&misnamed), MediaFormat::Still);

        let short = dir.path().join("short.gif");
        std::fs::write(&short, b"GIF").unwrap();
        assert_eq!(has_gif_signature(&short), Some(false));
    }

    #[test]
    fn test_unreadable_header_uses_extension() {
        assert_eq!(has_gif_signature(Path::new("/nonexistent/x.gif")), None);
        assert_eq!(detect(Path::new("/nonexistent/x.gif")), MediaFormat::Gif);
        assert_eq!(detect(Path::new("/nonexistent/x.jpg")), MediaFormat::Still);
    }

    #[test]
    fn test_delay_heuristic() {
        let test_cases = [
            (0, None),
            (1, Some(10)),
            (2, Some(20)),
            (10, Some(100)),
            (1000, Some(10_000)),
            (1001, Some(1001)),
            (65_535, Some(65_535)),
        ];

        for (raw, expected) in test_cases {
            assert_eq!(delay_from_raw(raw), expected, "raw delay {raw}");
        }
    }

    #[test]
    fn test_decode_gif_timeline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scare.gif");
        write_gif(
            &path,
            4,
            &[
                Patch::full(4, RED, 10),
                Patch::full(4, BLUE, 0),
                Patch::full(4, GREEN, 2),
            ],
        );

        let sequence = decode(&path, 3, &DecodeOptions::default()).unwrap();
        assert_eq!(sequence.kind(), SequenceKind::Animated);
        assert_eq!(sequence.generation(), 3);
        assert_eq!(sequence.dimensions(), (4, 4));
        assert_eq!(sequence.source(), path);

        let delays: Vec<u32> = sequence.frames().iter().map(|f| f.delay_ms()).collect();
        assert_eq!(delays, vec![100, DEFAULT_FRAME_DELAY_MS, 20]);
        assert_eq!(sequence.total_duration_ms(), 220);

        let last = memory(sequence.frames()[2].pixels());
        assert_eq!(last.get_pixel(3, 3).0, GREEN);
    }

    #[test]
    fn test_gif_background_disposal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disposal.gif");
        write_gif(
            &path,
            4,
            &[
                Patch::full(4, RED, 10),
                Patch {
                    left: 1,
                    top: 1,
                    size: 2,
                    color: BLUE,
                    delay: 10,
                    dispose: DisposalMethod::Background,
                },
                Patch {
                    left: 0,
                    top: 0,
                    size: 1,
                    color: GREEN,
                    delay: 10,
                    dispose: DisposalMethod::Keep,
                },
            ],
        );

        let sequence = decode(&path, 1, &DecodeOptions::default()).unwrap();
        assert_eq!(sequence.len(), 3);

        let second = memory(sequence.frames()[1].pixels());
        assert_eq!(second.get_pixel(0, 0).0, RED);
        assert_eq!(second.get_pixel(1, 1).0, BLUE);
        assert_eq!(second.get_pixel(2, 2).0, BLUE);
        assert_eq!(second.get_pixel(3, 3).0, RED);

        let third = memory(sequence.frames()[2].pixels());
        assert_eq!(third.get_pixel(0, 0).0, GREEN);
        assert_eq!(third.get_pixel(1, 1).0, CLEAR);
        assert_eq!(third.get_pixel(2, 2).0, CLEAR);
        assert_eq!(third.get_pixel(3, 0).0, RED);
    }

    #[test]
    fn test_gif_previous_disposal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("previous.gif");
        write_gif(
            &path,
            4,
            &[
                Patch::full(4, RED, 10),
                Patch {
                    left: 0,
                    top: 0,
                    size: 2,
                    color: BLUE,
                    delay: 10,
                    dispose: DisposalMethod::Previous,
                },
                Patch {
                    left: 3,
                    top: 3,
                    size: 1,
                    color: GREEN,
                    delay: 10,
                    dispose: DisposalMethod::Keep,
                },
            ],
        );

        let sequence = decode(&path, 1, &DecodeOptions::default()).unwrap();
        let second = memory(sequence.frames()[1].pixels());
        assert_eq!(second.get_pixel(0, 0).0, BLUE);

        let third = memory(sequence.frames()[2].pixels());
        assert_eq!(third.get_pixel(0, 0).0, RED);
        assert_eq!(third.get_pixel(1, 1).0, RED);
        assert_eq!(third.get_pixel(3, 3).0, GREEN);
    }

    #[test]
    fn test_single_frame_gif_is_still() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.gif");
        write_gif(&path, 2, &[Patch::full(2, BLUE, 50)]);

        let sequence = decode(&path, 1, &DecodeOptions::default()).unwrap();
        assert_eq!(sequence.kind(), SequenceKind::Still);
        assert_eq!(sequence.len(), 1);
    }

    #[test]
    fn test_decode_still_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scare.png");
        RgbaImage::from_pixel(5, 3, Rgba(GREEN)).save(&path).unwrap();

        let sequence = decode(&path, 9, &DecodeOptions::default()).unwrap();
        assert_eq!(sequence.kind(), SequenceKind::Still);
        assert_eq!(sequence.dimensions(), (5, 3));
        assert_eq!(sequence.frames()[0].delay_ms(), DEFAULT_FRAME_DELAY_MS);
        assert!(!sequence.is_staged());
    }

    #[test]
    fn test_decode_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.gif");
        assert!(matches!(
            decode(&missing, 1, &DecodeOptions::default()),
            Err(DecodeError::NotFound(path)) if path == missing
        ));

        let garbage = dir.path().join("garbage.png");
        std::fs::write(&garbage, b"definitely not an image").unwrap();
        assert!(matches!(
            decode(&garbage, 1, &DecodeOptions::default()),
            Err(DecodeError::Image { .. })
        ));

        let broken = dir.path().join("broken.gif");
        std::fs::write(&broken, b"GIF89a\x01").unwrap();
        assert!(matches!(
            decode(&broken, 1, &DecodeOptions::default()),
            Err(DecodeError::Gif { .. })
        ));
    }

    #[test]
    fn test_staged_frames_live_with_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scare.gif");
        write_gif(
            &path,
            3,
            &[Patch::full(3, RED, 10), Patch::full(3, BLUE, 10)],
        );

        let arena = ScratchArena::new(dir.path().join("scratch"));
        let sequence = decode(&path, 5, &DecodeOptions::staged(arena.clone())).unwrap();
        assert!(sequence.is_staged());

        let staged: Vec<_> = sequence
            .frames()
            .iter()
            .map(|frame| match frame.pixels() {
                PixelSource::Staged(path) => path.clone(),
                PixelSource::Memory(_) => panic!("frame was not staged"),
            })
            .collect();
        assert_eq!(staged.len(), 2);
        assert!(staged.iter().all(|p| p.is_file()));
        assert_eq!(
            image::open(&staged[1]).unwrap().into_rgba8().get_pixel(0, 0).0,
            BLUE
        );

        drop(sequence);
        assert!(staged.iter().all(|p| !p.exists()));
        assert!(!arena.root().join("gen-5").exists());
    }

    #[test]
    fn test_unusable_staging_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scare.gif");
        write_gif(
            &path,
            2,
            &[Patch::full(2, RED, 10), Patch::full(2, BLUE, 10)],
        );

        let blocker = dir.path().join("scratch");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let arena = ScratchArena::new(blocker.clone());
        match decode(&path, 2, &DecodeOptions::staged(arena)) {
            Err(DecodeError::ScratchDir { dir, .. }) => assert_eq!(dir, blocker),
            Err(other) => panic!("expected a staging directory error, got {other}"),
            Ok(_) => panic!("staging into a regular file succeeded"),
        }
    }
}
