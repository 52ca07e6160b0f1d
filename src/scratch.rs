// SPDX-License-Identifier: MPL-2.0

//! Private staging area for decoded frames.
//!
//! Frames of one decode generation are written as PNG files into
//! `<cache>/jumpscare/frames/<pid>/gen-<generation>/`. The directory belongs
//! to a [`StagedFrames`] value and disappears with it. Cleanup failures are
//! logged and otherwise ignored, they only cost temp space.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use image::{ImageFormat, RgbaImage};
use tracing::{debug, warn};

/// Cache directory for staged frames.
const CACHE_DIR: &str = "jumpscare/frames";

/// Root of all staging directories of this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchArena {
    root: PathBuf,
}

impl ScratchArena {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Arena under the user cache dir, keyed by process id so concurrent
    /// instances never share files.
    #[must_use]
    pub fn for_process() -> Self {
        let cache = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self::new(
            cache
                .join(CACHE_DIR)
                .join(std::process::id().to_string()),
        )
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, empty staging directory for `generation`.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created.
    pub fn stage(&self, generation: u64) -> io::Result<StagedFrames> {
        let dir = self.root.join(format!("gen-{generation}"));
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), generation, "staging directory created");
        Ok(StagedFrames { dir, generation })
    }

    /// Remove everything below the arena root.
    pub fn purge(&self) {
        remove_quietly(&self.root);
    }
}

/// Staged PNG files of one generation, deleted on drop.
#[derive(Debug)]
pub struct StagedFrames {
    dir: PathBuf,
    generation: u64,
}

impl StagedFrames {
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Write one frame and return the path it was staged at.
    ///
    /// # Errors
    ///
    /// Fails if the PNG cannot be encoded or written.
    pub fn write_frame(&self, index: usize, frame: &RgbaImage) -> Result<PathBuf, image::ImageError> {
        let path = self.dir.join(format!("frame_{index}.png"));
        frame.save_with_format(&path, ImageFormat::Png)?;
        Ok(path)
    }
}

impl Drop for StagedFrames {
    fn drop(&mut self) {
        remove_quietly(&self.dir);
    }
}

fn remove_quietly(dir: &Path) {
    match fs::remove_dir_all(dir) {
        Ok(()) => debug!(dir = %dir.display(), "scratch removed"),
        Err(why) if why.kind() == io::ErrorKind::NotFound => {}
        Err(why) => warn!(?why, dir = %dir.display(), "failed to remove scratch"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_write_and_drop() {
        let root = tempfile::tempdir().unwrap();
        let arena = ScratchArena::new(root.path());

        let staged = arena.stage(4).unwrap();
        assert!(staged.dir().ends_with("gen-4"));

        let frame = RgbaImage::from_pixel(2, 2, image::Rgba([9, 8, 7, 255]));
        let path = staged.write_frame(0, &frame).unwrap();
        assert!(path.is_file());
        assert_eq!(image::open(&path).unwrap().into_rgba8(), frame);

        let dir = staged.dir().to_path_buf();
        drop(staged);
        assert!(!dir.exists());
    }

    #[test]
    fn test_stage_replaces_leftovers() {
        let root = tempfile::tempdir().unwrap();
        let arena = ScratchArena::new(root.path());

        let leftover = root.path().join("gen-1");
        fs::create_dir_all(&leftover).unwrap();
        fs::write(leftover.join("frame_9.png"), b"old").unwrap();

        let staged = arena.stage(1).unwrap();
        assert_eq!(fs::read_dir(staged.dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_purge_is_quiet_when_missing() {
        let root = tempfile::tempdir().unwrap();
        let arena = ScratchArena::new(root.path().join("never-created"));
        arena.purge();

        let arena = ScratchArena::new(root.path().join("arena"));
        let _staged = arena.stage(2).unwrap();
        arena.purge();
        assert!(!arena.root().exists());
    }
}
