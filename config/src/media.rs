// SPDX-License-Identifier: MPL-2.0

//! Media selection, pools and admission of user supplied files.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use rand::Rng;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

/// Files above this size are refused when added to a pool.
pub const MAX_MEDIA_BYTES: u64 = 30 * 1024 * 1024;

const IMAGE_EXTENSIONS: &[&str] = &["gif", "png", "jpg", "jpeg", "webp"];
const SOUND_EXTENSIONS: &[&str] = &["wav", "mp3"];

/// The media for one cycle. How it was chosen is not the overlay's concern.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Hash)]
pub struct MediaSelection {
    pub image: PathBuf,
    pub sound: Option<PathBuf>,
}

impl MediaSelection {
    pub fn new(image: impl Into<PathBuf>, sound: Option<PathBuf>) -> Self {
        Self {
            image: image.into(),
            sound,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Sound,
}

impl MediaKind {
    #[must_use]
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            MediaKind::Image => IMAGE_EXTENSIONS,
            MediaKind::Sound => SOUND_EXTENSIONS,
        }
    }

    /// Check a path's extension against this kind, case-insensitively.
    #[must_use]
    pub fn accepts(self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.extensions()
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaKind::Image => "GIF/PNG/JPG/WEBP",
            MediaKind::Sound => "WAV/MP3",
        })
    }
}

/// Why a file was not added to a pool.
#[derive(Debug, thiserror::Error)]
pub enum AdmitError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("file too large (>30MB): {} MB", .bytes / (1024 * 1024))]
    TooLarge { path: PathBuf, bytes: u64 },
    #[error("not a {kind}: .{extension}")]
    UnsupportedType { kind: MediaKind, extension: String },
    #[error("failed to inspect {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Validate a file before it is offered for selection.
///
/// # Errors
///
/// Returns the first reason the file is refused: missing, over
/// [`MAX_MEDIA_BYTES`], or an extension foreign to `kind`.
pub fn admit(path: &Path, kind: MediaKind) -> Result<(), AdmitError> {
    let metadata = match path.metadata() {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => return Err(AdmitError::NotFound(path.to_path_buf())),
        Err(why) if why.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "rejected {kind}: file not found");
            return Err(AdmitError::NotFound(path.to_path_buf()));
        }
        Err(source) => {
            return Err(AdmitError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if metadata.len() > MAX_MEDIA_BYTES {
        tracing::warn!(
            path = %path.display(),
            mb = metadata.len() / (1024 * 1024),
            "rejected {kind}: too large"
        );
        return Err(AdmitError::TooLarge {
            path: path.to_path_buf(),
            bytes: metadata.len(),
        });
    }

    if !kind.accepts(path) {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        tracing::warn!(path = %path.display(), %extension, "rejected {kind}: unsupported file type");
        return Err(AdmitError::UnsupportedType { kind, extension });
    }

    Ok(())
}

/// Flatten pool entries into candidate files.
///
/// Directories are walked recursively and filtered by `kind`; file entries
/// are kept as they are. Missing entries are dropped.
#[must_use]
pub fn expand_pool(entries: &[PathBuf], kind: MediaKind) -> Vec<PathBuf> {
    let mut pool = Vec::new();
    for entry in entries {
        if entry.is_dir() {
            pool.extend(
                WalkDir::new(entry)
                    .follow_links(true)
                    .into_iter()
                    .filter_map(Result::ok)
                    .filter(|e| e.path().is_file() && kind.accepts(e.path()))
                    .map(|e| e.into_path()),
            );
        } else if entry.is_file() {
            pool.push(entry.clone());
        } else {
            tracing::debug!(path = %entry.display(), "pool entry missing, skipped");
        }
    }
    pool.sort();
    pool
}

/// Uniformly pick one candidate.
pub fn pick<R: Rng + ?Sized>(pool: &[PathBuf], rng: &mut R) -> Option<PathBuf> {
    if pool.is_empty() {
        return None;
    }
    Some(pool[rng.random_range(0..pool.len())].clone())
}
