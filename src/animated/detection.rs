// SPDX-License-Identifier: MPL-2.0

//! File type detection for overlay media.
//!
//! The file header is authoritative: a GIF signature selects the animated
//! decoder whatever the extension says. Only when the header cannot be read
//! does the extension decide.

use std::{fs::File, io::Read, path::Path};

use tracing::debug;

/// Signatures of the two GIF revisions.
const GIF_SIGNATURES: [&[u8; 6]; 2] = [b"GIF87a", b"GIF89a"];

/// Which decoder a media file is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    /// GIF container, possibly animated.
    Gif,
    /// Anything the `image` crate can read as a single frame.
    Still,
}

/// Check if a path has a `.gif` extension.
#[must_use]
pub fn is_gif_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gif"))
        .unwrap_or(false)
}

/// Read the first bytes of a file and compare against the GIF signatures.
///
/// `None` if the header could not be read.
#[must_use]
pub fn has_gif_signature(path: &Path) -> Option<bool> {
    let mut header = [0u8; 6];
    let mut file = File::open(path).ok()?;
    match file.read_exact(&mut header) {
        Ok(()) => Some(GIF_SIGNATURES.iter().any(|sig| **sig == header)),
        // shorter than a signature, certainly not a GIF
        Err(why) if why.kind() == std::io::ErrorKind::UnexpectedEof => Some(false),
        Err(_) => None,
    }
}

/// Decide how a media file is decoded.
#[must_use]
pub fn detect(path: &Path) -> MediaFormat {
    let format = match has_gif_signature(path) {
        Some(true) => MediaFormat::Gif,
        Some(false) => MediaFormat::Still,
        None if is_gif_file(path) => MediaFormat::Gif,
        None => MediaFormat::Still,
    };
    debug!(path = %path.display(), ?format, "detected media format");
    format
}
