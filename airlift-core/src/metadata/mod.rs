//! Normalized audio metadata extraction.
//!
//! Containers carry tags in two shapes: frame-keyed (ID3v2, fields addressed
//! by four-character codes) and key-value comments (Vorbis, case-insensitive
//! keys). The extractor dispatches on file extension through a registry and
//! translates whichever shape it finds into one normalized record.

mod extractor;

pub use extractor::{MetadataExtractor, ReaderRegistry, TagFamily};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("audio file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("unsupported audio format: .{0}")]
    UnsupportedFormat(String),
    #[error("corrupt audio file: {0}")]
    Corrupt(#[from] lofty::error::LoftyError),
    #[error("corrupt tag data: {0}")]
    CorruptTag(#[from] id3::Error),
    #[error("audio stream properties missing")]
    MissingProperties,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One extraction result. Produced fresh per call and never mutated after —
/// re-extracting the same file yields an identical value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioMetadata {
    pub duration_secs: u64,
    /// Bits per second, where the container reports one
    pub bitrate: Option<u32>,
    pub sample_rate: u32,
    pub channels: u32,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<String>,
    pub track_number: Option<String>,
    pub album_artist: Option<String>,
    pub composer: Option<String>,
    pub lyrics: Option<String>,
    pub artwork: Option<EmbeddedArtwork>,
}

/// A picture embedded in the audio container. Absence is normal, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedArtwork {
    pub data: Vec<u8>,
    pub mime_type: Option<String>,
    pub description: Option<String>,
}
