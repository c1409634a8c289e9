use std::collections::HashMap;
use std::path::Path;

use id3::TagLike;
use lofty::file::{AudioFile, TaggedFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag, TagType};
use tracing::debug;

use super::{AudioMetadata, EmbeddedArtwork, MetadataError};

/// The two tag shapes we know how to normalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFamily {
    /// Frame-keyed tags addressed by short codes (ID3v2)
    Frame,
    /// Case-insensitive key-value comment tags (Vorbis)
    Comment,
}

/// Maps container extensions to the tag family that reads them.
///
/// Built once at startup; new container types are added by registering,
/// not by branching in the extractor.
#[derive(Debug, Clone)]
pub struct ReaderRegistry {
    families: HashMap<String, TagFamily>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        ReaderRegistry {
            families: HashMap::new(),
        }
    }

    /// Registry covering the containers the platform accepts for upload.
    pub fn with_defaults() -> Self {
        let mut registry = ReaderRegistry::new();
        registry.register("mp3", TagFamily::Frame);
        registry.register("wav", TagFamily::Frame);
        registry.register("flac", TagFamily::Comment);
        registry.register("ogg", TagFamily::Comment);
        registry
    }

    pub fn register(&mut self, extension: &str, family: TagFamily) {
        self.families.insert(extension.to_lowercase(), family);
    }

    pub fn family_for(&self, extension: &str) -> Option<TagFamily> {
        self.families.get(&extension.to_lowercase()).copied()
    }

    pub fn supported_extensions(&self) -> Vec<&str> {
        let mut extensions: Vec<&str> = self.families.keys().map(String::as_str).collect();
        extensions.sort_unstable();
        extensions
    }
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[derive(Debug, Clone, Copy)]
enum TagField {
    Title,
    Artist,
    Album,
    Genre,
    Year,
    TrackNumber,
    AlbumArtist,
    Composer,
    Lyrics,
}

/// ID3v2 text frame -> normalized field. TYER is the v2.3 year frame, TDRC its
/// v2.4 replacement; whichever appears first in this table wins.
const ID3_FRAME_MAP: [(&str, TagField); 9] = [
    ("TIT2", TagField::Title),
    ("TPE1", TagField::Artist),
    ("TALB", TagField::Album),
    ("TCON", TagField::Genre),
    ("TYER", TagField::Year),
    ("TDRC", TagField::Year),
    ("TRCK", TagField::TrackNumber),
    ("TPE2", TagField::AlbumArtist),
    ("TCOM", TagField::Composer),
];

/// Vorbis comment key -> normalized field. Comment keys are matched
/// case-insensitively; repeated keys keep their first value.
const COMMENT_KEY_MAP: [(&str, ItemKey, TagField); 10] = [
    ("title", ItemKey::TrackTitle, TagField::Title),
    ("artist", ItemKey::TrackArtist, TagField::Artist),
    ("album", ItemKey::AlbumTitle, TagField::Album),
    ("genre", ItemKey::Genre, TagField::Genre),
    ("date", ItemKey::RecordingDate, TagField::Year),
    ("year", ItemKey::Year, TagField::Year),
    ("tracknumber", ItemKey::TrackNumber, TagField::TrackNumber),
    ("albumartist", ItemKey::AlbumArtist, TagField::AlbumArtist),
    ("composer", ItemKey::Composer, TagField::Composer),
    ("lyrics", ItemKey::Lyrics, TagField::Lyrics),
];

/// Reads container-specific tags into one normalized, immutable record.
///
/// Constructed explicitly and passed in wherever extraction happens, so tests
/// can swap the registry per call.
#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    registry: ReaderRegistry,
}

impl MetadataExtractor {
    pub fn new(registry: ReaderRegistry) -> Self {
        MetadataExtractor { registry }
    }

    pub fn with_defaults() -> Self {
        MetadataExtractor::new(ReaderRegistry::with_defaults())
    }

    pub fn registry(&self) -> &ReaderRegistry {
        &self.registry
    }

    /// Extract normalized metadata from an audio file.
    ///
    /// Stream properties always come from the container probe; tags come from
    /// the family the registry resolves for the extension. A file with no tag
    /// at all is fine — every descriptive field stays `None`.
    pub fn extract(&self, path: &Path) -> Result<AudioMetadata, MetadataError> {
        if !path.exists() {
            return Err(MetadataError::FileNotFound(path.to_path_buf()));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        let family = self
            .registry
            .family_for(&extension)
            .ok_or_else(|| MetadataError::UnsupportedFormat(extension.clone()))?;

        let tagged = Probe::open(path)?.read()?;
        let properties = tagged.properties();

        let mut metadata = AudioMetadata {
            duration_secs: properties.duration().as_secs(),
            // lofty reports kbps; the policy thresholds are in bits per second
            bitrate: properties.audio_bitrate().map(|kbps| kbps.saturating_mul(1000)),
            sample_rate: properties
                .sample_rate()
                .ok_or(MetadataError::MissingProperties)?,
            channels: properties
                .channels()
                .ok_or(MetadataError::MissingProperties)? as u32,
            ..AudioMetadata::default()
        };

        match family {
            TagFamily::Frame => {
                if let Some(tag) = read_id3_tag(path, &extension)? {
                    apply_frame_tags(&tag, &mut metadata);
                    metadata.artwork = frame_artwork(&tag);
                }
            }
            TagFamily::Comment => {
                if let Some(tag) = tagged
                    .tag(TagType::VorbisComments)
                    .or_else(|| tagged.primary_tag())
                {
                    apply_comment_tags(tag, &mut metadata);
                }
                metadata.artwork = comment_artwork(&tagged);
            }
        }

        debug!(
            "Extracted metadata from {}: {}s, {} Hz, {} ch",
            path.display(),
            metadata.duration_secs,
            metadata.sample_rate,
            metadata.channels
        );
        Ok(metadata)
    }
}

fn set_field(metadata: &mut AudioMetadata, field: TagField, value: &str) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }
    let slot = match field {
        TagField::Title => &mut metadata.title,
        TagField::Artist => &mut metadata.artist,
        TagField::Album => &mut metadata.album,
        TagField::Genre => &mut metadata.genre,
        TagField::Year => &mut metadata.year,
        TagField::TrackNumber => &mut metadata.track_number,
        TagField::AlbumArtist => &mut metadata.album_artist,
        TagField::Composer => &mut metadata.composer,
        TagField::Lyrics => &mut metadata.lyrics,
    };
    if slot.is_none() {
        *slot = Some(value.to_string());
    }
}

fn read_id3_tag(path: &Path, extension: &str) -> Result<Option<id3::Tag>, MetadataError> {
    let result = match extension {
        "wav" => id3::Tag::read_from_wav_path(path),
        "aiff" | "aif" => id3::Tag::read_from_aiff_path(path),
        _ => id3::Tag::read_from_path(path),
    };
    match result {
        Ok(tag) => Ok(Some(tag)),
        Err(e) if matches!(e.kind, id3::ErrorKind::NoTag) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn apply_frame_tags(tag: &id3::Tag, metadata: &mut AudioMetadata) {
    for (frame_id, field) in ID3_FRAME_MAP {
        if let Some(text) = tag.get(frame_id).and_then(|frame| frame.content().text()) {
            // v2.4 text frames may hold multiple NUL-separated values
            if let Some(first) = text.split('\u{0}').next() {
                set_field(metadata, field, first);
            }
        }
    }
    // Lyrics live in USLT frames, which are not plain text frames
    if let Some(lyrics) = tag.lyrics().next() {
        set_field(metadata, TagField::Lyrics, &lyrics.text);
    }
}

fn apply_comment_tags(tag: &Tag, metadata: &mut AudioMetadata) {
    for (_, item_key, field) in &COMMENT_KEY_MAP {
        if let Some(value) = tag.get_string(item_key) {
            set_field(metadata, *field, value);
        }
    }
}

/// First APIC frame, if any. Absence of artwork is not an error.
fn frame_artwork(tag: &id3::Tag) -> Option<EmbeddedArtwork> {
    tag.pictures().next().map(|picture| EmbeddedArtwork {
        data: picture.data.clone(),
        mime_type: Some(picture.mime_type.clone()).filter(|m| !m.is_empty()),
        description: Some(picture.description.clone()).filter(|d| !d.is_empty()),
    })
}

/// First picture block across the file's tags, if any.
fn comment_artwork(tagged: &TaggedFile) -> Option<EmbeddedArtwork> {
    tagged
        .tags()
        .iter()
        .flat_map(|tag| tag.pictures().iter())
        .next()
        .map(|picture| EmbeddedArtwork {
            data: picture.data().to_vec(),
            mime_type: picture.mime_type().map(|m| m.as_str().to_string()),
            description: picture.description().map(str::to_string),
        })
}
