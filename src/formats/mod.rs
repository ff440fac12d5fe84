//! Audio container readers.
//!
//! The scanner depends on this module only through the `AudioTagReader`
//! trait; the default implementation is backed by `lofty`, which already
//! understands FLAC/Vorbis comments, ID3, MP4 atoms and APE tags uniformly.

use crate::error::CoreError;
use crate::models::TagMetadata;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag};
use std::path::Path;
use uuid::Uuid;

/// Contract implemented by any source of per-file tag metadata. The scanner
/// is generic over this trait so tests can substitute a fake reader.
pub trait AudioTagReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<TagMetadata, CoreError>;
}

/// Extensions `LoftyReader` will attempt to probe. Anything else is skipped
/// by the scanner before it ever reaches this module.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "flac", "mp3", "mp4", "m4a", "ogg", "opus", "wav", "ape", "wv",
];

pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[derive(Default)]
pub struct LoftyReader;

impl LoftyReader {
    pub fn new() -> Self {
        Self
    }
}

impl AudioTagReader for LoftyReader {
    fn read(&self, path: &Path) -> Result<TagMetadata, CoreError> {
        let tagged_file = Probe::open(path)
            .map_err(|e| tag_read_error(path, e))?
            .read()
            .map_err(|e| tag_read_error(path, e))?;

        let duration_ms = tagged_file.properties().duration().as_millis() as i64;

        let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
            return Ok(TagMetadata {
                duration_ms,
                track_num: 0,
                ..Default::default()
            });
        };

        Ok(TagMetadata {
            artist_name: tag.artist().map(|s| s.to_string()),
            artist_sortname: get_string(tag, ItemKey::ArtistSortOrder),
            release_name: tag.album().map(|s| s.to_string()),
            recording_name: tag.title().map(|s| s.to_string()),
            artist_mbid: parse_mbid(get_string(tag, ItemKey::MusicBrainzArtistId)),
            release_mbid: parse_mbid(get_string(tag, ItemKey::MusicBrainzReleaseId)),
            recording_mbid: parse_mbid(get_string(tag, ItemKey::MusicBrainzRecordingId)),
            track_num: track_number(tag),
            disc_num: disc_number(tag),
            duration_ms,
        })
    }
}

fn get_string(tag: &Tag, key: ItemKey) -> Option<String> {
    tag.get_string(&key).map(|s| s.to_string())
}

/// Unparseable MBIDs become `None` rather than a surfaced error; a
/// malformed identifier tag is common in the wild and recoverable by
/// falling back to fuzzy resolution.
fn parse_mbid(raw: Option<String>) -> Option<String> {
    let raw = raw?;
    Uuid::parse_str(raw.trim()).ok().map(|u| u.to_string())
}

/// Some containers (notably ID3v2) store `track` as `"N/M"`; lofty already
/// parses the leading integer for us via `Accessor::track`, but we fall
/// back to a manual parse of the raw string for formats that don't.
fn track_number(tag: &Tag) -> i64 {
    if let Some(n) = tag.track() {
        return n as i64;
    }
    tag.get_string(&ItemKey::TrackNumber)
        .and_then(leading_int)
        .unwrap_or(0)
}

fn disc_number(tag: &Tag) -> Option<i64> {
    if let Some(n) = tag.disk() {
        return Some(n as i64);
    }
    tag.get_string(&ItemKey::DiscNumber).and_then(leading_int)
}

fn leading_int(raw: &str) -> Option<i64> {
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

fn tag_read_error(path: &Path, e: lofty::error::LoftyError) -> CoreError {
    CoreError::TagReadError {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn recognizes_common_extensions() {
        assert!(has_supported_extension(&PathBuf::from("a.flac")));
        assert!(has_supported_extension(&PathBuf::from("a.MP3")));
        assert!(!has_supported_extension(&PathBuf::from("a.jpg")));
        assert!(!has_supported_extension(&PathBuf::from("a")));
    }

    #[test]
    fn leading_int_parses_prefix_before_slash() {
        assert_eq!(leading_int("5/12"), Some(5));
        assert_eq!(leading_int("07"), Some(7));
        assert_eq!(leading_int(""), None);
        assert_eq!(leading_int("/12"), None);
    }

    #[test]
    fn parse_mbid_rejects_malformed_uuid() {
        assert_eq!(parse_mbid(Some("not-a-uuid".to_string())), None);
        assert_eq!(
            parse_mbid(Some("b10bbbfc-c6d5-4f08-9e86-8e20f8c5b0de".to_string())),
            Some("b10bbbfc-c6d5-4f08-9e86-8e20f8c5b0de".to_string())
        );
        assert_eq!(parse_mbid(None), None);
    }
}
