//! Core data models for the catalog store.
//!
//! This module contains the struct definitions, type aliases, and enums
//! shared by the scanner, enricher, remote sync, resolver and tag search.

use rustc_hash::FxHashMap;
use std::sync::Arc;

// ============================================================================
// String interning
// ============================================================================

/// String interner for deduplicating normalized strings seen repeatedly
/// during a scan (many files share the same artist/release name).
pub struct StringInterner {
    strings: FxHashMap<Arc<str>, Arc<str>>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self {
            strings: FxHashMap::default(),
        }
    }

    /// Intern a string, returning a reference-counted handle. If the string
    /// was seen before, returns the existing Arc.
    pub fn intern(&mut self, s: &str) -> Arc<str> {
        if let Some(existing) = self.strings.get(s) {
            return Arc::clone(existing);
        }
        let arc: Arc<str> = Arc::from(s);
        self.strings.insert(Arc::clone(&arc), Arc::clone(&arc));
        arc
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Catalog entities
// ============================================================================

/// A recording discovered on disk. Unique by `file_path`.
#[derive(Clone, Debug, Default)]
pub struct Recording {
    pub id: i64,
    pub file_path: String,
    pub mtime: i64,
    pub artist_name: Option<String>,
    pub release_name: Option<String>,
    pub recording_name: Option<String>,
    pub artist_mbid: Option<String>,
    pub release_mbid: Option<String>,
    pub recording_mbid: Option<String>,
    pub duration_ms: i64,
    pub track_num: i64,
    pub disc_num: i64,
}

/// 1:1 with `Recording`. Holds externally-fetched popularity.
#[derive(Clone, Debug, Default)]
pub struct RecordingMetadata {
    pub recording_id: i64,
    pub popularity: f64,
    pub last_updated: i64,
}

/// Unique by `name`.
#[derive(Clone, Debug, Default)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// The granularity at which a tag was sourced for a given recording.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagEntity {
    Artist,
    ReleaseGroup,
    Recording,
}

impl TagEntity {
    pub fn as_str(self) -> &'static str {
        match self {
            TagEntity::Artist => "artist",
            TagEntity::ReleaseGroup => "release-group",
            TagEntity::Recording => "recording",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "artist" => Some(TagEntity::Artist),
            "release-group" => Some(TagEntity::ReleaseGroup),
            "recording" => Some(TagEntity::Recording),
            _ => None,
        }
    }
}

/// Many-to-many between `Recording` and `Tag`. Fully replaced per-recording
/// on each enrichment pass (delete then insert).
#[derive(Clone, Debug)]
pub struct RecordingTag {
    pub recording_id: i64,
    pub tag_id: i64,
    pub entity: TagEntity,
    pub last_updated: i64,
}

/// 1:1 with `Recording`. Holds the opaque remote media-server identifier.
#[derive(Clone, Debug)]
pub struct RecordingSubsonic {
    pub recording_id: i64,
    pub subsonic_id: String,
    pub last_updated: i64,
}

/// Unique by `recording_mbid`. Counts failed fuzzy-match lookups.
#[derive(Clone, Debug, Default)]
pub struct UnresolvedRecording {
    pub recording_mbid: String,
    pub lookup_count: i64,
    pub last_updated: i64,
}

/// Unique by `dir_path`. Used to short-circuit scans of unchanged directories.
#[derive(Clone, Debug, Default)]
pub struct DirectoryEntry {
    pub dir_path: String,
    pub mtime: i64,
}

// ============================================================================
// Metadata read from an audio container (formats module contract)
// ============================================================================

#[derive(Clone, Debug, Default)]
pub struct TagMetadata {
    pub artist_name: Option<String>,
    pub artist_sortname: Option<String>,
    pub release_name: Option<String>,
    pub recording_name: Option<String>,
    pub artist_mbid: Option<String>,
    pub release_mbid: Option<String>,
    pub recording_mbid: Option<String>,
    pub track_num: i64,
    pub disc_num: Option<i64>,
    pub duration_ms: i64,
}

// ============================================================================
// Resolver types
// ============================================================================

/// Method by which a query was resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveMethod {
    Identifier,
    Fuzzy,
}

/// A query to resolve, carrying a stable index assigned on entry so results
/// can be correlated back to the caller's input order.
#[derive(Clone, Debug)]
pub struct ResolveQuery {
    pub index: usize,
    pub artist_name: String,
    pub recording_name: String,
    pub recording_mbid: Option<String>,
}

/// The outcome of resolving one query.
#[derive(Clone, Debug)]
pub struct ResolvedRecording {
    pub index: usize,
    pub recording_id: i64,
    pub confidence: f64,
    pub method: ResolveMethod,
    pub artist_name: String,
    pub recording_name: String,
    pub recording_mbid: Option<String>,
}

// ============================================================================
// Tag/popularity search types
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagOperator {
    Or,
    And,
}

/// One row of a tag/popularity search result.
#[derive(Clone, Debug)]
pub struct TagSearchRow {
    pub recording_id: i64,
    pub recording_mbid: Option<String>,
    pub artist_mbid: Option<String>,
    pub popularity: f64,
    pub subsonic_id: Option<String>,
    pub recording_name: Option<String>,
    pub artist_name: Option<String>,
}
