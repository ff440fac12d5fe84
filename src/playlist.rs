//! Playlist I/O: read a JSPF playlist into resolver queries, write a
//! resolved set of recordings out as M3U.
//!
//! Grounded in `playlist.py`'s `read_jspf_playlist`/`generate_m3u_playlist`.
//! `identifier` there is sliced with a fixed offset (`[34:]`) that assumes
//! an exact MusicBrainz URI prefix length and silently keeps a stray
//! character when it's off; this strips the last `/`-delimited path
//! segment instead, which is robust to prefix variations.

use crate::error::CoreError;
use crate::models::{Recording, ResolveQuery};
use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Deserialize)]
struct JspfFile {
    playlist: JspfPlaylist,
}

#[derive(Deserialize)]
struct JspfPlaylist {
    title: Option<String>,
    track: Vec<JspfTrack>,
}

#[derive(Deserialize)]
struct JspfTrack {
    creator: String,
    title: String,
    identifier: Option<String>,
}

pub struct ParsedPlaylist {
    pub title: Option<String>,
    pub queries: Vec<ResolveQuery>,
}

pub fn read_jspf(path: &Path) -> Result<ParsedPlaylist, CoreError> {
    let text = fs::read_to_string(path)
        .map_err(|e| CoreError::InvalidInput(format!("cannot read {}: {}", path.display(), e)))?;
    let jspf: JspfFile = serde_json::from_str(&text)
        .map_err(|e| CoreError::InvalidInput(format!("invalid JSPF: {}", e)))?;

    let queries = jspf
        .playlist
        .track
        .into_iter()
        .enumerate()
        .map(|(index, track)| ResolveQuery {
            index,
            artist_name: track.creator,
            recording_name: track.title,
            recording_mbid: track.identifier.as_deref().and_then(mbid_from_identifier),
        })
        .collect();

    Ok(ParsedPlaylist {
        title: jspf.playlist.title,
        queries,
    })
}

fn mbid_from_identifier(identifier: &str) -> Option<String> {
    identifier.rsplit('/').next().map(|s| s.to_string())
}

pub fn write_m3u(path: &Path, title: &str, recordings: &[Recording]) -> Result<(), CoreError> {
    let mut out = fs::File::create(path)
        .map_err(|e| CoreError::InvalidInput(format!("cannot write {}: {}", path.display(), e)))?;
    writeln!(out, "#EXTM3U").map_err(io_err)?;
    writeln!(out, "#EXTENC: UTF-8").map_err(io_err)?;
    writeln!(out, "#PLAYLIST {}", title).map_err(io_err)?;
    for recording in recordings {
        let duration_secs = recording.duration_ms / 1000;
        let name = recording.recording_name.as_deref().unwrap_or("");
        writeln!(out, "#EXTINF {},{}", duration_secs, name).map_err(io_err)?;
        writeln!(out, "{}", recording.file_path).map_err(io_err)?;
    }
    Ok(())
}

fn io_err(e: std::io::Error) -> CoreError {
    CoreError::Internal(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_tracks_and_extracts_trailing_mbid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("playlist.jspf");
        fs::write(
            &path,
            r#"{"playlist": {"title": "Mix", "track": [
                {"creator": "Portishead", "title": "Glory Box",
                 "identifier": "https://musicbrainz.org/recording/b10bbbfc-c6d5-4f08-9e86-8e20f8c5b0de"}
            ]}}"#,
        )
        .unwrap();

        let parsed = read_jspf(&path).unwrap();
        assert_eq!(parsed.title.as_deref(), Some("Mix"));
        assert_eq!(parsed.queries.len(), 1);
        assert_eq!(
            parsed.queries[0].recording_mbid.as_deref(),
            Some("b10bbbfc-c6d5-4f08-9e86-8e20f8c5b0de")
        );
    }

    #[test]
    fn writes_m3u_with_header_and_track_pairs() {
        let dir = tempdir().unwrap();
        let out_path = dir.path().join("out.m3u");
        let recording = Recording {
            id: 1,
            file_path: "/music/song.flac".to_string(),
            duration_ms: 215_000,
            recording_name: Some("Teardrop".to_string()),
            ..Default::default()
        };
        write_m3u(&out_path, "My Mix", &[recording]).unwrap();

        let contents = fs::read_to_string(&out_path).unwrap();
        assert!(contents.starts_with("#EXTM3U\n#EXTENC: UTF-8\n#PLAYLIST My Mix\n"));
        assert!(contents.contains("#EXTINF 215,Teardrop"));
        assert!(contents.contains("/music/song.flac"));
    }
}
