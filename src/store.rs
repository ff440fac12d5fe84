//! Persistent relational store of recordings, metadata, tags, subsonic
//! cross-refs, the unresolved tracker, and directory mtimes.
//!
//! All components operate on the catalog through a single connection with
//! explicit transactions; the store is accessed from a single thread per
//! process (see the teacher's `write_enriched_output` for the same
//! single-writer, WAL-journaled pattern this schema follows).

use crate::error::CoreError;
use crate::models::Recording;
use rusqlite::Connection;
use std::path::Path;

pub struct CatalogStore {
    conn: Connection,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CleanupReport {
    pub missing_recordings: usize,
    pub missing_directories: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SanityReport {
    pub recordings_total: usize,
    pub recordings_without_metadata: usize,
    pub recordings_without_remote: Option<usize>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS recording (
    id              INTEGER PRIMARY KEY,
    file_path       TEXT NOT NULL UNIQUE,
    mtime           INTEGER NOT NULL,
    artist_name     TEXT,
    release_name    TEXT,
    recording_name  TEXT,
    artist_mbid     TEXT,
    release_mbid    TEXT,
    recording_mbid  TEXT,
    duration_ms     INTEGER NOT NULL DEFAULT 0,
    track_num       INTEGER NOT NULL DEFAULT 0,
    disc_num        INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_recording_recording_mbid ON recording(recording_mbid);
CREATE INDEX IF NOT EXISTS idx_recording_artist_mbid ON recording(artist_mbid);
CREATE INDEX IF NOT EXISTS idx_recording_release_mbid ON recording(release_mbid);
CREATE INDEX IF NOT EXISTS idx_recording_release_track ON recording(release_mbid, track_num, disc_num);

CREATE TABLE IF NOT EXISTS recording_metadata (
    recording_id    INTEGER PRIMARY KEY REFERENCES recording(id) ON DELETE CASCADE,
    popularity      REAL,
    last_updated    INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_recording_metadata_popularity
    ON recording_metadata(popularity) WHERE popularity IS NOT NULL;

CREATE TABLE IF NOT EXISTS tag (
    id      INTEGER PRIMARY KEY,
    name    TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS recording_tag (
    recording_id    INTEGER NOT NULL REFERENCES recording(id) ON DELETE CASCADE,
    tag_id          INTEGER NOT NULL REFERENCES tag(id) ON DELETE CASCADE,
    entity          TEXT NOT NULL,
    last_updated    INTEGER NOT NULL,
    PRIMARY KEY (recording_id, tag_id)
);
CREATE INDEX IF NOT EXISTS idx_recording_tag_tag_id ON recording_tag(tag_id);

CREATE TABLE IF NOT EXISTS recording_subsonic (
    recording_id    INTEGER PRIMARY KEY REFERENCES recording(id) ON DELETE CASCADE,
    subsonic_id     TEXT NOT NULL,
    last_updated    INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS unresolved_recording (
    recording_mbid  TEXT PRIMARY KEY,
    lookup_count    INTEGER NOT NULL DEFAULT 1,
    last_updated    INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS directory (
    dir_path    TEXT PRIMARY KEY,
    mtime       INTEGER NOT NULL
);
";

impl CatalogStore {
    /// Initialize schema if absent. Idempotent: re-running adds newly
    /// introduced tables but never drops or truncates existing ones.
    pub fn create(path: &Path) -> Result<Self, CoreError> {
        let conn = Connection::open(path)
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Open an existing store. Fails with `StoreUnavailable` if the path
    /// cannot be opened.
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Err(CoreError::StoreUnavailable(format!(
                "catalog file does not exist: {}",
                path.display()
            )));
        }
        let conn = Connection::open(path)
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(Self { conn })
    }

    pub fn close(self) {
        drop(self.conn);
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn get_by_file_path(&self, file_path: &str) -> Result<Option<Recording>, CoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, file_path, mtime, artist_name, release_name, recording_name,
                    artist_mbid, release_mbid, recording_mbid, duration_ms, track_num, disc_num
               FROM recording WHERE file_path = ?1",
        )?;
        let mut rows = stmt.query(rusqlite::params![file_path])?;
        if let Some(row) = rows.next()? {
            Ok(Some(recording_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<Recording>, CoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, file_path, mtime, artist_name, release_name, recording_name,
                    artist_mbid, release_mbid, recording_mbid, duration_ms, track_num, disc_num
               FROM recording WHERE id = ?1",
        )?;
        let mut rows = stmt.query(rusqlite::params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(recording_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn get_by_recording_mbid(&self, mbid: &str) -> Result<Option<Recording>, CoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, file_path, mtime, artist_name, release_name, recording_name,
                    artist_mbid, release_mbid, recording_mbid, duration_ms, track_num, disc_num
               FROM recording WHERE recording_mbid = ?1 LIMIT 1",
        )?;
        let mut rows = stmt.query(rusqlite::params![mbid])?;
        if let Some(row) = rows.next()? {
            Ok(Some(recording_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// The `(artist_name, recording_name, recording_id)` triples needed to
    /// build a fuzzy index.
    pub fn artist_recording_data(&self) -> Result<Vec<(Option<String>, Option<String>, i64)>, CoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT artist_name, recording_name, id FROM recording")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?, row.get::<_, i64>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Enumerate Recordings whose `file_path` no longer exists and
    /// Directories whose `dir_path` no longer exists; delete them (cascading
    /// to dependent rows) unless `dry_run`.
    pub fn cleanup(&mut self, dry_run: bool) -> Result<CleanupReport, CoreError> {
        let mut report = CleanupReport::default();

        let missing_recordings: Vec<i64> = {
            let mut stmt = self.conn.prepare("SELECT id, file_path FROM recording")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
            let mut ids = Vec::new();
            for row in rows {
                let (id, file_path) = row?;
                if !Path::new(&file_path).exists() {
                    ids.push(id);
                }
            }
            ids
        };
        report.missing_recordings = missing_recordings.len();

        let missing_dirs: Vec<String> = {
            let mut stmt = self.conn.prepare("SELECT dir_path FROM directory")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut dirs = Vec::new();
            for row in rows {
                let dir_path = row?;
                if !Path::new(&dir_path).exists() {
                    dirs.push(dir_path);
                }
            }
            dirs
        };
        report.missing_directories = missing_dirs.len();

        if !dry_run {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached("DELETE FROM recording WHERE id = ?1")?;
                for id in &missing_recordings {
                    stmt.execute(rusqlite::params![id])?;
                }
            }
            {
                let mut stmt = tx.prepare_cached("DELETE FROM directory WHERE dir_path = ?1")?;
                for dir_path in &missing_dirs {
                    stmt.execute(rusqlite::params![dir_path])?;
                }
            }
            tx.commit()?;
            self.conn.execute_batch("VACUUM;")?;
        }

        Ok(report)
    }

    /// Report counts of Recordings lacking metadata and (optionally)
    /// lacking remote cross-refs.
    pub fn metadata_sanity_check(&self, include_remote: bool) -> Result<SanityReport, CoreError> {
        let recordings_total: i64 =
            self.conn.query_row("SELECT COUNT(*) FROM recording", [], |r| r.get(0))?;
        let without_metadata: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM recording r
              LEFT JOIN recording_metadata m ON m.recording_id = r.id
             WHERE m.recording_id IS NULL",
            [],
            |r| r.get(0),
        )?;
        let without_remote = if include_remote {
            let n: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM recording r
                  LEFT JOIN recording_subsonic s ON s.recording_id = r.id
                 WHERE s.recording_id IS NULL",
                [],
                |r| r.get(0),
            )?;
            Some(n as usize)
        } else {
            None
        };

        Ok(SanityReport {
            recordings_total: recordings_total as usize,
            recordings_without_metadata: without_metadata as usize,
            recordings_without_remote: without_remote,
        })
    }

    pub fn top_tags(&self, limit: u32) -> Result<Vec<(String, i64)>, CoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT tag.name, COUNT(*) AS cnt
               FROM recording_tag
               JOIN tag ON tag.id = recording_tag.tag_id
           GROUP BY tag.name
           ORDER BY cnt DESC
              LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![limit], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

pub(crate) fn recording_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recording> {
    Ok(Recording {
        id: row.get(0)?,
        file_path: row.get(1)?,
        mtime: row.get(2)?,
        artist_name: row.get(3)?,
        release_name: row.get(4)?,
        recording_name: row.get(5)?,
        artist_mbid: row.get(6)?,
        release_mbid: row.get(7)?,
        recording_mbid: row.get(8)?,
        duration_ms: row.get(9)?,
        track_num: row.get(10)?,
        disc_num: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        CatalogStore::create(&path).unwrap();
        CatalogStore::create(&path).unwrap();
        let store = CatalogStore::open(&path).unwrap();
        let report = store.metadata_sanity_check(false).unwrap();
        assert_eq!(report.recordings_total, 0);
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("does-not-exist.db");
        let result = CatalogStore::open(&path);
        assert!(result.is_err());
    }

    #[test]
    fn cleanup_removes_recordings_whose_file_is_gone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let mut store = CatalogStore::create(&path).unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO recording (file_path, mtime) VALUES (?1, ?2)",
                rusqlite::params!["/nonexistent/file.flac", 0i64],
            )
            .unwrap();
        let report = store.cleanup(false).unwrap();
        assert_eq!(report.missing_recordings, 1);
        let remaining = store.metadata_sanity_check(false).unwrap();
        assert_eq!(remaining.recordings_total, 0);
    }
}
