//! Directory scanner: walks music roots, reads tags from new or changed
//! files, and upserts them into the catalog.
//!
//! Mirrors the reference `Database.scan`/`traverse`/`add`/
//! `add_or_update_recording`: a dry pass estimates the work for a progress
//! bar, then a second pass does the real reads inside chunked transactions.
//! Directory mtimes add a coarser short-circuit on top of the per-file one:
//! a directory whose mtime has not changed since the last scan is not
//! descended into at all.

use crate::cancel::CancelToken;
use crate::error::CoreError;
use crate::formats::{has_supported_extension, AudioTagReader};
use crate::models::{StringInterner, TagMetadata};
use crate::progress::create_progress_bar;
use crate::store::CatalogStore;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub total: usize,
    pub not_changed: usize,
    pub added: usize,
    pub updated: usize,
    pub error: usize,
    pub cancelled: bool,
}

impl ScanStats {
    pub fn is_consistent(&self) -> bool {
        self.total == self.not_changed + self.added + self.updated + self.error
    }
}

struct PendingFile {
    path: PathBuf,
    mtime: i64,
}

pub fn scan(
    store: &mut CatalogStore,
    reader: &dyn AudioTagReader,
    dirs: &[PathBuf],
    chunk_size: usize,
    cancel: &CancelToken,
) -> Result<ScanStats, CoreError> {
    let mut audio_file_estimate = 0u64;
    for root in dirs {
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && has_supported_extension(entry.path()) {
                audio_file_estimate += 1;
            }
        }
    }
    tracing::info!(audio_file_estimate, "found audio files");
    let bar = create_progress_bar(audio_file_estimate, "scanning");

    let mut stats = ScanStats::default();
    let mut chunk: Vec<PendingFile> = Vec::with_capacity(chunk_size);

    'roots: for root in dirs {
        let mut walker = WalkDir::new(root).into_iter();
        loop {
            let entry = match walker.next() {
                Some(Ok(e)) => e,
                Some(Err(_)) => continue,
                None => break,
            };

            if entry.file_type().is_dir() {
                let dir_path = entry.path().to_string_lossy().to_string();
                let dir_mtime = mtime_of(entry.path());
                if directory_unchanged(store, &dir_path, dir_mtime)? {
                    walker.skip_current_dir();
                } else {
                    upsert_directory(store, &dir_path, dir_mtime)?;
                }
                continue;
            }

            if !entry.file_type().is_file() || !has_supported_extension(entry.path()) {
                continue;
            }

            stats.total += 1;
            bar.inc(1);
            let mtime = mtime_of(entry.path());

            let unchanged = match store.get_by_file_path(&entry.path().to_string_lossy())? {
                Some(existing) => existing.mtime == mtime,
                None => false,
            };
            if unchanged {
                stats.not_changed += 1;
                continue;
            }

            chunk.push(PendingFile {
                path: entry.path().to_path_buf(),
                mtime,
            });
            if chunk.len() >= chunk_size {
                flush_chunk(store, reader, &mut chunk, &mut stats)?;
                if cancel.is_cancelled() {
                    stats.cancelled = true;
                    break 'roots;
                }
            }
        }
    }
    if !stats.cancelled && !chunk.is_empty() {
        flush_chunk(store, reader, &mut chunk, &mut stats)?;
    }

    if stats.added > 0 {
        crate::unresolved::UnresolvedTracker::new().clear_resolved(store)?;
    }

    bar.finish();
    tracing::info!(
        total = stats.total,
        not_changed = stats.not_changed,
        added = stats.added,
        updated = stats.updated,
        error = stats.error,
        "scan complete"
    );
    if !stats.is_consistent() {
        tracing::warn!(?stats, "scan counters do not sum to total");
    }

    Ok(stats)
}

fn flush_chunk(
    store: &mut CatalogStore,
    reader: &dyn AudioTagReader,
    chunk: &mut Vec<PendingFile>,
    stats: &mut ScanStats,
) -> Result<(), CoreError> {
    let mut reads: Vec<(PathBuf, i64, Result<TagMetadata, CoreError>)> = Vec::with_capacity(chunk.len());
    for file in chunk.drain(..) {
        let result = reader.read(&file.path);
        reads.push((file.path, file.mtime, result));
    }

    // Files within one chunk are usually siblings from the same album, so
    // artist/release names repeat heavily across them; intern so the
    // per-row bind below reuses one allocation per distinct name instead of
    // holding as many copies as there are files.
    let mut interner = StringInterner::new();

    let tx = store.conn_mut().transaction()?;
    for (path, mtime, result) in reads {
        let meta = match result {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read tags");
                stats.error += 1;
                continue;
            }
        };
        let file_path = path.to_string_lossy().to_string();
        let existed: bool = tx.query_row(
            "SELECT 1 FROM recording WHERE file_path = ?1",
            rusqlite::params![file_path],
            |_| Ok(()),
        ).is_ok();

        let artist_name = meta.artist_name.as_deref().map(|s| interner.intern(s));
        let release_name = meta.release_name.as_deref().map(|s| interner.intern(s));

        tx.execute(
            "INSERT INTO recording
                (file_path, mtime, artist_name, release_name, recording_name,
                 artist_mbid, release_mbid, recording_mbid, duration_ms, track_num, disc_num)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(file_path) DO UPDATE SET
                mtime = excluded.mtime,
                artist_name = excluded.artist_name,
                release_name = excluded.release_name,
                recording_name = excluded.recording_name,
                artist_mbid = excluded.artist_mbid,
                release_mbid = excluded.release_mbid,
                recording_mbid = excluded.recording_mbid,
                duration_ms = excluded.duration_ms,
                track_num = excluded.track_num,
                disc_num = excluded.disc_num",
            rusqlite::params![
                file_path,
                mtime,
                artist_name.as_deref(),
                release_name.as_deref(),
                meta.recording_name,
                meta.artist_mbid,
                meta.release_mbid,
                meta.recording_mbid,
                meta.duration_ms,
                meta.track_num,
                meta.disc_num.unwrap_or(1),
            ],
        )?;

        if existed {
            stats.updated += 1;
        } else {
            stats.added += 1;
        }
    }
    tx.commit()?;
    Ok(())
}

fn directory_unchanged(store: &CatalogStore, dir_path: &str, mtime: i64) -> Result<bool, CoreError> {
    let mut stmt = store
        .conn()
        .prepare_cached("SELECT mtime FROM directory WHERE dir_path = ?1")?;
    let mut rows = stmt.query(rusqlite::params![dir_path])?;
    if let Some(row) = rows.next()? {
        let stored: i64 = row.get(0)?;
        Ok(stored == mtime)
    } else {
        Ok(false)
    }
}

fn upsert_directory(store: &CatalogStore, dir_path: &str, mtime: i64) -> Result<(), CoreError> {
    store.conn().execute(
        "INSERT INTO directory (dir_path, mtime) VALUES (?1, ?2)
         ON CONFLICT(dir_path) DO UPDATE SET mtime = excluded.mtime",
        rusqlite::params![dir_path, mtime],
    )?;
    Ok(())
}

fn mtime_of(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| t.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TagMetadata;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct FakeReader {
        calls: Mutex<usize>,
    }

    impl AudioTagReader for FakeReader {
        fn read(&self, path: &Path) -> Result<TagMetadata, CoreError> {
            *self.calls.lock().unwrap() += 1;
            Ok(TagMetadata {
                artist_name: Some("Artist".into()),
                recording_name: Some(path.file_stem().unwrap().to_string_lossy().to_string()),
                duration_ms: 1000,
                track_num: 1,
                disc_num: Some(1),
                ..Default::default()
            })
        }
    }

    #[test]
    fn second_scan_of_unchanged_tree_reports_all_not_changed() {
        let music = tempdir().unwrap();
        std::fs::write(music.path().join("song.flac"), b"fake").unwrap();
        let db_dir = tempdir().unwrap();
        let db_path = db_dir.path().join("catalog.db");
        let mut store = CatalogStore::create(&db_path).unwrap();
        let reader = FakeReader { calls: Mutex::new(0) };

        let cancel = CancelToken::new();
        let first = scan(&mut store, &reader, &[music.path().to_path_buf()], 100, &cancel).unwrap();
        assert_eq!(first.total, 1);
        assert_eq!(first.added, 1);
        assert!(first.is_consistent());

        let second = scan(&mut store, &reader, &[music.path().to_path_buf()], 100, &cancel).unwrap();
        assert_eq!(second.total, 1);
        assert_eq!(second.not_changed, 1);
        assert_eq!(second.added, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.error, 0);
        assert!(second.is_consistent());
    }

    #[test]
    fn non_audio_files_are_ignored() {
        let music = tempdir().unwrap();
        std::fs::write(music.path().join("cover.jpg"), b"fake").unwrap();
        let db_dir = tempdir().unwrap();
        let db_path = db_dir.path().join("catalog.db");
        let mut store = CatalogStore::create(&db_path).unwrap();
        let reader = FakeReader { calls: Mutex::new(0) };

        let stats = scan(&mut store, &reader, &[music.path().to_path_buf()], 100, &CancelToken::new()).unwrap();
        assert_eq!(stats.total, 0);
        assert!(stats.is_consistent());
    }

    #[test]
    fn cancelling_mid_scan_stops_after_the_in_flight_chunk() {
        let music = tempdir().unwrap();
        std::fs::write(music.path().join("a.flac"), b"fake").unwrap();
        std::fs::write(music.path().join("b.flac"), b"fake").unwrap();
        let db_dir = tempdir().unwrap();
        let db_path = db_dir.path().join("catalog.db");
        let mut store = CatalogStore::create(&db_path).unwrap();
        let reader = FakeReader { calls: Mutex::new(0) };
        let cancel = CancelToken::new();
        cancel.cancel();

        let stats = scan(&mut store, &reader, &[music.path().to_path_buf()], 1, &cancel).unwrap();
        assert!(stats.cancelled);
        assert_eq!(stats.added, 1);
    }
}
