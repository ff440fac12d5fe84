//! Remote media-server sync: cross-references local recordings against a
//! paged album catalog so the catalog can hand back an opaque remote id for
//! direct playback.
//!
//! Grounded in `SubsonicDatabase.run_sync`, but implemented straight: the
//! reference version pages 10 albums at a time, calls `getAlbum` to fetch
//! song listings, then `ic()`-dumps the first response and returns before
//! ever calling the (misspelled, no-op) `process_recorings`. This version
//! pages 500 at a time, resolves every album's MusicBrainz release id
//! before indexing it, and actually stages and upserts `RecordingSubsonic`
//! rows in batches.

use crate::cancel::CancelToken;
use crate::error::CoreError;
use crate::store::CatalogStore;
use rustc_hash::FxHashMap;

pub const ALBUM_PAGE_SIZE: u32 = 500;
const UPSERT_BATCH_SIZE: usize = 500;

#[derive(Clone, Debug)]
pub struct RemoteSong {
    pub id: String,
    pub track_num: i64,
    pub disc_num: Option<i64>,
    pub title: String,
    pub duration_ms: i64,
}

#[derive(Clone, Debug, Default)]
pub struct RemoteAlbumDetail {
    pub release_mbid: Option<String>,
    pub songs: Vec<RemoteSong>,
}

/// Contract for a remote media server exposing a Subsonic-shaped API:
/// paged album listing plus a per-album song listing.
pub trait MediaServerClient: Send + Sync {
    /// Returns up to `size` album ids starting at `offset`. An empty or
    /// short (< size) page ends pagination.
    fn list_albums(&self, offset: u32, size: u32) -> Result<Vec<String>, CoreError>;

    fn album_detail(&self, album_id: &str) -> Result<RemoteAlbumDetail, CoreError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SyncStats {
    pub albums_seen: usize,
    pub albums_skipped_no_mbid: usize,
    pub songs_matched: usize,
    pub songs_unmatched: usize,
    pub cancelled: bool,
}

pub fn sync(
    store: &mut CatalogStore,
    client: &dyn MediaServerClient,
    cancel: &CancelToken,
) -> Result<SyncStats, CoreError> {
    let index = build_release_index(store)?;
    let mut stats = SyncStats::default();
    let mut pending: Vec<(i64, String)> = Vec::with_capacity(UPSERT_BATCH_SIZE);
    let mut offset = 0u32;

    'pages: loop {
        let album_ids = client.list_albums(offset, ALBUM_PAGE_SIZE)?;
        let page_len = album_ids.len();

        for album_id in &album_ids {
            stats.albums_seen += 1;
            let detail = client.album_detail(album_id)?;
            let Some(release_mbid) = detail.release_mbid else {
                tracing::warn!(album_id, "album has no MusicBrainz release id, skipping");
                stats.albums_skipped_no_mbid += 1;
                continue;
            };

            let Some(by_position) = index.get(&release_mbid) else {
                stats.songs_unmatched += detail.songs.len();
                continue;
            };

            for song in &detail.songs {
                let disc_num = song.disc_num.unwrap_or(1);
                match by_position.get(&(song.track_num, disc_num)) {
                    Some(&recording_id) => {
                        pending.push((recording_id, song.id.clone()));
                        stats.songs_matched += 1;
                    }
                    None => stats.songs_unmatched += 1,
                }
                if pending.len() >= UPSERT_BATCH_SIZE {
                    upsert_batch(store, &mut pending)?;
                    if cancel.is_cancelled() {
                        stats.cancelled = true;
                        break 'pages;
                    }
                }
            }
        }

        offset += ALBUM_PAGE_SIZE;
        if (page_len as u32) < ALBUM_PAGE_SIZE {
            break;
        }
        if cancel.is_cancelled() {
            stats.cancelled = true;
            break;
        }
    }

    if !stats.cancelled && !pending.is_empty() {
        upsert_batch(store, &mut pending)?;
    }

    Ok(stats)
}

/// `release_mbid -> (track_num, disc_num) -> recording_id`.
fn build_release_index(
    store: &CatalogStore,
) -> Result<FxHashMap<String, FxHashMap<(i64, i64), i64>>, CoreError> {
    let mut index: FxHashMap<String, FxHashMap<(i64, i64), i64>> = FxHashMap::default();
    let mut stmt = store.conn().prepare(
        "SELECT id, release_mbid, track_num, disc_num FROM recording WHERE release_mbid IS NOT NULL",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;
    for row in rows {
        let (id, release_mbid, track_num, disc_num) = row?;
        index
            .entry(release_mbid)
            .or_default()
            .insert((track_num, disc_num), id);
    }
    Ok(index)
}

fn upsert_batch(store: &mut CatalogStore, pending: &mut Vec<(i64, String)>) -> Result<(), CoreError> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    let tx = store.conn_mut().transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO recording_subsonic (recording_id, subsonic_id, last_updated)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(recording_id) DO UPDATE SET subsonic_id = excluded.subsonic_id,
                                                      last_updated = excluded.last_updated",
        )?;
        for (recording_id, subsonic_id) in pending.drain(..) {
            stmt.execute(rusqlite::params![recording_id, subsonic_id, now])?;
        }
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct FakeClient {
        pages: Mutex<Vec<Vec<String>>>,
        details: FxHashMap<String, RemoteAlbumDetail>,
    }

    impl MediaServerClient for FakeClient {
        fn list_albums(&self, offset: u32, _size: u32) -> Result<Vec<String>, CoreError> {
            let idx = (offset / ALBUM_PAGE_SIZE) as usize;
            Ok(self.pages.lock().unwrap().get(idx).cloned().unwrap_or_default())
        }

        fn album_detail(&self, album_id: &str) -> Result<RemoteAlbumDetail, CoreError> {
            Ok(self.details.get(album_id).cloned().unwrap_or_default())
        }
    }

    #[test]
    fn matches_songs_by_release_mbid_and_position() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let mut store = CatalogStore::create(&path).unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO recording (file_path, mtime, release_mbid, track_num, disc_num)
                 VALUES ('a.flac', 0, 'rel-1', 1, 1)",
                [],
            )
            .unwrap();

        let mut details = FxHashMap::default();
        details.insert(
            "album-1".to_string(),
            RemoteAlbumDetail {
                release_mbid: Some("rel-1".to_string()),
                songs: vec![RemoteSong {
                    id: "song-1".to_string(),
                    track_num: 1,
                    disc_num: Some(1),
                    title: "Track".to_string(),
                    duration_ms: 1000,
                }],
            },
        );
        let client = FakeClient {
            pages: Mutex::new(vec![vec!["album-1".to_string()]]),
            details,
        };

        let stats = sync(&mut store, &client, &CancelToken::new()).unwrap();
        assert_eq!(stats.songs_matched, 1);
        assert_eq!(stats.songs_unmatched, 0);

        let subsonic_id: String = store
            .conn()
            .query_row("SELECT subsonic_id FROM recording_subsonic", [], |r| r.get(0))
            .unwrap();
        assert_eq!(subsonic_id, "song-1");
    }

    #[test]
    fn album_without_mbid_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let mut store = CatalogStore::create(&path).unwrap();

        let mut details = FxHashMap::default();
        details.insert("album-1".to_string(), RemoteAlbumDetail::default());
        let client = FakeClient {
            pages: Mutex::new(vec![vec!["album-1".to_string()]]),
            details,
        };

        let stats = sync(&mut store, &client, &CancelToken::new()).unwrap();
        assert_eq!(stats.albums_skipped_no_mbid, 1);
    }

    #[test]
    fn cancelling_mid_sync_stops_after_the_in_flight_upsert_batch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let mut store = CatalogStore::create(&path).unwrap();

        let songs: Vec<RemoteSong> = (1..=UPSERT_BATCH_SIZE as i64)
            .map(|n| RemoteSong {
                id: format!("song-{n}"),
                track_num: n,
                disc_num: Some(1),
                title: format!("Track {n}"),
                duration_ms: 1000,
            })
            .collect();
        for n in 1..=UPSERT_BATCH_SIZE as i64 {
            store
                .conn()
                .execute(
                    "INSERT INTO recording (file_path, mtime, release_mbid, track_num, disc_num)
                     VALUES (?1, 0, 'rel-1', ?2, 1)",
                    rusqlite::params![format!("f{n}.flac"), n],
                )
                .unwrap();
        }

        let mut details = FxHashMap::default();
        details.insert(
            "album-1".to_string(),
            RemoteAlbumDetail {
                release_mbid: Some("rel-1".to_string()),
                songs,
            },
        );
        let client = FakeClient {
            pages: Mutex::new(vec![vec!["album-1".to_string()]]),
            details,
        };
        let cancel = CancelToken::new();
        cancel.cancel();

        let stats = sync(&mut store, &client, &cancel).unwrap();
        assert!(stats.cancelled);
        assert_eq!(stats.songs_matched, UPSERT_BATCH_SIZE);

        let upserted: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM recording_subsonic", [], |r| r.get(0))
            .unwrap();
        assert_eq!(upserted as usize, UPSERT_BATCH_SIZE);
    }
}
