//! Duplicate reporter: recordings sharing a `recording_mbid` (optionally
//! also a `release_mbid`) with more than one local file.
//!
//! Grounded in `FindDuplicates.get_duplicate_recordings`. The reference's
//! `include_different_releases` flag is named backwards relative to what it
//! does (`true` groups by `recording_mbid` *and* `release_mbid`, so it
//! actually keeps different releases in separate groups); this renames it
//! to `group_by_release` with the same semantics to avoid reproducing the
//! confusion.

use crate::error::CoreError;
use crate::store::CatalogStore;

#[derive(Clone, Debug)]
pub struct DuplicateGroup {
    pub recording_name: Option<String>,
    pub release_name: Option<String>,
    pub artist_name: Option<String>,
    pub recording_mbid: Option<String>,
    pub file_paths: Vec<String>,
    pub count: i64,
}

pub fn find_duplicates(store: &CatalogStore, group_by_release: bool) -> Result<Vec<DuplicateGroup>, CoreError> {
    let sql = if group_by_release {
        "SELECT recording_name, release_name, artist_name, recording_mbid,
                group_concat(file_path, '\u{1}') AS file_paths, COUNT(*) AS cnt
           FROM recording
       GROUP BY recording_mbid, release_mbid
         HAVING cnt > 1
       ORDER BY cnt DESC, artist_name, recording_name"
    } else {
        "SELECT recording_name, release_name, artist_name, recording_mbid,
                group_concat(file_path, '\u{1}') AS file_paths, COUNT(*) AS cnt
           FROM recording
       GROUP BY recording_mbid
         HAVING cnt > 1
       ORDER BY cnt DESC, artist_name, recording_name"
    };

    let mut stmt = store.conn().prepare(sql)?;
    let rows = stmt
        .query_map([], |row| {
            let file_paths: String = row.get(4)?;
            Ok(DuplicateGroup {
                recording_name: row.get(0)?,
                release_name: row.get(1)?,
                artist_name: row.get(2)?,
                recording_mbid: row.get(3)?,
                file_paths: file_paths.split('\u{1}').map(|s| s.to_string()).collect(),
                count: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn finds_recordings_sharing_an_mbid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let store = CatalogStore::create(&path).unwrap();
        let mbid = "b10bbbfc-c6d5-4f08-9e86-8e20f8c5b0de";
        for file_path in ["a.flac", "b.flac"] {
            store
                .conn()
                .execute(
                    "INSERT INTO recording (file_path, mtime, recording_name, artist_name, recording_mbid)
                     VALUES (?1, 0, 'Song', 'Artist', ?2)",
                    rusqlite::params![file_path, mbid],
                )
                .unwrap();
        }

        let groups = find_duplicates(&store, false).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].file_paths.len(), 2);
    }

    #[test]
    fn recordings_without_duplicates_are_excluded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let store = CatalogStore::create(&path).unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO recording (file_path, mtime, recording_mbid) VALUES ('a', 0, 'b10bbbfc-c6d5-4f08-9e86-8e20f8c5b0de')",
                [],
            )
            .unwrap();

        let groups = find_duplicates(&store, false).unwrap();
        assert!(groups.is_empty());
    }
}
