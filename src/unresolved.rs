//! Unresolved-recording tracker: counts how often each MBID the Resolver
//! could not match has been looked up, and reports the releases those
//! MBIDs belong to so a user knows what to add to their collection.
//!
//! Grounded in `UnresolvedRecordingTracker.add`; the release-grouping
//! report is a supplemented feature driven by the `unresolved` CLI command
//! referenced in `resolve.py` (`urt.get_releases()` / `print_releases`).

use crate::error::CoreError;
use crate::store::CatalogStore;
use std::collections::HashMap;

const RELEASE_LOOKUP_BATCH: usize = 50;

/// External collaborator resolving an MBID to its containing release name,
/// batched to respect upstream rate limits.
pub trait ReleaseLookupClient: Send + Sync {
    fn releases_for(&self, recording_mbids: &[String]) -> Result<HashMap<String, String>, CoreError>;
}

#[derive(Clone, Debug)]
pub struct ReleaseReportRow {
    pub release_name: String,
    pub unresolved_count: i64,
}

/// Resolves MBIDs to release names via the MusicBrainz recording lookup
/// endpoint, one request per MBID (MusicBrainz has no bulk recording
/// lookup); batching above only bounds how many accumulate before a
/// report is produced, not a single HTTP call's fan-out.
pub struct MusicBrainzReleaseLookupClient {
    agent: ureq::Agent,
}

impl MusicBrainzReleaseLookupClient {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .user_agent("soundcatalogd/0.1")
                .build(),
        }
    }
}

impl Default for MusicBrainzReleaseLookupClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseLookupClient for MusicBrainzReleaseLookupClient {
    fn releases_for(&self, recording_mbids: &[String]) -> Result<HashMap<String, String>, CoreError> {
        let mut out = HashMap::new();
        for mbid in recording_mbids {
            let url = format!(
                "https://musicbrainz.org/ws/2/recording/{}?inc=releases&fmt=json",
                mbid
            );
            let resp = match self.agent.get(&url).call() {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!(mbid = %mbid, error = %e, "release lookup failed, skipping");
                    continue;
                }
            };
            let body: serde_json::Value = resp
                .into_json()
                .map_err(|e| CoreError::NetworkError(e.to_string()))?;
            if let Some(name) = body["releases"][0]["title"].as_str() {
                out.insert(mbid.clone(), name.to_string());
            }
        }
        Ok(out)
    }
}

pub struct UnresolvedTracker;

impl UnresolvedTracker {
    pub fn new() -> Self {
        Self
    }

    /// Upsert-increment `lookup_count` for each MBID. New rows start at 1.
    pub fn add_many(&self, store: &CatalogStore, recording_mbids: &[String]) -> Result<(), CoreError> {
        let now = current_unix_time();
        for mbid in recording_mbids {
            store.conn().execute(
                "INSERT INTO unresolved_recording (recording_mbid, lookup_count, last_updated)
                 VALUES (?1, 1, ?2)
                 ON CONFLICT(recording_mbid) DO UPDATE SET
                    lookup_count = lookup_count + 1,
                    last_updated = excluded.last_updated",
                rusqlite::params![mbid, now],
            )?;
        }
        Ok(())
    }

    /// Remove tracked MBIDs that now correspond to a Recording in the
    /// catalog; called after a scan successfully adds new recordings.
    pub fn clear_resolved(&self, store: &CatalogStore) -> Result<usize, CoreError> {
        let n = store.conn().execute(
            "DELETE FROM unresolved_recording
              WHERE recording_mbid IN (SELECT recording_mbid FROM recording WHERE recording_mbid IS NOT NULL)",
            [],
        )?;
        Ok(n)
    }

    /// Group unresolved MBIDs by containing release (resolved through
    /// `client`, batched at `RELEASE_LOOKUP_BATCH`), ordered by aggregate
    /// unresolved count descending.
    pub fn release_report(
        &self,
        store: &CatalogStore,
        client: &dyn ReleaseLookupClient,
    ) -> Result<Vec<ReleaseReportRow>, CoreError> {
        let rows: Vec<(String, i64)> = {
            let mut stmt = store
                .conn()
                .prepare("SELECT recording_mbid, lookup_count FROM unresolved_recording")?;
            stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut by_release: HashMap<String, i64> = HashMap::new();
        for batch in rows.chunks(RELEASE_LOOKUP_BATCH) {
            let mbids: Vec<String> = batch.iter().map(|(m, _)| m.clone()).collect();
            let release_names = client.releases_for(&mbids)?;
            for (mbid, count) in batch {
                if let Some(release_name) = release_names.get(mbid) {
                    *by_release.entry(release_name.clone()).or_insert(0) += count;
                }
            }
        }

        let mut report: Vec<ReleaseReportRow> = by_release
            .into_iter()
            .map(|(release_name, unresolved_count)| ReleaseReportRow {
                release_name,
                unresolved_count,
            })
            .collect();
        report.sort_by(|a, b| b.unresolved_count.cmp(&a.unresolved_count));
        Ok(report)
    }
}

impl Default for UnresolvedTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn current_unix_time() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_store() -> CatalogStore {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let store = CatalogStore::create(&path).unwrap();
        std::mem::forget(dir);
        store
    }

    #[test]
    fn add_many_increments_on_repeat() {
        let store = new_store();
        let tracker = UnresolvedTracker::new();
        let mbid = "b10bbbfc-c6d5-4f08-9e86-8e20f8c5b0de".to_string();
        tracker.add_many(&store, &[mbid.clone()]).unwrap();
        tracker.add_many(&store, &[mbid.clone()]).unwrap();

        let count: i64 = store
            .conn()
            .query_row("SELECT lookup_count FROM unresolved_recording WHERE recording_mbid = ?1", rusqlite::params![mbid], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn clear_resolved_removes_matching_mbids() {
        let mut store = new_store();
        let mbid = "b10bbbfc-c6d5-4f08-9e86-8e20f8c5b0de".to_string();
        let tracker = UnresolvedTracker::new();
        tracker.add_many(&store, &[mbid.clone()]).unwrap();
        store
            .conn_mut()
            .execute(
                "INSERT INTO recording (file_path, mtime, recording_mbid) VALUES ('a', 0, ?1)",
                rusqlite::params![mbid],
            )
            .unwrap();

        let removed = tracker.clear_resolved(&store).unwrap();
        assert_eq!(removed, 1);
        let remaining: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM unresolved_recording", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
