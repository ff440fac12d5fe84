//! Bulk metadata enrichment: fetches popularity and tags for every recording
//! with a known `recording_mbid` and stores them in `recording_metadata` /
//! `recording_tag`.
//!
//! Grounded in `MetadataLookup.lookup`/`process_recordings`: batches of 1000
//! MBIDs, one POST per batch, one transaction per batch replacing that
//! batch's tags wholesale.

use crate::cancel::CancelToken;
use crate::error::CoreError;
use crate::models::TagEntity;
use crate::progress::create_progress_bar;
use crate::store::CatalogStore;
use serde::Deserialize;
use std::collections::HashSet;
use std::thread;
use std::time::Duration;

const BATCH_SIZE: usize = 1000;
const MAX_RETRIES: u32 = 5;

#[derive(Deserialize)]
struct TagLookupRow {
    recording_mbid: String,
    tag: String,
    source: String,
    percent: f64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EnrichStats {
    pub recordings_considered: usize,
    pub batches_ok: usize,
    pub batches_failed: usize,
    pub cancelled: bool,
}

pub trait TagLookupClient: Send + Sync {
    fn lookup(&self, mbids: &[String]) -> Result<Vec<TagLookupRowOwned>, CoreError>;
}

#[derive(Clone, Debug)]
pub struct TagLookupRowOwned {
    pub recording_mbid: String,
    pub tag: String,
    pub source: String,
    pub percent: f64,
}

/// Default client: `POST {endpoint}` with `[{"[recording_mbid]": "<uuid>"}, ...]`.
pub struct HttpTagLookupClient {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpTagLookupClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            agent: ureq::AgentBuilder::new().build(),
        }
    }
}

impl TagLookupClient for HttpTagLookupClient {
    fn lookup(&self, mbids: &[String]) -> Result<Vec<TagLookupRowOwned>, CoreError> {
        let body: Vec<serde_json::Value> = mbids
            .iter()
            .map(|m| serde_json::json!({ "[recording_mbid]": m }))
            .collect();

        let mut attempt = 0;
        loop {
            let response = self.agent.post(&self.endpoint).send_json(&body);
            match response {
                Ok(resp) => {
                    let rows: Vec<TagLookupRow> = resp
                        .into_json()
                        .map_err(|e| CoreError::NetworkError(e.to_string()))?;
                    return Ok(rows
                        .into_iter()
                        .map(|r| TagLookupRowOwned {
                            recording_mbid: r.recording_mbid,
                            tag: r.tag,
                            source: r.source,
                            percent: r.percent,
                        })
                        .collect());
                }
                Err(ureq::Error::Status(429, _)) => {
                    attempt += 1;
                    if attempt > MAX_RETRIES {
                        return Err(CoreError::RateLimited);
                    }
                    let backoff = Duration::from_millis(500 * 2u64.pow(attempt.min(6)));
                    tracing::warn!(attempt, "rate limited, backing off {:?}", backoff);
                    thread::sleep(backoff);
                }
                Err(e) => return Err(CoreError::NetworkError(e.to_string())),
            }
        }
    }
}

pub fn enrich(
    store: &mut CatalogStore,
    client: &dyn TagLookupClient,
    cancel: &CancelToken,
) -> Result<EnrichStats, CoreError> {
    let rows: Vec<(i64, String)> = {
        let mut stmt = store.conn().prepare(
            "SELECT id, recording_mbid FROM recording
              WHERE recording_mbid IS NOT NULL
           ORDER BY artist_name, release_name",
        )?;
        stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?
    };

    tracing::info!(count = rows.len(), "recordings to look up");
    let bar = create_progress_bar(rows.len() as u64, "enriching");
    let mut stats = EnrichStats {
        recordings_considered: rows.len(),
        ..Default::default()
    };

    for batch in rows.chunks(BATCH_SIZE) {
        let mbids: Vec<String> = batch.iter().map(|(_, mbid)| mbid.clone()).collect();
        match client.lookup(&mbids) {
            Ok(tag_rows) => {
                apply_batch(store, batch, &tag_rows)?;
                stats.batches_ok += 1;
            }
            Err(e) => {
                tracing::warn!(error = %e, "metadata batch failed, skipping");
                stats.batches_failed += 1;
            }
        }
        bar.inc(batch.len() as u64);
        if cancel.is_cancelled() {
            stats.cancelled = true;
            break;
        }
    }
    bar.finish();

    Ok(stats)
}

fn apply_batch(
    store: &mut CatalogStore,
    batch: &[(i64, String)],
    tag_rows: &[TagLookupRowOwned],
) -> Result<(), CoreError> {
    let mbid_to_id: std::collections::HashMap<&str, i64> =
        batch.iter().map(|(id, mbid)| (mbid.as_str(), *id)).collect();

    let mut popularity: std::collections::HashMap<i64, f64> = std::collections::HashMap::new();
    for row in tag_rows {
        if let Some(&id) = mbid_to_id.get(row.recording_mbid.as_str()) {
            popularity.insert(id, row.percent);
        }
    }

    let touched_ids: HashSet<i64> = tag_rows
        .iter()
        .filter_map(|r| mbid_to_id.get(r.recording_mbid.as_str()).copied())
        .collect();

    let tx = store.conn_mut().transaction()?;
    let now = current_unix_time();

    for (&recording_id, &pop) in &popularity {
        tx.execute(
            "INSERT INTO recording_metadata (recording_id, popularity, last_updated)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(recording_id) DO UPDATE SET popularity = excluded.popularity,
                                                      last_updated = excluded.last_updated",
            rusqlite::params![recording_id, pop, now],
        )?;
    }

    for &recording_id in &touched_ids {
        tx.execute(
            "DELETE FROM recording_tag WHERE recording_id = ?1",
            rusqlite::params![recording_id],
        )?;
    }

    for row in tag_rows {
        let Some(&recording_id) = mbid_to_id.get(row.recording_mbid.as_str()) else {
            continue;
        };
        tx.execute("INSERT OR IGNORE INTO tag (name) VALUES (?1)", rusqlite::params![row.tag])?;
        let tag_id: i64 = tx.query_row(
            "SELECT id FROM tag WHERE name = ?1",
            rusqlite::params![row.tag],
            |r| r.get(0),
        )?;
        let Some(entity) = TagEntity::from_str(&row.source) else {
            continue;
        };
        tx.execute(
            "INSERT OR REPLACE INTO recording_tag (recording_id, tag_id, entity, last_updated)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![recording_id, tag_id, entity.as_str(), now],
        )?;
    }

    tx.commit()?;
    Ok(())
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

    struct FakeClient {
        rows: Vec<TagLookupRowOwned>,
    }

    impl TagLookupClient for FakeClient {
        fn lookup(&self, _mbids: &[String]) -> Result<Vec<TagLookupRowOwned>, CoreError> {
            Ok(self.rows.clone())
        }
    }

    fn new_store() -> CatalogStore {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let store = CatalogStore::create(&path).unwrap();
        std::mem::forget(dir);
        store
    }

    #[test]
    fn enrich_populates_popularity_and_replaces_tags() {
        let mut store = new_store();
        let mbid = "b10bbbfc-c6d5-4f08-9e86-8e20f8c5b0de";
        store
            .conn()
            .execute(
                "INSERT INTO recording (file_path, mtime, recording_mbid) VALUES ('a', 0, ?1)",
                rusqlite::params![mbid],
            )
            .unwrap();

        let client = FakeClient {
            rows: vec![TagLookupRowOwned {
                recording_mbid: mbid.to_string(),
                tag: "rock".to_string(),
                source: "artist".to_string(),
                percent: 0.87,
            }],
        };

        let stats = enrich(&mut store, &client, &CancelToken::new()).unwrap();
        assert_eq!(stats.batches_ok, 1);

        let popularity: f64 = store
            .conn()
            .query_row("SELECT popularity FROM recording_metadata", [], |r| r.get(0))
            .unwrap();
        assert!((popularity - 0.87).abs() < 1e-9);

        let tag_count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM recording_tag", [], |r| r.get(0))
            .unwrap();
        assert_eq!(tag_count, 1);
    }

    #[test]
    fn network_failure_skips_batch_without_erroring() {
        struct FailingClient;
        impl TagLookupClient for FailingClient {
            fn lookup(&self, _mbids: &[String]) -> Result<Vec<TagLookupRowOwned>, CoreError> {
                Err(CoreError::NetworkError("boom".into()))
            }
        }
        let mut store = new_store();
        store
            .conn()
            .execute(
                "INSERT INTO recording (file_path, mtime, recording_mbid) VALUES ('a', 0, 'b10bbbfc-c6d5-4f08-9e86-8e20f8c5b0de')",
                [],
            )
            .unwrap();

        let stats = enrich(&mut store, &FailingClient, &CancelToken::new()).unwrap();
        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.batches_ok, 0);
    }

    #[test]
    fn cancellation_is_reported_after_the_in_flight_batch_commits() {
        let mut store = new_store();
        for n in 0..2 {
            store
                .conn()
                .execute(
                    "INSERT INTO recording (file_path, mtime, recording_mbid) VALUES (?1, 0, ?2)",
                    rusqlite::params![format!("f{n}"), format!("b10bbbfc-c6d5-4f08-9e86-8e20f8c5b0d{n}")],
                )
                .unwrap();
        }
        let client = FakeClient { rows: vec![] };
        let cancel = CancelToken::new();
        cancel.cancel();

        let stats = enrich(&mut store, &client, &cancel).unwrap();
        assert!(stats.cancelled);
        assert_eq!(stats.batches_ok, 1);
    }
}
