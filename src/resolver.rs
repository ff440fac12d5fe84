//! Content resolver: identifier short-circuit, fuzzy match, cleaning retry.
//!
//! Grounded in `ContentResolver.resolve_recordings`/`resolve_recording_by_mbid`/
//! `resolve_playlist`: the fuzzy index is rebuilt once per run, queries carry
//! a stable `index` so results can be correlated back to caller order, and
//! a query resolved by identifier is never re-examined by the fuzzy pass.

use crate::cleaner::{clean_artist, clean_recording, extract_primary_artist};
use crate::error::CoreError;
use crate::fuzzy::FuzzyIndex;
use crate::models::{ResolveMethod, ResolveQuery, ResolvedRecording};
use crate::store::CatalogStore;
use crate::unresolved::UnresolvedTracker;
use std::collections::HashMap;

const MAX_RETRY_ROUNDS: usize = 16;

pub struct Resolver {
    index: FuzzyIndex,
}

impl Resolver {
    /// Fetches the catalog's current `(artist_name, recording_name, id)`
    /// triples and builds a fresh fuzzy index from them.
    pub fn build(store: &CatalogStore) -> Result<Self, CoreError> {
        let entries = store.artist_recording_data()?;
        Ok(Self {
            index: FuzzyIndex::build(&entries),
        })
    }

    /// Resolve a batch of queries against `match_threshold`. Queries never
    /// resolved are omitted from the result; the caller reconciles by
    /// `index`.
    pub fn resolve(
        &self,
        store: &CatalogStore,
        mut queries: Vec<ResolveQuery>,
        match_threshold: f64,
    ) -> Result<Vec<ResolvedRecording>, CoreError> {
        let mut resolved: HashMap<usize, ResolvedRecording> = HashMap::new();
        let mut unresolved_mbids: Vec<String> = Vec::new();

        // Step 1: identifier short-circuit.
        let mut pending = Vec::with_capacity(queries.len());
        for query in queries.drain(..) {
            if let Some(mbid) = &query.recording_mbid {
                if let Some(recording) = store.get_by_recording_mbid(mbid)? {
                    resolved.entry(query.index).or_insert(ResolvedRecording {
                        index: query.index,
                        recording_id: recording.id,
                        confidence: 1.0,
                        method: ResolveMethod::Identifier,
                        artist_name: query.artist_name.clone(),
                        recording_name: query.recording_name.clone(),
                        recording_mbid: query.recording_mbid.clone(),
                    });
                    continue;
                }
            }
            pending.push(query);
        }

        // Steps 2/3: fuzzy pass, then cleaning retry, until a full pass
        // cleans nothing or the round budget is exhausted.
        let mut round = 0;
        while !pending.is_empty() && round < MAX_RETRY_ROUNDS {
            round += 1;
            let mut next_round = Vec::new();

            for query in &pending {
                if resolved.contains_key(&query.index) {
                    continue;
                }
                let hit = self.index.search_one(&query.artist_name, &query.recording_name);
                if hit.confidence >= match_threshold {
                    if let Some(recording_id) = hit.recording_id {
                        resolved.entry(query.index).or_insert(ResolvedRecording {
                            index: query.index,
                            recording_id,
                            confidence: hit.confidence,
                            method: ResolveMethod::Fuzzy,
                            artist_name: query.artist_name.clone(),
                            recording_name: query.recording_name.clone(),
                            recording_mbid: query.recording_mbid.clone(),
                        });
                        continue;
                    }
                }

                if let Some(mbid) = &query.recording_mbid {
                    unresolved_mbids.push(mbid.clone());
                }

                let cleaned_recording = clean_recording(&query.recording_name);
                let cleaned_artist = clean_artist(&query.artist_name);
                let recording_changed = cleaned_recording != query.recording_name;
                let artist_changed = cleaned_artist != query.artist_name;

                if recording_changed {
                    next_round.push(ResolveQuery {
                        index: query.index,
                        artist_name: query.artist_name.clone(),
                        recording_name: cleaned_recording.clone(),
                        recording_mbid: query.recording_mbid.clone(),
                    });
                }
                if artist_changed {
                    next_round.push(ResolveQuery {
                        index: query.index,
                        artist_name: cleaned_artist.clone(),
                        recording_name: cleaned_recording.clone(),
                        recording_mbid: query.recording_mbid.clone(),
                    });
                }

                // Multi-artist credits ("A, B & C") rarely match the
                // catalog's single-artist tagging; retry once more against
                // just the primary artist.
                if let Some(primary_artist) = extract_primary_artist(&cleaned_artist) {
                    if primary_artist != cleaned_artist {
                        next_round.push(ResolveQuery {
                            index: query.index,
                            artist_name: primary_artist,
                            recording_name: cleaned_recording,
                            recording_mbid: query.recording_mbid.clone(),
                        });
                    }
                }
            }

            pending = next_round
                .into_iter()
                .filter(|q| !resolved.contains_key(&q.index))
                .collect();
        }

        if !unresolved_mbids.is_empty() {
            let tracker = UnresolvedTracker::new();
            tracker.add_many(store, &unresolved_mbids)?;
        }

        let mut out: Vec<ResolvedRecording> = resolved.into_values().collect();
        out.sort_by_key(|r| r.index);
        Ok(out)
    }
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
    fn identifier_match_wins_with_full_confidence() {
        let mut store = new_store();
        store
            .conn()
            .execute(
                "INSERT INTO recording (file_path, mtime, artist_name, recording_name, recording_mbid)
                 VALUES ('a', 0, 'Portishead', 'Glory Box', 'b10bbbfc-c6d5-4f08-9e86-8e20f8c5b0de')",
                [],
            )
            .unwrap();
        let resolver = Resolver::build(&store).unwrap();

        let queries = vec![ResolveQuery {
            index: 0,
            artist_name: "Whoever".to_string(),
            recording_name: "Whatever".to_string(),
            recording_mbid: Some("b10bbbfc-c6d5-4f08-9e86-8e20f8c5b0de".to_string()),
        }];
        let results = resolver.resolve(&store, queries, 0.75).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].confidence, 1.0);
        assert_eq!(results[0].method, ResolveMethod::Identifier);
    }

    #[test]
    fn fuzzy_match_above_threshold_resolves() {
        let mut store = new_store();
        store
            .conn()
            .execute(
                "INSERT INTO recording (file_path, mtime, artist_name, recording_name)
                 VALUES ('a', 0, 'Massive Attack', 'Teardrop')",
                [],
            )
            .unwrap();
        let resolver = Resolver::build(&store).unwrap();

        let queries = vec![ResolveQuery {
            index: 0,
            artist_name: "Massive Atack".to_string(),
            recording_name: "Teardrop".to_string(),
            recording_mbid: None,
        }];
        let results = resolver.resolve(&store, queries, 0.5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].method, ResolveMethod::Fuzzy);
    }

    #[test]
    fn multi_artist_credit_retries_against_primary_artist() {
        let mut store = new_store();
        store
            .conn()
            .execute(
                "INSERT INTO recording (file_path, mtime, artist_name, recording_name)
                 VALUES ('a', 0, 'Duck Sauce', 'Barbra Streisand')",
                [],
            )
            .unwrap();
        let resolver = Resolver::build(&store).unwrap();

        let queries = vec![ResolveQuery {
            index: 0,
            artist_name: "Duck Sauce, A-Trak & Armand Van Helden".to_string(),
            recording_name: "Barbra Streisand".to_string(),
            recording_mbid: None,
        }];
        let results = resolver.resolve(&store, queries, 0.75).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].method, ResolveMethod::Fuzzy);
    }

    #[test]
    fn unmatched_query_is_omitted_from_results() {
        let store = new_store();
        let resolver = Resolver::build(&store).unwrap();
        let queries = vec![ResolveQuery {
            index: 0,
            artist_name: "Nobody".to_string(),
            recording_name: "Nothing".to_string(),
            recording_mbid: None,
        }];
        let results = resolver.resolve(&store, queries, 0.9).unwrap();
        assert!(results.is_empty());
    }
}
