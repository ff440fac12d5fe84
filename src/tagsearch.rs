//! Tag/popularity search with best-effort percentile-band widening.
//!
//! Grounded in `LocalRecordingSearchByTagService.search`/`or_search`/
//! `and_search`. The widening loop here follows the band-head definition
//! literally (closest-to-band element on each side); the reference
//! popped `over_recordings` from the front instead of the back, which
//! favors the farthest-from-band candidate on that side, not the closest.

use crate::error::CoreError;
use crate::models::{TagOperator, TagSearchRow};
use crate::store::CatalogStore;

pub fn search(
    store: &CatalogStore,
    tags: &[String],
    operator: TagOperator,
    begin_percent: f64,
    end_percent: f64,
    num_recordings: usize,
) -> Result<Vec<TagSearchRow>, CoreError> {
    let candidates = candidates(store, tags, operator, None)?;
    Ok(widen(candidates, begin_percent, end_percent, num_recordings))
}

/// Restricts the search to recordings by the given artists, running the
/// widening independently per artist and concatenating results in artist
/// order.
pub fn search_by_artists(
    store: &CatalogStore,
    tags: &[String],
    operator: TagOperator,
    artist_mbids: &[String],
    begin_percent: f64,
    end_percent: f64,
    num_recordings: usize,
) -> Result<Vec<TagSearchRow>, CoreError> {
    let mut out = Vec::new();
    for artist_mbid in artist_mbids {
        let candidates = candidates(store, tags, operator, Some(artist_mbid))?;
        out.extend(widen(candidates, begin_percent, end_percent, num_recordings));
    }
    Ok(out)
}

fn candidates(
    store: &CatalogStore,
    tags: &[String],
    operator: TagOperator,
    artist_mbid: Option<&str>,
) -> Result<Vec<TagSearchRow>, CoreError> {
    if tags.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<String> = (1..=tags.len()).map(|i| format!("?{}", i)).collect();
    let in_clause = placeholders.join(",");

    let mut sql = match operator {
        TagOperator::Or => format!(
            "WITH recording_ids AS (
                 SELECT DISTINCT recording_tag.recording_id AS recording_id
                   FROM tag
                   JOIN recording_tag ON recording_tag.tag_id = tag.id
                  WHERE tag.name IN ({in_clause})
             )
             SELECT recording.recording_mbid, recording.artist_mbid, recording_metadata.popularity,
                    recording_subsonic.subsonic_id, recording.recording_name, recording.artist_name,
                    recording.id
               FROM recording
               JOIN recording_ids ON recording.id = recording_ids.recording_id
               JOIN recording_metadata ON recording.id = recording_metadata.recording_id
               LEFT JOIN recording_subsonic ON recording.id = recording_subsonic.recording_id"
        ),
        TagOperator::And => format!(
            "WITH recording_tags AS (
                 SELECT DISTINCT recording.id AS recording_id, tag.name AS tag_name
                   FROM tag
                   JOIN recording_tag ON recording_tag.tag_id = tag.id
                   JOIN recording ON recording.id = recording_tag.recording_id
                  WHERE tag.name IN ({in_clause})
             ), recording_ids AS (
                 SELECT recording_tags.recording_id
                   FROM recording_tags
                   JOIN recording_metadata ON recording_tags.recording_id = recording_metadata.recording_id
               GROUP BY recording_tags.recording_id
                 HAVING COUNT(DISTINCT recording_tags.tag_name) = {n}
             )
             SELECT recording.recording_mbid, recording.artist_mbid, recording_metadata.popularity,
                    recording_subsonic.subsonic_id, recording.recording_name, recording.artist_name,
                    recording.id
               FROM recording
               JOIN recording_ids ON recording.id = recording_ids.recording_id
               JOIN recording_metadata ON recording.id = recording_metadata.recording_id
               LEFT JOIN recording_subsonic ON recording.id = recording_subsonic.recording_id",
            n = tags.len()
        ),
    };

    if artist_mbid.is_some() {
        sql.push_str(&format!(" WHERE recording.artist_mbid = ?{}", tags.len() + 1));
    }
    sql.push_str(" ORDER BY recording_metadata.popularity DESC");

    let mut stmt = store.conn().prepare(&sql)?;
    let mut params: Vec<&dyn rusqlite::ToSql> = tags.iter().map(|t| t as &dyn rusqlite::ToSql).collect();
    if let Some(mbid) = artist_mbid {
        params.push(mbid as &dyn rusqlite::ToSql);
    }

    let rows = stmt
        .query_map(params.as_slice(), |row| {
            Ok(TagSearchRow {
                recording_id: row.get(6)?,
                recording_mbid: row.get(0)?,
                artist_mbid: row.get(1)?,
                popularity: row.get(2)?,
                subsonic_id: row.get(3)?,
                recording_name: row.get(4)?,
                artist_name: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn widen(
    candidates: Vec<TagSearchRow>,
    begin_percent: f64,
    end_percent: f64,
    num_recordings: usize,
) -> Vec<TagSearchRow> {
    let mut over: Vec<TagSearchRow> = Vec::new();
    let mut matching: Vec<TagSearchRow> = Vec::new();
    let mut under: Vec<TagSearchRow> = Vec::new();

    for row in candidates {
        if row.popularity < begin_percent {
            under.push(row);
        } else if row.popularity < end_percent {
            matching.push(row);
        } else {
            over.push(row);
        }
    }

    if matching.len() >= num_recordings {
        return matching;
    }

    loop {
        if matching.len() >= num_recordings {
            break;
        }
        let under_diff = under
            .first()
            .map(|r| begin_percent - r.popularity)
            .unwrap_or(1.0);
        let over_diff = over
            .last()
            .map(|r| r.popularity - end_percent)
            .unwrap_or(1.0);

        if under.is_empty() && over.is_empty() {
            break;
        }

        if under_diff < over_diff {
            let row = under.remove(0);
            matching.insert(0, row);
        } else if !over.is_empty() {
            let row = over.pop().unwrap();
            matching.push(row);
        } else if !under.is_empty() {
            let row = under.remove(0);
            matching.insert(0, row);
        } else {
            break;
        }
    }

    matching
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(mbid: &str, popularity: f64) -> TagSearchRow {
        TagSearchRow {
            recording_id: 0,
            recording_mbid: Some(mbid.to_string()),
            artist_mbid: None,
            popularity,
            subsonic_id: None,
            recording_name: None,
            artist_name: None,
        }
    }

    #[test]
    fn widen_prefers_closer_side_and_terminates() {
        let candidates = vec![
            row("over1", 0.95),
            row("over2", 0.82),
            row("match1", 0.6),
            row("under1", 0.45),
            row("under2", 0.1),
        ];
        let result = widen(candidates, 0.5, 0.7, 3);
        assert_eq!(result.len(), 3);
        assert!(result.iter().any(|r| r.recording_mbid.as_deref() == Some("match1")));
        assert!(result.iter().any(|r| r.recording_mbid.as_deref() == Some("under1")));
    }

    #[test]
    fn widen_stops_when_both_sides_exhausted() {
        let candidates = vec![row("match1", 0.6)];
        let result = widen(candidates, 0.5, 0.7, 10);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn already_enough_matches_returns_without_widening() {
        let candidates = vec![row("m1", 0.55), row("m2", 0.6)];
        let result = widen(candidates, 0.5, 0.7, 2);
        assert_eq!(result.len(), 2);
    }
}
