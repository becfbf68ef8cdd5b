//! Query construction and search orchestration.
//!
//! One song becomes an ordered list of catalog queries, most restrictive
//! first. Results are tagged with the query that found them, deduplicated by
//! catalog id and bounded by `max_candidates`.

use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::models::{CandidateRecord, SongReference};
use crate::normalize::{clean_title, normalize_artist};

/// Marker of a field-scoped query. Only these may stop the search early.
const FIELD_SCOPE_MARKER: &str = "track:";

/// Ordered, duplicate-free query variants for one song.
pub fn build_queries(song: &SongReference) -> Vec<String> {
    let title = clean_title(&song.title);
    let artist = normalize_artist(&song.artist);

    let mut queries = Vec::with_capacity(7);
    if let Some(album) = song.album.as_deref().filter(|a| !a.trim().is_empty()) {
        let album = clean_title(album);
        queries.push(format!(r#"track:"{}" artist:"{}" album:"{}""#, title, artist, album));
        queries.push(format!(r#""{}" "{}" "{}""#, title, artist, album));
    }
    queries.push(format!(r#"track:"{}" artist:"{}""#, title, artist));
    queries.push(format!(r#""{}" "{}""#, title, artist));
    queries.push(format!("{} {}", title, artist));
    queries.push(format!(r#"track:"{}""#, title));
    queries.push(title);

    let mut seen = FxHashSet::default();
    queries.retain(|q| seen.insert(q.clone()));
    queries
}

pub fn is_field_scoped(query: &str) -> bool {
    query.contains(FIELD_SCOPE_MARKER)
}

/// Runs the query plan against the catalog.
///
/// A failing query is logged and counts as zero results. Once a field-scoped
/// query fills the candidate budget on its own, broader queries are skipped.
pub fn search_candidates(
    song: &SongReference,
    catalog: &dyn Catalog,
    max_candidates: usize,
) -> Vec<CandidateRecord> {
    let mut found: Vec<CandidateRecord> = Vec::new();

    for query in build_queries(song) {
        let results = match catalog.search(&query, max_candidates) {
            Ok(results) => results,
            Err(e) => {
                warn!(line = song.source_line, query = %query, error = %e, "search failed");
                continue;
            }
        };
        debug!(query = %query, hits = results.len(), "search");

        let hits = results.len();
        found.extend(results.into_iter().map(|mut candidate| {
            candidate.search_query = Some(query.clone());
            candidate
        }));

        if hits >= max_candidates && is_field_scoped(&query) {
            debug!(query = %query, "field-scoped query filled the budget, stopping");
            break;
        }
    }

    let mut seen_ids = FxHashSet::default();
    found.retain(|c| seen_ids.insert(c.id.clone()));
    found.truncate(max_candidates);
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Catalog answering from a script; unknown queries return nothing.
    struct ScriptedCatalog {
        answers: HashMap<String, Result<Vec<&'static str>, u16>>,
        issued: Mutex<Vec<String>>,
    }

    impl ScriptedCatalog {
        fn new(answers: Vec<(String, Result<Vec<&'static str>, u16>)>) -> Self {
            Self {
                answers: answers.into_iter().collect(),
                issued: Mutex::new(Vec::new()),
            }
        }

        fn issued(&self) -> Vec<String> {
            self.issued.lock().unwrap().clone()
        }
    }

    impl Catalog for ScriptedCatalog {
        fn search(&self, query: &str, limit: usize) -> Result<Vec<CandidateRecord>, CatalogError> {
            self.issued.lock().unwrap().push(query.to_string());
            match self.answers.get(query) {
                Some(Ok(ids)) => Ok(ids
                    .iter()
                    .take(limit)
                    .map(|id| CandidateRecord::new(*id, "Song", &["Artist"], None, 50))
                    .collect()),
                Some(Err(code)) => Err(CatalogError::Status(*code)),
                None => Ok(Vec::new()),
            }
        }

        fn mark_favorite(&self, _id: &str) -> Result<bool, CatalogError> {
            Ok(true)
        }
    }

    #[test]
    fn test_query_plan_without_album() {
        let song = SongReference::simple("Hey Jude (Official Video)", "The Beatles");
        let queries = build_queries(&song);
        assert_eq!(
            queries,
            vec![
                r#"track:"Hey Jude" artist:"Beatles, The""#.to_string(),
                r#""Hey Jude" "Beatles, The""#.to_string(),
                "Hey Jude Beatles, The".to_string(),
                r#"track:"Hey Jude""#.to_string(),
                "Hey Jude".to_string(),
            ]
        );
    }

    #[test]
    fn test_query_plan_album_first() {
        let song = SongReference::new("Song", "Artist", Some("Record".into()), None, 1);
        let queries = build_queries(&song);
        assert_eq!(queries.len(), 7);
        assert_eq!(queries[0], r#"track:"Song" artist:"Artist" album:"Record""#);
        assert_eq!(queries[1], r#""Song" "Artist" "Record""#);
    }

    #[test]
    fn test_album_scoped_query_issued_first() {
        let song = SongReference::new("Song", "Artist", Some("Record".into()), None, 1);
        let catalog = ScriptedCatalog::new(vec![]);
        search_candidates(&song, &catalog, 5);
        let issued = catalog.issued();
        assert!(issued[0].contains("album:"));
        assert_eq!(issued.len(), 7);
    }

    #[test]
    fn test_early_stop_on_full_field_scoped_result() {
        let song = SongReference::simple("Song", "Artist");
        let catalog = ScriptedCatalog::new(vec![(
            r#"track:"Song" artist:"Artist""#.to_string(),
            Ok(vec!["a", "b", "c"]),
        )]);
        let found = search_candidates(&song, &catalog, 3);
        assert_eq!(catalog.issued().len(), 1);
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].search_query.as_deref(), Some(r#"track:"Song" artist:"Artist""#));
    }

    #[test]
    fn test_unscoped_full_result_does_not_stop() {
        let song = SongReference::simple("Song", "Artist");
        let catalog = ScriptedCatalog::new(vec![(
            r#""Song" "Artist""#.to_string(),
            Ok(vec!["a", "b"]),
        )]);
        search_candidates(&song, &catalog, 2);
        assert_eq!(catalog.issued().len(), 5);
    }

    #[test]
    fn test_failed_query_does_not_abort_plan() {
        let song = SongReference::simple("Song", "Artist");
        let catalog = ScriptedCatalog::new(vec![
            (r#"track:"Song" artist:"Artist""#.to_string(), Err(500)),
            ("Song Artist".to_string(), Ok(vec!["x"])),
        ]);
        let found = search_candidates(&song, &catalog, 5);
        assert_eq!(catalog.issued().len(), 5);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "x");
    }

    #[test]
    fn test_dedup_first_seen_and_truncate() {
        let song = SongReference::simple("Song", "Artist");
        let catalog = ScriptedCatalog::new(vec![
            (r#"track:"Song" artist:"Artist""#.to_string(), Ok(vec!["a", "b"])),
            (r#""Song" "Artist""#.to_string(), Ok(vec!["b", "c"])),
            ("Song".to_string(), Ok(vec!["d", "a", "e"])),
        ]);
        let found = search_candidates(&song, &catalog, 4);
        let ids: Vec<&str> = found.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(found[1].search_query.as_deref(), Some(r#"track:"Song" artist:"Artist""#));
    }
}
