//! Catalog capability consumed by the matching engine.
//!
//! The engine only needs two operations from a music catalog: a text search
//! and an idempotent "mark as favorite". Everything else (auth, HTTP, rate
//! limiting) lives behind this trait.

use std::fs;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use crate::error::CatalogError;
use crate::fuzzy::preprocess;
use crate::models::CandidateRecord;

/// Search and side-effect capability of an external catalog.
pub trait Catalog: Send + Sync {
    /// Runs one query. `limit` is the maximum number of records returned.
    fn search(&self, query: &str, limit: usize) -> Result<Vec<CandidateRecord>, CatalogError>;

    /// Marks a track as favorite. Idempotent; `Ok(false)` means the catalog
    /// accepted the call but did not change anything.
    fn mark_favorite(&self, id: &str) -> Result<bool, CatalogError>;
}

// ============================================================================
// Fixture Catalog
// ============================================================================

/// Field prefixes used by scoped queries (`track:"x" artist:"y"`).
static FIELD_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:track|artist|album):").unwrap());

/// Offline catalog backed by a list of records.
///
/// A record matches a query when every query term appears among the tokens
/// of its title, credited artists and album. Field prefixes and quotes are
/// ignored, results come back in record order.
pub struct FixtureCatalog {
    records: Vec<CandidateRecord>,
    favorites: Mutex<FxHashSet<String>>,
}

impl FixtureCatalog {
    pub fn from_records(records: Vec<CandidateRecord>) -> Self {
        Self {
            records,
            favorites: Mutex::new(FxHashSet::default()),
        }
    }

    /// Loads a JSON array of candidate records.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture catalog {:?}", path))?;
        let records: Vec<CandidateRecord> = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse fixture catalog {:?}", path))?;
        debug!(records = records.len(), path = %path.display(), "loaded fixture catalog");
        Ok(Self::from_records(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids marked as favorite so far, sorted.
    pub fn favorites(&self) -> Vec<String> {
        let favorites = self.favorites.lock().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = favorites.iter().cloned().collect();
        ids.sort();
        ids
    }

    fn matches(record: &CandidateRecord, terms: &[&str]) -> bool {
        let haystack = preprocess(&format!(
            "{} {} {}",
            record.title,
            record.credited_artists(),
            record.album.as_deref().unwrap_or_default()
        ));
        let tokens: FxHashSet<&str> = haystack.split_whitespace().collect();
        terms.iter().all(|term| tokens.contains(term))
    }
}

impl Catalog for FixtureCatalog {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<CandidateRecord>, CatalogError> {
        let stripped = FIELD_PREFIX.replace_all(query, " ");
        let cleaned = preprocess(&stripped);
        let terms: Vec<&str> = cleaned.split_whitespace().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let found: Vec<CandidateRecord> = self
            .records
            .iter()
            .filter(|record| Self::matches(record, &terms))
            .take(limit)
            .cloned()
            .collect();
        trace!(query, hits = found.len(), "fixture search");
        Ok(found)
    }

    fn mark_favorite(&self, id: &str) -> Result<bool, CatalogError> {
        if !self.records.iter().any(|r| r.id == id) {
            return Err(CatalogError::Status(404));
        }
        let mut favorites = self.favorites.lock().unwrap_or_else(|e| e.into_inner());
        Ok(favorites.insert(id.to_string()))
    }
}

// ============================================================================
// Shared Catalog
// ============================================================================

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

fn quota_for(per_second: f64) -> Quota {
    if per_second >= 1.0 {
        let rate = NonZeroU32::new(per_second.round().min(f64::from(u32::MAX)) as u32)
            .unwrap_or(NonZeroU32::MIN);
        return Quota::per_second(rate).allow_burst(NonZeroU32::MIN);
    }
    Quota::with_period(Duration::from_secs_f64(1.0 / per_second.max(f64::EPSILON)))
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
}

/// Serializes and throttles calls to an inner catalog so that several
/// sessions can share one upstream client.
pub struct SharedCatalog<C> {
    inner: Mutex<C>,
    limiter: DirectLimiter,
    clock: DefaultClock,
}

impl<C: Catalog> SharedCatalog<C> {
    /// `per_second` must be positive (validated by the config builder).
    pub fn new(inner: C, per_second: f64) -> Self {
        Self {
            inner: Mutex::new(inner),
            limiter: RateLimiter::direct(quota_for(per_second)),
            clock: DefaultClock::default(),
        }
    }

    /// Blocks until the limiter grants one call.
    fn wait_for_permit(&self) {
        while let Err(not_until) = self.limiter.check() {
            let wait = not_until
                .wait_time_from(self.clock.now())
                .max(Duration::from_millis(1));
            trace!(?wait, "catalog rate limited locally");
            thread::sleep(wait);
        }
    }
}

impl<C: Catalog> Catalog for SharedCatalog<C> {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<CandidateRecord>, CatalogError> {
        self.wait_for_permit();
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.search(query, limit)
    }

    fn mark_favorite(&self, id: &str) -> Result<bool, CatalogError> {
        self.wait_for_permit();
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.mark_favorite(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn fixture() -> FixtureCatalog {
        FixtureCatalog::from_records(vec![
            CandidateRecord::new("1", "Bohemian Rhapsody", &["Queen"], Some("A Night at the Opera"), 80),
            CandidateRecord::new("2", "Bohemian Rhapsody - Live", &["Queen"], Some("Live Killers"), 40),
            CandidateRecord::new("3", "Under Pressure", &["Queen", "David Bowie"], None, 70),
        ])
    }

    #[test]
    fn test_fixture_search_terms_and_prefixes() {
        let catalog = fixture();
        let hits = catalog.search(r#"track:"Bohemian Rhapsody" artist:"Queen""#, 5).unwrap();
        let ids: Vec<&str> = hits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);

        let hits = catalog.search("under pressure bowie", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "3");

        assert!(catalog.search("nothing here", 5).unwrap().is_empty());
        assert!(catalog.search("   ", 5).unwrap().is_empty());
    }

    #[test]
    fn test_fixture_search_respects_limit() {
        let hits = fixture().search("queen", 2).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_fixture_favorites() {
        let catalog = fixture();
        assert!(catalog.mark_favorite("1").unwrap());
        assert!(!catalog.mark_favorite("1").unwrap());
        assert!(matches!(catalog.mark_favorite("nope"), Err(CatalogError::Status(404))));
        assert_eq!(catalog.favorites(), vec!["1".to_string()]);
    }

    #[test]
    fn test_fixture_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let json = r#"[{"id": "a", "title": "Yesterday", "artist": "The Beatles", "popularity": 75}]"#;
        std::fs::write(&path, json).unwrap();
        let catalog = FixtureCatalog::from_file(&path).unwrap();
        assert_eq!(catalog.len(), 1);
        let hits = catalog.search("yesterday beatles", 5).unwrap();
        assert_eq!(hits[0].popularity, 75);
    }

    #[test]
    fn test_shared_catalog_delegates_and_throttles() {
        let shared = SharedCatalog::new(fixture(), 20.0);
        let start = Instant::now();
        for _ in 0..3 {
            assert_eq!(shared.search("queen", 5).unwrap().len(), 3);
        }
        // First call is free, the next two wait ~50ms each
        assert!(start.elapsed() >= Duration::from_millis(80));
        assert!(shared.mark_favorite("3").unwrap());
    }
}
