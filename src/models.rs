//! Core data models for song matching.
//!
//! This module contains the song references read from an export, the
//! catalog candidates they are matched against, the per-song decisions and
//! the aggregate summary over a batch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::normalize::create_search_key;

// ============================================================================
// Input Models
// ============================================================================

/// One song parsed from an export. Built once at ingestion, read-only after.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SongReference {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_sec: Option<u32>,
    pub source_line: usize,
    /// Dedup key (`title|artist`), see `create_search_key`
    pub key: String,
}

impl SongReference {
    pub fn new(
        title: impl Into<String>,
        artist: impl Into<String>,
        album: Option<String>,
        duration_sec: Option<u32>,
        source_line: usize,
    ) -> Self {
        let title = title.into();
        let artist = artist.into();
        let album = album.filter(|a| !a.trim().is_empty());
        let key = create_search_key(&title, &artist);
        Self {
            title,
            artist,
            album,
            duration_sec,
            source_line,
            key,
        }
    }

    /// Title/artist only.
    pub fn simple(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self::new(title, artist, None, None, 0)
    }
}

// ============================================================================
// Catalog Models
// ============================================================================

/// Component scores filled in by the scorer. All values in [0, 1].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub title: f64,
    pub artist: f64,
    pub album: f64,
    pub composite: f64,
}

/// Catalog track returned by a search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: String,
    pub title: String,
    /// Primary (first credited) artist
    pub artist: String,
    /// All credited artists joined with ", "
    #[serde(default)]
    pub all_artists: String,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
    /// 0-100
    #[serde(default)]
    pub popularity: u8,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub external_url: Option<String>,
    /// Query that first surfaced this candidate (diagnostics only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    #[serde(default)]
    pub scores: ScoreBreakdown,
}

impl CandidateRecord {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        artists: &[&str],
        album: Option<&str>,
        popularity: u8,
    ) -> Self {
        let artist = artists.first().copied().unwrap_or_default().to_string();
        Self {
            id: id.into(),
            title: title.into(),
            artist,
            all_artists: artists.join(", "),
            album: album.map(str::to_string),
            duration_ms: 0,
            popularity: popularity.min(100),
            preview_url: None,
            external_url: None,
            search_query: None,
            scores: ScoreBreakdown::default(),
        }
    }

    /// Falls back to the primary artist when the catalog sent no credit list.
    pub fn credited_artists(&self) -> &str {
        if self.all_artists.trim().is_empty() {
            &self.artist
        } else {
            &self.all_artists
        }
    }

    /// Duration as M:SS.
    pub fn duration_label(&self) -> String {
        let minutes = self.duration_ms / 60_000;
        let seconds = (self.duration_ms % 60_000) / 1000;
        format!("{}:{:02}", minutes, seconds)
    }
}

// ============================================================================
// Decision Models
// ============================================================================

/// States of the decision engine. All terminal except `AwaitingHuman`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    NoCandidates,
    AutoAccept,
    AutoReject,
    AwaitingHuman,
    ManualAccept,
    ManualReject,
    Skipped,
}

impl Outcome {
    pub fn is_accept(self) -> bool {
        matches!(self, Outcome::AutoAccept | Outcome::ManualAccept)
    }

    pub fn is_terminal(self) -> bool {
        self != Outcome::AwaitingHuman
    }

    pub fn label(self) -> &'static str {
        match self {
            Outcome::NoCandidates => "no_candidates",
            Outcome::AutoAccept => "auto_accept",
            Outcome::AutoReject => "auto_reject",
            Outcome::AwaitingHuman => "awaiting_human",
            Outcome::ManualAccept => "manual_accept",
            Outcome::ManualReject => "manual_reject",
            Outcome::Skipped => "skipped",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of the "mark as favorite" side effect for one decision.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum FavoriteStatus {
    /// No candidate was chosen
    NotApplicable,
    /// Dry run: would have been applied
    WouldApply,
    Applied,
    /// The track was already a favorite; nothing changed
    AlreadyApplied,
    Failed(String),
}

/// Final verdict for one song. Has a chosen candidate exactly when the
/// outcome is an accept variant. Never mutated after creation; the batch
/// runner rebuilds it with `with_favorite`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Decision {
    song: SongReference,
    chosen: Option<CandidateRecord>,
    outcome: Outcome,
    confidence: f64,
    reason: String,
    human_override: bool,
    favorite: FavoriteStatus,
}

impl Decision {
    pub(crate) fn new(
        song: SongReference,
        chosen: Option<CandidateRecord>,
        outcome: Outcome,
        confidence: f64,
        reason: String,
        human_override: bool,
    ) -> Self {
        debug_assert!(outcome.is_terminal());
        debug_assert_eq!(chosen.is_some(), outcome.is_accept());
        Self {
            song,
            chosen,
            outcome,
            confidence,
            reason,
            human_override,
            favorite: FavoriteStatus::NotApplicable,
        }
    }

    pub fn song(&self) -> &SongReference {
        &self.song
    }

    pub fn chosen(&self) -> Option<&CandidateRecord> {
        self.chosen.as_ref()
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// True when a human resolved the uncertain band.
    pub fn is_human_override(&self) -> bool {
        self.human_override
    }

    pub fn favorite(&self) -> &FavoriteStatus {
        &self.favorite
    }

    /// Consumes the decision and returns it with the side-effect result.
    /// A failure is appended to the reason.
    pub fn with_favorite(self, favorite: FavoriteStatus) -> Self {
        let reason = match &favorite {
            FavoriteStatus::Failed(err) => format!("{}; favorite failed: {}", self.reason, err),
            _ => self.reason,
        };
        Self {
            reason,
            favorite,
            ..self
        }
    }
}

// ============================================================================
// Summary
// ============================================================================

/// How skipped songs count toward the success rate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipPolicy {
    /// Skipped songs stay in the denominator (counted as not matched)
    #[default]
    CountAsFailure,
    /// Skipped songs are left out of the denominator
    Neutral,
}

impl FromStr for SkipPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "count-as-failure" | "failure" => Ok(SkipPolicy::CountAsFailure),
            "neutral" => Ok(SkipPolicy::Neutral),
            other => Err(format!(
                "unknown skip policy '{}' (expected count-as-failure or neutral)",
                other
            )),
        }
    }
}

impl fmt::Display for SkipPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipPolicy::CountAsFailure => f.write_str("count-as-failure"),
            SkipPolicy::Neutral => f.write_str("neutral"),
        }
    }
}

/// Aggregate counts over a batch of decisions. Recomputed, never updated.
#[derive(Default, Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub auto_accept: usize,
    pub manual_accept: usize,
    pub auto_reject: usize,
    pub manual_reject: usize,
    pub skipped: usize,
    pub no_candidates: usize,
    /// Fraction in [0, 1]
    pub success_rate: f64,
    /// Mean over decisions with confidence > 0
    pub avg_confidence: f64,
    pub skip_policy: SkipPolicy,
}

impl Summary {
    pub fn matched(&self) -> usize {
        self.auto_accept + self.manual_accept
    }

    pub fn rejected(&self) -> usize {
        self.auto_reject + self.manual_reject
    }

    /// Log summary to stderr in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            eprintln!("[STATS:{}]\n{}", phase, json);
        }
    }
}
