//! Scoring functions for candidate matching.
//!
//! This module contains:
//! - Per-field similarity (title, artist, album)
//! - The weighted composite score
//! - The `Scorer`, which enriches and sorts a song's candidate set
//! - Quality labels for display

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fuzzy::{partial_ratio, ratio, token_set_ratio, token_sort_ratio};
use crate::models::{CandidateRecord, SongReference};
use crate::normalize::{clean_title, normalize_artist, version_flags};

// ============================================================================
// Weights
// ============================================================================

pub const TITLE_WEIGHT: f64 = 0.50;
pub const ARTIST_WEIGHT: f64 = 0.35;
pub const ALBUM_WEIGHT: f64 = 0.10;
pub const POPULARITY_WEIGHT: f64 = 0.05;

/// Artist score when the input artist appears verbatim in the credit list
pub const ARTIST_SUBSTRING_SCORE: f64 = 0.9;

/// Album names that say nothing about the release ("Single", "EP", blank)
pub const PLACEHOLDER_ALBUMS: &[&str] = &["single", "ep", ""];

/// Fixed album scores for the cases where album names cannot be compared.
/// Both sit near the uncertain band, so they are tunable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlbumScoring {
    /// Either side has no album at all
    pub missing: f64,
    /// Either side's album is a placeholder like "Single" or "EP"
    pub placeholder: f64,
}

impl Default for AlbumScoring {
    fn default() -> Self {
        Self {
            missing: 0.5,
            placeholder: 0.7,
        }
    }
}

// ============================================================================
// Field Scores
// ============================================================================

/// Best of four complementary fuzzy measures over normalized titles.
/// Missing input on either side scores 0.
pub fn title_score(input: &str, candidate: &str) -> f64 {
    if input.trim().is_empty() || candidate.trim().is_empty() {
        return 0.0;
    }
    ratio(input, candidate)
        .max(partial_ratio(input, candidate))
        .max(token_sort_ratio(input, candidate))
        .max(token_set_ratio(input, candidate))
}

/// Best match of the input artist against the primary artist, the full
/// credit list (collaborations), or a verbatim substring of the credit list.
pub fn artist_score(input: &str, primary: &str, all_artists: &str) -> f64 {
    if input.trim().is_empty() {
        return 0.0;
    }

    let mut best: f64 = 0.0;
    if !primary.trim().is_empty() {
        best = best.max(token_set_ratio(input, primary));
    }
    if !all_artists.trim().is_empty() && all_artists != primary {
        best = best.max(token_set_ratio(input, all_artists));
    }
    if !all_artists.is_empty() && all_artists.to_lowercase().contains(&input.to_lowercase()) {
        best = best.max(ARTIST_SUBSTRING_SCORE);
    }
    best
}

fn is_placeholder_album(album: &str) -> bool {
    let lower = album.trim().to_lowercase();
    PLACEHOLDER_ALBUMS.contains(&lower.as_str())
}

/// Album similarity of normalized album names.
pub fn album_score(input: Option<&str>, candidate: Option<&str>, params: &AlbumScoring) -> f64 {
    let (Some(input), Some(candidate)) = (input, candidate) else {
        return params.missing;
    };
    let input = clean_title(input);
    let candidate = clean_title(candidate);
    if is_placeholder_album(&input) || is_placeholder_album(&candidate) {
        return params.placeholder;
    }
    token_set_ratio(&input, &candidate)
}

/// Weighted sum of the field scores and popularity (0-100), in [0, 1].
pub fn composite_score(title: f64, artist: f64, album: f64, popularity: u8) -> f64 {
    let popularity_norm = f64::from(popularity.min(100)) / 100.0;
    let score = TITLE_WEIGHT * title
        + ARTIST_WEIGHT * artist
        + ALBUM_WEIGHT * album
        + POPULARITY_WEIGHT * popularity_norm;
    score.clamp(0.0, 1.0)
}

// ============================================================================
// Scorer
// ============================================================================

/// Scores a song's candidate set and sorts it best-first.
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    album: AlbumScoring,
}

impl Scorer {
    pub fn new(album: AlbumScoring) -> Self {
        Self { album }
    }

    /// Fills in every candidate's component scores, then sorts descending by
    /// composite. Equal scores keep discovery order (stable sort).
    pub fn score(&self, song: &SongReference, mut candidates: Vec<CandidateRecord>) -> Vec<CandidateRecord> {
        if candidates.is_empty() {
            return candidates;
        }

        let input_title = clean_title(&song.title);
        let input_artist = normalize_artist(&song.artist);
        if input_title.is_empty() || input_artist.is_empty() {
            debug!(line = song.source_line, title = %song.title, artist = %song.artist,
                "scoring input missing; affected components score 0");
        }

        for candidate in candidates.iter_mut() {
            let candidate_title = clean_title(&candidate.title);
            let candidate_artist = normalize_artist(&candidate.artist);

            let title = title_score(&input_title, &candidate_title);
            let artist = artist_score(&input_artist, &candidate_artist, candidate.credited_artists());
            let album = album_score(song.album.as_deref(), candidate.album.as_deref(), &self.album);
            let composite = composite_score(title, artist, album, candidate.popularity);

            candidate.scores.title = title;
            candidate.scores.artist = artist;
            candidate.scores.album = album;
            candidate.scores.composite = composite;

            debug!(
                id = %candidate.id,
                candidate = %candidate.title,
                title, artist, album, composite,
                flags = ?version_flags(&candidate.title),
                "scored candidate"
            );
        }

        candidates.sort_by(|a, b| b.scores.composite.total_cmp(&a.scores.composite));
        candidates
    }
}

// ============================================================================
// Quality Labels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    VeryPoor,
}

impl MatchQuality {
    pub fn label(self) -> &'static str {
        match self {
            MatchQuality::Excellent => "Excellent",
            MatchQuality::Good => "Good",
            MatchQuality::Fair => "Fair",
            MatchQuality::Poor => "Poor",
            MatchQuality::VeryPoor => "Very Poor",
        }
    }
}

pub fn match_quality(score: f64) -> MatchQuality {
    if score >= 0.90 {
        MatchQuality::Excellent
    } else if score >= 0.80 {
        MatchQuality::Good
    } else if score >= 0.70 {
        MatchQuality::Fair
    } else if score >= 0.60 {
        MatchQuality::Poor
    } else {
        MatchQuality::VeryPoor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_end_to_end_exact_match() {
        let song = SongReference::simple("Bohemian Rhapsody", "Queen");
        let candidate = CandidateRecord::new("q1", "Bohemian Rhapsody", &["Queen"], None, 80);
        let scored = Scorer::default().score(&song, vec![candidate]);
        let s = scored[0].scores;
        assert!(approx(s.title, 1.0));
        assert!(approx(s.artist, 1.0));
        assert!(approx(s.album, 0.5));
        assert!(approx(s.composite, 0.94));
    }

    #[test]
    fn test_title_score_noise_patterns() {
        assert_eq!(title_score("Bohemian Rhapsody", "Rhapsody Bohemian"), 1.0);
        assert_eq!(title_score("Rhapsody", "Bohemian Rhapsody"), 1.0);
        assert_eq!(title_score("", "Bohemian Rhapsody"), 0.0);
        assert!(title_score("Yesterday", "Let It Be") < 0.5);
    }

    #[test]
    fn test_artist_score() {
        assert_eq!(artist_score("", "Queen", "Queen"), 0.0);
        assert_eq!(artist_score("Queen", "Queen", "Queen"), 1.0);
        // Collaboration: secondary credit
        assert_eq!(artist_score("David Bowie", "Queen", "Queen, David Bowie"), 1.0);
        // Substring floor
        assert!(artist_score("ke", "Drake", "Drake") >= ARTIST_SUBSTRING_SCORE);
        assert!(artist_score("Metallica", "Adele", "Adele") < 0.5);
    }

    #[test]
    fn test_album_score_cases() {
        let params = AlbumScoring::default();
        assert_eq!(album_score(None, Some("A Night at the Opera"), &params), 0.5);
        assert_eq!(album_score(Some("A Night at the Opera"), None, &params), 0.5);
        assert_eq!(album_score(Some("Single"), Some("A Night at the Opera"), &params), 0.7);
        assert_eq!(album_score(Some("Opera"), Some("EP"), &params), 0.7);
        assert_eq!(album_score(Some("Opera"), Some(""), &params), 0.7);
        assert_eq!(
            album_score(Some("A Night at the Opera"), Some("A Night At The Opera (Deluxe)"), &params),
            1.0
        );
        let tuned = AlbumScoring { missing: 0.3, placeholder: 0.6 };
        assert_eq!(album_score(None, None, &tuned), 0.3);
        assert_eq!(album_score(Some("single"), Some("x"), &tuned), 0.6);
    }

    #[test]
    fn test_composite_bounds() {
        assert_eq!(composite_score(0.0, 0.0, 0.0, 0), 0.0);
        assert!(approx(composite_score(1.0, 1.0, 1.0, 100), 1.0));
        assert!(composite_score(1.0, 1.0, 1.0, 255) <= 1.0);
    }

    #[test]
    fn test_scorer_sorts_descending_and_stable() {
        let song = SongReference::simple("Yesterday", "The Beatles");
        let candidates = vec![
            CandidateRecord::new("weak", "Something Else", &["Nobody"], None, 10),
            CandidateRecord::new("tie-a", "Yesterday", &["The Beatles"], None, 50),
            CandidateRecord::new("tie-b", "Yesterday", &["The Beatles"], None, 50),
            CandidateRecord::new("best", "Yesterday", &["The Beatles"], None, 90),
        ];
        let scored = Scorer::default().score(&song, candidates);
        let ids: Vec<&str> = scored.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["best", "tie-a", "tie-b", "weak"]);
        for pair in scored.windows(2) {
            assert!(pair[0].scores.composite >= pair[1].scores.composite);
        }
        for c in &scored {
            assert!((0.0..=1.0).contains(&c.scores.composite));
        }
    }

    #[test]
    fn test_scorer_missing_inputs_score_zero() {
        let song = SongReference::simple("Yesterday", "");
        let scored = Scorer::default().score(
            &song,
            vec![CandidateRecord::new("1", "Yesterday", &["The Beatles"], None, 0)],
        );
        assert_eq!(scored[0].scores.artist, 0.0);
        assert_eq!(scored[0].scores.title, 1.0);
    }

    #[test]
    fn test_match_quality_labels() {
        assert_eq!(match_quality(0.95), MatchQuality::Excellent);
        assert_eq!(match_quality(0.85), MatchQuality::Good);
        assert_eq!(match_quality(0.75), MatchQuality::Fair);
        assert_eq!(match_quality(0.65), MatchQuality::Poor);
        assert_eq!(match_quality(0.10).label(), "Very Poor");
    }
}
