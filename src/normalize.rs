//! Text normalization for song matching.
//! Used on both sides of a comparison: the exported song and every catalog
//! candidate go through the same functions before scoring.
//!
//! CRITICAL: `normalize_title` must stay idempotent. Run tests after changes.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Video/streaming qualifiers stripped from titles (applied in order).
pub static TITLE_TAG_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Official tags: "(Official Video)", "[Official Audio]", "(Official Music Video)"
        Regex::new(r"(?i)\s*[\(\[]\s*official\s+(?:music\s+|lyric\s+)?(?:video|audio)\s*[\)\]]").unwrap(),
        // Lyrics tags: "(Lyrics)", "[Lyric]", "(Lyric Video)"
        Regex::new(r"(?i)\s*[\(\[]\s*lyrics?(?:\s+video)?\s*[\)\]]").unwrap(),
        // Quality tags: "(HD)", "[HQ]", "(4K)"
        Regex::new(r"(?i)\s*[\(\[]\s*(?:hd|hq|4k)\s*[\)\]]").unwrap(),
        // "(Visualizer)", "[Music Video]", "(Audio)"
        Regex::new(r"(?i)\s*[\(\[]\s*(?:visuali[sz]er|music\s+video|audio)\s*[\)\]]").unwrap(),
    ]
});

/// Featured-artist clauses. Group 1 holds the artist list.
pub static FEATURE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Bracketed: "(feat. Artist)", "[ft. A & B]", "(featuring Someone)"
        Regex::new(r"(?i)\s*[\(\[]\s*(?:feat\.?|ft\.?|featuring)\s+([^\)\]]+)[\)\]]").unwrap(),
        // Bare: "Song feat. Artist", "Song ft Someone (Live)"
        Regex::new(r"(?i)\s*\b(?:feat\.?|ft\.?|featuring)\s+([^\(\[]+)").unwrap(),
    ]
});

/// Splits a featured-artist list on "&", "," or the word "and".
pub static FEATURE_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*(?:&|,|\band\b)\s*").unwrap());

/// Any run of whitespace
pub static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Characters trimmed from both ends of a cleaned title.
const TITLE_TRIM_CHARS: &[char] = &[' ', '-', '–', '—', '(', ')', '[', ']', '|', ',', ':', ';'];

// ============================================================================
// VERSION CLASSIFIERS
// ============================================================================

pub static LIVE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:live|concert|tour|acoustic|unplugged|sessions?|performance|mtv)\b").unwrap()
});

pub static REMIX_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:remix(?:ed)?|mix|edit|rework(?:ed)?|version)\b").unwrap()
});

pub static REMASTER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:remaster(?:ed)?|anniversary|deluxe)\b").unwrap()
});

pub fn is_live_version(title: &str) -> bool {
    LIVE_PATTERN.is_match(title)
}

pub fn is_remix_version(title: &str) -> bool {
    REMIX_PATTERN.is_match(title)
}

pub fn is_remaster(title: &str) -> bool {
    REMASTER_PATTERN.is_match(title)
}

/// All three classifiers at once. Diagnostics only, never a scoring input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VersionFlags {
    pub live: bool,
    pub remix: bool,
    pub remaster: bool,
}

impl VersionFlags {
    pub fn any(self) -> bool {
        self.live || self.remix || self.remaster
    }
}

pub fn version_flags(title: &str) -> VersionFlags {
    VersionFlags {
        live: is_live_version(title),
        remix: is_remix_version(title),
        remaster: is_remaster(title),
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
/// Used to filter out accents during key construction.
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0xFE20..=0xFE2F)
}

/// Fold Unicode text to lowercase ASCII by applying NFKD decomposition and
/// removing combining marks, then transliterating what is left.
/// e.g., "Beyoncé" → "beyonce", "Motörhead" → "motorhead"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").to_string()
}

fn push_unique(features: &mut Vec<String>, name: &str) {
    let name = collapse_whitespace(name);
    if name.is_empty() {
        return;
    }
    let lower = name.to_lowercase();
    if !features.iter().any(|f| f.to_lowercase() == lower) {
        features.push(name);
    }
}

/// One cleanup pass: extract features, strip tags, collapse, trim.
fn clean_title_pass(title: &str, features: &mut Vec<String>) -> String {
    let mut result = title.to_string();

    // Features come out before tags so "(feat. X) (Official Video)" keeps X
    for pattern in FEATURE_PATTERNS.iter() {
        for caps in pattern.captures_iter(&result) {
            if let Some(list) = caps.get(1) {
                for name in FEATURE_SEPARATOR.split(list.as_str()) {
                    push_unique(features, name);
                }
            }
        }
        result = pattern.replace_all(&result, "").to_string();
    }

    for pattern in TITLE_TAG_PATTERNS.iter() {
        result = pattern.replace_all(&result, "").to_string();
    }

    collapse_whitespace(&result)
        .trim_matches(TITLE_TRIM_CHARS)
        .to_string()
}

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Normalize a song title and extract featured artists.
/// Strips video/quality tags, pulls out "feat."/"ft."/"featuring" clauses,
/// collapses whitespace and trims residual punctuation. Case is preserved.
///
/// Repeats the cleanup until the title stops changing, so the result is a
/// fixed point: `normalize_title(&normalize_title(t).0).0 == normalize_title(t).0`.
pub fn normalize_title(title: &str) -> (String, Vec<String>) {
    let mut features = Vec::new();
    let mut current = title.to_string();
    loop {
        let next = clean_title_pass(&current, &mut features);
        if next == current {
            break;
        }
        current = next;
    }
    (current, features)
}

/// Title cleanup without the feature list.
pub fn clean_title(title: &str) -> String {
    normalize_title(title).0
}

/// Normalize an artist name for matching.
/// Collapses whitespace and moves a leading "The " to a trailing ", The"
/// ("The Beatles" → "Beatles, The"). Case is preserved.
pub fn normalize_artist(artist: &str) -> String {
    let collapsed = collapse_whitespace(artist);
    let has_the_prefix = collapsed
        .get(..4)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("the "));
    if has_the_prefix {
        let base = collapsed[4..].trim();
        if !base.is_empty() {
            return format!("{}, The", base);
        }
    }
    collapsed
}

fn key_part(s: &str) -> String {
    let folded: String = fold_to_ascii(s)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    collapse_whitespace(&folded)
}

/// Dedup key `title|artist`: lowercase ASCII, punctuation removed,
/// whitespace collapsed. Not used for scoring.
pub fn create_search_key(title: &str, artist: &str) -> String {
    format!("{}|{}", key_part(title), key_part(artist))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "Bohemian Rhapsody (Official Video)",
        "Song Title (feat. Artist Name)",
        "Another Song ft. Someone Else",
        "Song (feat. Artist1 & Artist2) [HD]",
        "  Hotel   California - Eagles ",
        "[(HD)]",
        "Track - (Lyrics) -",
        "Old Town Road featuring Billy Ray Cyrus (Official Music Video)",
        "Help!",
        "",
    ];

    #[test]
    fn test_normalize_title_basic() {
        let (title, features) = normalize_title("Hotel California - Eagles");
        assert_eq!(title, "Hotel California - Eagles");
        assert!(features.is_empty());
    }

    #[test]
    fn test_normalize_title_strips_tags() {
        assert_eq!(clean_title("Bohemian Rhapsody (Official Video)"), "Bohemian Rhapsody");
        assert_eq!(clean_title("Song [official audio]"), "Song");
        assert_eq!(clean_title("Song (Lyrics)"), "Song");
        assert_eq!(clean_title("Song [HD] (4K)"), "Song");
        assert_eq!(clean_title("Song (Visualiser)"), "Song");
    }

    #[test]
    fn test_feature_extraction() {
        let (title, features) = normalize_title("Song Title (feat. Artist Name)");
        assert_eq!(title, "Song Title");
        assert_eq!(features, vec!["Artist Name".to_string()]);

        let (title, features) = normalize_title("Another Song ft. Someone Else");
        assert_eq!(title, "Another Song");
        assert_eq!(features, vec!["Someone Else".to_string()]);
    }

    #[test]
    fn test_multiple_features_deduplicated() {
        let (title, features) = normalize_title("Song (feat. Artist1 & Artist2, artist1 and Artist3)");
        assert_eq!(title, "Song");
        assert_eq!(features, vec!["Artist1", "Artist2", "Artist3"]);
    }

    #[test]
    fn test_feature_before_tag() {
        let (title, features) = normalize_title("Hit feat. Guest (Official Video)");
        assert_eq!(title, "Hit");
        assert_eq!(features, vec!["Guest"]);
    }

    #[test]
    fn test_feature_word_boundary() {
        // "ft" inside a word is not a feature marker
        let (title, features) = normalize_title("Left Behind");
        assert_eq!(title, "Left Behind");
        assert!(features.is_empty());
    }

    #[test]
    fn test_normalize_title_idempotent() {
        for sample in SAMPLES {
            let once = clean_title(sample);
            let twice = clean_title(&once);
            assert_eq!(once, twice, "not a fixed point for {:?}", sample);
        }
    }

    #[test]
    fn test_normalize_artist() {
        assert_eq!(normalize_artist("The Beatles"), "Beatles, The");
        assert_eq!(normalize_artist("Queen"), "Queen");
        assert_eq!(normalize_artist("  Led   Zeppelin  "), "Led Zeppelin");
        assert_eq!(normalize_artist("the  rolling stones"), "rolling stones, The");
        assert_eq!(normalize_artist("The"), "The");
        assert_eq!(normalize_artist("Theory of a Deadman"), "Theory of a Deadman");
        assert_eq!(normalize_artist("Björk"), "Björk");
    }

    #[test]
    fn test_normalize_artist_idempotent() {
        for a in ["The Beatles", "Queen", "The The", "  the  Cure "] {
            let once = normalize_artist(a);
            assert_eq!(normalize_artist(&once), once);
        }
    }

    #[test]
    fn test_create_search_key() {
        assert_eq!(create_search_key("Song, Title!", "Artist's Name"), "song title|artists name");
        assert_eq!(create_search_key("  Beyoncé  ", "AC/DC"), "beyonce|acdc");
        for (t, a) in [("A|B", "C|D"), ("Don't Stop", "Fleetwood Mac"), ("", "")] {
            let key = create_search_key(t, a);
            assert_eq!(key.matches('|').count(), 1);
            assert_eq!(key, key.to_lowercase());
            assert!(!key.chars().any(|c| c.is_ascii_punctuation() && c != '|'));
        }
    }

    #[test]
    fn test_fold_to_ascii() {
        assert_eq!(fold_to_ascii("Björk"), "bjork");
        assert_eq!(fold_to_ascii("Motörhead"), "motorhead");
        assert_eq!(fold_to_ascii("Beyoncé"), "beyonce");
    }

    #[test]
    fn test_live_version_detection() {
        assert!(is_live_version("Song Title (Live)"));
        assert!(is_live_version("Song Title - Live at Madison Square Garden"));
        assert!(is_live_version("Song (Acoustic Session)"));
        assert!(!is_live_version("Song Title"));
        assert!(!is_live_version("Oliver's Delivery"));
    }

    #[test]
    fn test_remix_detection() {
        assert!(is_remix_version("Song Title (Remix)"));
        assert!(is_remix_version("Song Title - Radio Edit"));
        assert!(!is_remix_version("Song Title"));
    }

    #[test]
    fn test_remaster_detection() {
        assert!(is_remaster("Song Title (Remastered)"));
        assert!(is_remaster("Song Title - 2009 Remaster"));
        assert!(!is_remaster("Song Title"));
    }

    #[test]
    fn test_version_flags() {
        let flags = version_flags("Song (Live) - 2011 Remaster");
        assert!(flags.live && flags.remaster && !flags.remix);
        assert!(!version_flags("Plain").any());
    }
}
