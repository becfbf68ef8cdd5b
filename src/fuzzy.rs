//! Fuzzy string similarity measures, all in [0, 1].
//!
//! Every measure lowercases its inputs, turns non-alphanumerics into spaces
//! and collapses whitespace first. An empty side scores 0.

use std::collections::BTreeSet;
use strsim::normalized_levenshtein;

/// Lowercase, punctuation to spaces, single-spaced.
pub fn preprocess(s: &str) -> String {
    let mapped: String = s
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn raw_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    normalized_levenshtein(a, b)
}

fn raw_partial_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let short_len = short.chars().count();
    let long_chars: Vec<char> = long.chars().collect();
    if short_len == long_chars.len() {
        return raw_ratio(short, long);
    }

    let mut best = 0.0_f64;
    for start in 0..=(long_chars.len() - short_len) {
        let window: String = long_chars[start..start + short_len].iter().collect();
        let score = normalized_levenshtein(short, &window);
        if score > best {
            best = score;
            if best >= 1.0 {
                break;
            }
        }
    }
    best
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn join_parts(head: &str, tail: &[&str]) -> String {
    let tail = tail.join(" ");
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail,
        (false, true) => head.to_string(),
        (false, false) => format!("{} {}", head, tail),
    }
}

/// Full-string edit-distance similarity.
pub fn ratio(a: &str, b: &str) -> f64 {
    raw_ratio(&preprocess(a), &preprocess(b))
}

/// Best `ratio` of the shorter string against each equal-length window of
/// the longer one. Handles truncated titles.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    raw_partial_ratio(&preprocess(a), &preprocess(b))
}

/// `ratio` over alphabetically sorted tokens. Handles reordering.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    raw_ratio(&sorted_tokens(&preprocess(a)), &sorted_tokens(&preprocess(b)))
}

/// Compares the shared tokens against each side's full token set.
/// A strict token subset scores 1.0.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let a = preprocess(a);
    let b = preprocess(b);
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    if !intersection.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 1.0;
    }

    let sect = intersection.join(" ");
    let combined_a = join_parts(&sect, &only_a);
    let combined_b = join_parts(&sect, &only_b);

    raw_ratio(&sect, &combined_a)
        .max(raw_ratio(&sect, &combined_b))
        .max(raw_ratio(&combined_a, &combined_b))
}
