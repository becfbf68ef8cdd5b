//! Input file parsing.
//!
//! Supports:
//! - CSV (header detection with column aliases, or Title, Artist, Album, Duration)
//! - JSON (array of track objects, or an object with `tracks`/`songs`/`items`)
//! - TXT (`Title - Artist`, `Title | Artist`, tab-separated, or a lone title)

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::models::SongReference;

const TITLE_HEADERS: &[&str] = &["title", "name", "song", "track", "song_name", "track_name"];
const ARTIST_HEADERS: &[&str] = &["artist", "artist_name", "artists", "performer"];
const ALBUM_HEADERS: &[&str] = &["album", "album_name", "release"];
const DURATION_HEADERS: &[&str] = &["duration", "length", "time", "duration_ms"];

/// Durations above this are read as milliseconds.
const MS_CUTOFF: u64 = 10_000;

/// Qualifiers appended to titles by video exports.
static VIDEO_QUALIFIERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*[\(\[](?:official\s+(?:music\s+|lyric\s+)?(?:video|audio)|hd|hq)[\)\]]").unwrap()
});

/// Parses an export into song references, by file extension.
pub fn parse_input_file(path: &Path) -> Result<Vec<SongReference>> {
    if !path.exists() {
        bail!("Input file not found: {}", path.display());
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let songs = match ext.as_str() {
        "csv" => parse_csv(&text).context("Failed to parse CSV file")?,
        "json" => parse_json(&text).context("Failed to parse JSON file")?,
        "txt" => parse_txt(&text),
        other => bail!("Unsupported file format: .{}. Supported: .csv, .json, .txt", other),
    };
    info!(songs = songs.len(), format = %ext, path = %path.display(), "parsed input");
    Ok(songs)
}

// ============================================================================
// Durations
// ============================================================================

/// `m:ss`, `h:mm:ss`, plain seconds, or milliseconds (values above 10000).
pub fn parse_duration(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.contains(':') {
        let parts: Vec<u64> = raw
            .split(':')
            .map(|p| p.trim().parse::<u64>())
            .collect::<Result<_, _>>()
            .ok()?;
        let secs = match parts.as_slice() {
            [m, s] if *s < 60 => m * 60 + s,
            [h, m, s] if *m < 60 && *s < 60 => h * 3600 + m * 60 + s,
            _ => return None,
        };
        return u32::try_from(secs).ok();
    }
    let value: f64 = raw.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let value = value.round() as u64;
    let secs = if value > MS_CUTOFF { value / 1000 } else { value };
    u32::try_from(secs).ok()
}

// ============================================================================
// CSV
// ============================================================================

/// Splits one CSV record. Handles quoted fields and doubled quotes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Joins physical lines into records so quoted fields may span lines.
/// Yields the 1-based line number each record starts on.
fn csv_records(text: &str) -> Vec<(usize, String)> {
    let mut records = Vec::new();
    let mut current = String::new();
    let mut start = 0;
    let mut quotes = 0usize;

    for (i, line) in text.lines().enumerate() {
        if current.is_empty() {
            start = i + 1;
        } else {
            current.push('\n');
        }
        current.push_str(line);
        quotes += line.matches('"').count();
        if quotes % 2 == 0 {
            records.push((start, std::mem::take(&mut current)));
            quotes = 0;
        }
    }
    if !current.is_empty() {
        records.push((start, current));
    }
    records
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Columns {
    title: usize,
    artist: usize,
    album: Option<usize>,
    duration: Option<usize>,
}

impl Columns {
    const POSITIONAL: Columns = Columns {
        title: 0,
        artist: 1,
        album: Some(2),
        duration: Some(3),
    };

    fn find(headers: &[String], aliases: &[&str]) -> Option<usize> {
        headers.iter().position(|h| aliases.contains(&h.as_str()))
    }

    /// Column positions from a header row, `None` when it is not one.
    fn from_header(row: &[String]) -> Option<Columns> {
        let headers: Vec<String> = row.iter().map(|h| h.trim().to_lowercase()).collect();
        let title = Self::find(&headers, TITLE_HEADERS);
        let artist = Self::find(&headers, ARTIST_HEADERS);
        let album = Self::find(&headers, ALBUM_HEADERS);
        let duration = Self::find(&headers, DURATION_HEADERS);
        if title.is_none() && artist.is_none() && album.is_none() && duration.is_none() {
            return None;
        }
        Some(Columns {
            title: title.unwrap_or(0),
            artist: artist.unwrap_or(1),
            album: album.or(if headers.len() > 2 { Some(2) } else { None }),
            duration: duration.or(if headers.len() > 3 { Some(3) } else { None }),
        })
    }
}

fn cell(row: &[String], index: Option<usize>) -> &str {
    index
        .and_then(|i| row.get(i))
        .map(|s| s.trim())
        .unwrap_or_default()
}

pub fn parse_csv(text: &str) -> Result<Vec<SongReference>> {
    let text = text.trim_start_matches('\u{feff}');
    let mut records = csv_records(text).into_iter().peekable();

    let header = records.peek().map(|(_, line)| split_csv_line(line));
    let columns = match header.as_deref().and_then(Columns::from_header) {
        Some(columns) => {
            records.next();
            columns
        }
        None => Columns::POSITIONAL,
    };

    let mut songs = Vec::new();
    for (line_no, line) in records {
        let row = split_csv_line(&line);
        if row.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let title = cell(&row, Some(columns.title));
        let artist = cell(&row, Some(columns.artist));
        if title.is_empty() || artist.is_empty() {
            warn!(line = line_no, "skipping row - missing title or artist");
            continue;
        }
        let album = cell(&row, columns.album);
        songs.push(SongReference::new(
            title,
            artist,
            Some(album.to_string()),
            parse_duration(cell(&row, columns.duration)),
            line_no,
        ));
    }
    Ok(songs)
}

// ============================================================================
// JSON
// ============================================================================

fn first_field<'a>(track: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| track.get(*k))
        .find(|v| !v.is_null() && v.as_str() != Some(""))
}

fn value_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(", "),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

pub fn parse_json(text: &str) -> Result<Vec<SongReference>> {
    let data: Value = serde_json::from_str(text)?;
    let tracks = match &data {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => ["tracks", "songs", "items"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => bail!("Unexpected JSON structure"),
    };

    let mut songs = Vec::new();
    for (i, track) in tracks.iter().enumerate() {
        let title = value_text(first_field(track, &["title", "name", "track_name"]));
        let artist = value_text(first_field(track, &["artist", "artist_name"]));
        if title.is_empty() || artist.is_empty() {
            warn!(track = i + 1, "skipping track - missing title or artist");
            continue;
        }
        let album = value_text(first_field(track, &["album", "album_name"]));
        let duration = value_text(first_field(track, &["duration", "duration_ms", "length"]));
        songs.push(SongReference::new(
            title,
            artist,
            Some(album),
            parse_duration(&duration),
            i + 1,
        ));
    }
    Ok(songs)
}

// ============================================================================
// TXT
// ============================================================================

fn clean_txt_title(title: &str) -> String {
    VIDEO_QUALIFIERS.replace_all(title, "").trim().to_string()
}

fn clean_txt_artist(artist: &str) -> String {
    let artist = artist.trim();
    artist.strip_prefix("by ").unwrap_or(artist).trim().to_string()
}

pub fn parse_txt(text: &str) -> Vec<SongReference> {
    let mut songs = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (title, artist) = [" - ", " | ", "\t"]
            .iter()
            .find_map(|sep| line.split_once(sep))
            .unwrap_or((line, ""));

        let title = clean_txt_title(title);
        let artist = clean_txt_artist(artist);
        if title.is_empty() {
            warn!(line = i + 1, "skipping line - no title");
            continue;
        }
        songs.push(SongReference::new(title, artist, None, None, i + 1));
    }
    songs
}
