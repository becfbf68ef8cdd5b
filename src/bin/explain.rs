//! Explain how one song reference would be matched against a fixture catalog.
//! Prints the normalized forms, the query plan with hit counts, and every
//! scored candidate with its component scores.
//!
//! Usage: songmatch-explain --title "Bohemian Rhapsody" --artist Queen --fixture catalog.json

use anyhow::{Context, Result};
use clap::Parser;
use songmatch::catalog::{Catalog, FixtureCatalog};
use songmatch::config::{ConfigBuilder, ConfigLayer, MatchConfig};
use songmatch::decision::classify;
use songmatch::logging::{init_logging, Verbosity};
use songmatch::models::SongReference;
use songmatch::normalize::{normalize_artist, normalize_title, version_flags, VersionFlags};
use songmatch::scoring::{match_quality, Scorer};
use songmatch::search::{build_queries, search_candidates};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "songmatch-explain")]
#[command(about = "Show the query plan and candidate scores for one song")]
struct Args {
    #[arg(long)]
    title: String,

    #[arg(long)]
    artist: String,

    #[arg(long)]
    album: Option<String>,

    /// Offline catalog (JSON array of candidate records)
    #[arg(long)]
    fixture: PathBuf,

    /// Config file (default: ./.songmatch.toml, then ~/.songmatch.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Candidates kept after deduplication
    #[arg(long)]
    max: Option<usize>,

    #[arg(long)]
    hard_threshold: Option<f64>,

    #[arg(long)]
    reject_threshold: Option<f64>,

    /// Log per-query and per-candidate details
    #[arg(long)]
    debug: bool,
}

/// Same layering as `songmatch run`, so both score a song identically.
fn load_config(args: &Args) -> Result<MatchConfig> {
    let builder = match &args.config {
        Some(path) => ConfigBuilder::new().with_file(path)?,
        None => ConfigBuilder::new().with_default_file()?,
    };
    let config = builder
        .with_env()?
        .with_overrides(ConfigLayer {
            hard_threshold: args.hard_threshold,
            reject_threshold: args.reject_threshold,
            max_candidates: args.max,
            ..ConfigLayer::default()
        })
        .build()
        .context("Invalid configuration")?;
    Ok(config)
}

fn flags_label(flags: VersionFlags) -> String {
    if !flags.any() {
        return "-".to_string();
    }
    let mut parts = Vec::new();
    if flags.live {
        parts.push("live");
    }
    if flags.remix {
        parts.push("remix");
    }
    if flags.remaster {
        parts.push("remaster");
    }
    parts.join(",")
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(Verbosity::from_flags(false, false, args.debug), false)?;
    let config = load_config(&args)?;
    let thresholds = config.thresholds();
    let max = config.max_candidates();
    let catalog = FixtureCatalog::from_file(&args.fixture)?;
    let song = SongReference::new(args.title, args.artist, args.album, None, 0);

    let (title_norm, featured) = normalize_title(&song.title);
    println!("Input: {} - {}", song.title, song.artist);
    println!("  Normalized title:  {:?}", title_norm);
    if !featured.is_empty() {
        println!("  Featured artists:  {}", featured.join(", "));
    }
    println!("  Normalized artist: {:?}", normalize_artist(&song.artist));
    println!("  Key: {}", song.key);
    println!("  Version flags: {}", flags_label(version_flags(&song.title)));

    println!("\nQuery plan:");
    for (i, query) in build_queries(&song).iter().enumerate() {
        let hits = match catalog.search(query, max) {
            Ok(found) => found.len().to_string(),
            Err(e) => format!("error: {}", e),
        };
        println!("  {}. {:<60} {}", i + 1, query, hits);
    }

    let found = search_candidates(&song, &catalog, max);
    let scored = Scorer::new(*config.album_scoring()).score(&song, found);

    println!("\n{:=<100}", "");
    println!(
        "{:<3} {:<28} {:<22} {:>6} {:>6} {:>6} {:>6}  {:<10} {}",
        "#", "Title", "Artist", "Title", "Artist", "Album", "Total", "Quality", "Flags"
    );
    println!("{:-<100}", "");
    for (i, c) in scored.iter().enumerate() {
        println!(
            "{:<3} {:<28} {:<22} {:>6.2} {:>6.2} {:>6.2} {:>6.3}  {:<10} {}",
            i + 1,
            truncate(&c.title, 28),
            truncate(c.credited_artists(), 22),
            c.scores.title,
            c.scores.artist,
            c.scores.album,
            c.scores.composite,
            match_quality(c.scores.composite).label(),
            flags_label(version_flags(&c.title)),
        );
    }
    if scored.is_empty() {
        println!("(no candidates)");
    }
    println!("{:=<100}", "");

    let verdict = classify(song, scored, thresholds, false);
    println!(
        "Verdict: {} (hard {:.2}, reject {:.2})",
        verdict.outcome(),
        thresholds.hard(),
        thresholds.reject()
    );

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
