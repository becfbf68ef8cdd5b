//! songmatch: match an exported song list against a music catalog and mark
//! the confident matches as favorites.
//!
//! Usage:
//!   songmatch run --input liked.csv [--fixture catalog.json] [--dry-run] [--interactive]
//!   songmatch init-config [--path .songmatch.toml] [--force]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use songmatch::catalog::{Catalog, FixtureCatalog, SharedCatalog};
use songmatch::config::{sample_config_toml, CatalogLayer, ConfigBuilder, ConfigLayer, CONFIG_FILE_NAME};
use songmatch::ingest::parse_input_file;
use songmatch::logging::{init_logging, Verbosity};
use songmatch::models::{Decision, SkipPolicy, Summary};
use songmatch::progress::{create_progress_bar, format_duration, is_log_only, log_progress, set_log_only};
use songmatch::review::{CancelSignal, Reviewer, TerminalReviewer};
use songmatch::safety::validate_report_path;
use songmatch::spotify::SpotifyCatalog;
use songmatch::Matcher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Print a progress line every this many songs in log-only mode
const LOG_INTERVAL: u64 = 25;

#[derive(Parser, Debug)]
#[command(name = "songmatch")]
#[command(about = "Match exported songs against a catalog and mark confident matches as favorites")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Match every song of an export file
    Run(RunArgs),

    /// Write a commented sample configuration file
    InitConfig(InitConfigArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Export file to read (.csv, .json or .txt)
    #[arg(short, long)]
    input: PathBuf,

    /// Config file (default: ./.songmatch.toml, then ~/.songmatch.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Minimum score for automatic acceptance
    #[arg(long)]
    hard_threshold: Option<f64>,

    /// Scores below this are rejected automatically
    #[arg(long)]
    reject_threshold: Option<f64>,

    /// Candidates kept per song
    #[arg(long)]
    max_candidates: Option<usize>,

    /// Ask about uncertain matches instead of skipping them
    #[arg(long)]
    interactive: bool,

    /// Decide everything but do not mark favorites
    #[arg(long)]
    dry_run: bool,

    /// Only process the first N songs
    #[arg(long)]
    limit: Option<usize>,

    /// Use an offline catalog (JSON array of candidate records) instead of Spotify
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Write decisions and summary to this JSON file
    #[arg(long)]
    report: Option<PathBuf>,

    /// How skipped songs count in the success rate (count-as-failure, neutral)
    #[arg(long)]
    skip_policy: Option<SkipPolicy>,

    /// Requests per second against the catalog
    #[arg(long)]
    rate: Option<f64>,

    /// Hide progress bars, print periodic progress lines instead
    #[arg(long)]
    log_only: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Log per-song outcomes
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Log per-candidate scores
    #[arg(long)]
    debug: bool,
}

#[derive(Parser, Debug)]
struct InitConfigArgs {
    /// Where to write the file
    #[arg(long, default_value = CONFIG_FILE_NAME)]
    path: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
}

impl RunArgs {
    /// Flags given on the command line, as the topmost config layer.
    fn overrides(&self) -> ConfigLayer {
        ConfigLayer {
            hard_threshold: self.hard_threshold,
            reject_threshold: self.reject_threshold,
            max_candidates: self.max_candidates,
            interactive: self.interactive.then_some(true),
            dry_run: self.dry_run.then_some(true),
            skip_policy: self.skip_policy,
            catalog: CatalogLayer {
                rate_per_second: self.rate,
                ..CatalogLayer::default()
            },
            ..ConfigLayer::default()
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Run(args) => run(args),
        Command::InitConfig(args) => init_config(&args),
    }
}

fn init_config(args: &InitConfigArgs) -> Result<()> {
    if args.path.exists() && !args.force {
        bail!("{:?} already exists (use --force to overwrite)", args.path);
    }
    std::fs::write(&args.path, sample_config_toml())
        .with_context(|| format!("Failed to write {:?}", args.path))?;
    println!("Wrote sample configuration to {:?}", args.path);
    Ok(())
}

fn run(args: RunArgs) -> Result<()> {
    init_logging(Verbosity::from_flags(args.quiet, args.verbose, args.debug), args.json_logs)?;
    set_log_only(args.log_only);

    let start = Instant::now();

    let builder = match &args.config {
        Some(path) => ConfigBuilder::new().with_file(path)?,
        None => ConfigBuilder::new().with_default_file()?,
    };
    let config = builder
        .with_env()?
        .with_overrides(args.overrides())
        .build()
        .context("Invalid configuration")?;

    if let Some(report) = &args.report {
        validate_report_path(report, &args.input)?;
    }

    let songs = parse_input_file(&args.input)?;
    println!("Loaded {} songs from {:?}", songs.len(), args.input);
    if songs.is_empty() {
        println!("Nothing to match.");
        return Ok(());
    }

    let catalog = open_catalog(args.fixture.as_deref(), &config)?;
    let matcher = Matcher::new(catalog, config);
    let interactive = matcher.config().interactive();
    if matcher.config().dry_run() {
        println!("Dry run: favorites will not be changed");
    }

    let total = args.limit.unwrap_or(songs.len()).min(songs.len());
    let pb = create_progress_bar(total as u64, "Matching", interactive);

    let mut terminal = TerminalReviewer::stdio();
    let reviewer: Option<&mut dyn Reviewer> = if interactive {
        Some(&mut terminal as &mut dyn Reviewer)
    } else {
        None
    };

    let mut done = 0u64;
    let report = matcher.run_batch(
        &songs,
        args.limit,
        reviewer,
        &CancelSignal::never(),
        |decision: &Decision| {
            done += 1;
            pb.inc(1);
            log_progress("MATCH", done, total as u64, LOG_INTERVAL);
            if interactive {
                eprintln!(
                    "  -> {} - {}: {}",
                    decision.song().title,
                    decision.song().artist,
                    decision.reason()
                );
            }
        },
    );
    pb.finish_and_clear();

    print_summary(&report.summary, report.favorites_applied, matcher.config().dry_run());
    if report.favorites_existing > 0 {
        println!("  Already favorites: {}", report.favorites_existing);
    }
    if report.aborted {
        println!(
            "  Aborted: {} of {} songs left unprocessed",
            total - report.decisions.len(),
            total
        );
    }
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");

    if is_log_only() {
        report.summary.log_phase("summary");
    }

    if let Some(path) = &args.report {
        report
            .write_to_file(path)
            .with_context(|| format!("Failed to write report {:?}", path))?;
        println!("Report written to {:?}", path);
    }

    Ok(())
}

/// Offline fixture when given, otherwise the throttled Spotify client.
fn open_catalog(fixture: Option<&Path>, config: &songmatch::MatchConfig) -> Result<Arc<dyn Catalog>> {
    if let Some(path) = fixture {
        let catalog = FixtureCatalog::from_file(path)?;
        println!("Using fixture catalog {:?} ({} records)", path, catalog.len());
        return Ok(Arc::new(catalog));
    }

    let settings = config.catalog();
    let spotify = SpotifyCatalog::from_settings(settings)?;
    let user = spotify
        .current_user()
        .context("Catalog authentication check failed")?;
    info!(user = %user, api = %settings.api_base, "catalog connected");
    println!("Connected to {} as {}", settings.api_base, user);
    Ok(Arc::new(SharedCatalog::new(spotify, settings.rate_per_second)))
}

fn print_summary(summary: &Summary, favorites: usize, dry_run: bool) {
    println!("\n{:=<60}", "");
    println!("Matching complete!");
    println!("  Songs processed: {}", summary.total);
    println!(
        "  Matched: {} ({} automatic, {} manual)",
        summary.matched(),
        summary.auto_accept,
        summary.manual_accept
    );
    if dry_run {
        println!("  Favorites (would apply): {}", favorites);
    } else {
        println!("  Favorites applied: {}", favorites);
    }
    println!("  Skipped: {}", summary.skipped);
    println!(
        "  Rejected: {} ({} no candidates)",
        summary.rejected() + summary.no_candidates,
        summary.no_candidates
    );
    println!(
        "  Success rate: {:.1}% (skip policy: {})",
        summary.success_rate * 100.0,
        summary.skip_policy
    );
    println!("  Avg confidence: {:.2}", summary.avg_confidence);
}
