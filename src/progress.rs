//! Progress bar and logging utilities.
//!
//! Provides the batch progress bar, with support for log-only mode where
//! the bar is hidden for tail-friendly output.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Global flag for log-only mode (set from args in main)
pub static LOG_ONLY: AtomicBool = AtomicBool::new(false);

/// Set log-only mode globally
pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

/// Check if log-only mode is enabled
pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Format duration in human-readable format
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let mins = secs / 60.0;
        format!("{:.1}m", mins)
    }
}

/// Create the per-song progress bar.
/// Hidden in log-only mode, and when `hidden` is set (interactive prompts
/// would be drawn over).
pub fn create_progress_bar(len: u64, msg: &str, hidden: bool) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if hidden || is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        let style = ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb
}

/// Log progress periodically for tail-friendly output.
/// Only logs when in log-only mode and at specified intervals.
pub fn log_progress(phase: &str, current: u64, total: u64, interval: u64) {
    if let Some(line) = progress_line(phase, current, total, interval) {
        if is_log_only() {
            eprintln!("{}", line);
        }
    }
}

fn progress_line(phase: &str, current: u64, total: u64, interval: u64) -> Option<String> {
    if total == 0 || interval == 0 {
        return None;
    }
    if current % interval == 0 || current == total {
        let pct = 100.0 * current as f64 / total as f64;
        Some(format!("[{}] {}/{} ({:.1}%)", phase, current, total, pct))
    } else {
        None
    }
}
