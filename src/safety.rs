//! Safety checks before writing a report.
//!
//! A report must never overwrite the export it was built from, or any
//! other file that is not a JSON report.

use anyhow::{bail, Result};
use std::path::Path;

/// Extensions accepted as input exports; never a valid report target.
const INPUT_EXTENSIONS: &[&str] = &["csv", "txt"];

/// Validates that a report path is safe to overwrite.
///
/// Checks:
/// - Report must have a `.json` extension
/// - Report cannot be the same file as the input (compared after
///   canonicalizing when both exist)
pub fn validate_report_path(report: &Path, input: &Path) -> Result<()> {
    let ext = report
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if INPUT_EXTENSIONS.contains(&ext.as_str()) {
        bail!(
            "Safety check failed: report '{}' looks like an input export",
            report.display()
        );
    }
    if ext != "json" {
        bail!(
            "Safety check failed: report '{}' must have a .json extension",
            report.display()
        );
    }

    let same = match (report.canonicalize(), input.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => report == input,
    };
    if same {
        bail!(
            "Safety check failed: report '{}' cannot be the same as input '{}'",
            report.display(),
            input.display()
        );
    }

    Ok(())
}
