//! Configuration assembly.
//!
//! Layers are applied in precedence order (defaults < file < environment <
//! command line) onto one all-optional schema, then validated exactly once
//! into an immutable `MatchConfig`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decision::Thresholds;
use crate::error::MatchError;
use crate::models::SkipPolicy;
use crate::scoring::AlbumScoring;

pub use crate::decision::{DEFAULT_HARD_THRESHOLD, DEFAULT_REJECT_THRESHOLD};

pub const DEFAULT_MAX_CANDIDATES: usize = 5;
pub const DEFAULT_CATALOG_RATE: f64 = 10.0;
pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";

/// File name looked up in the working directory, then in the home directory.
pub const CONFIG_FILE_NAME: &str = ".songmatch.toml";

const ENV_PREFIX: &str = "SONGMATCH_";
const TOKEN_ENV: &str = "SPOTIFY_ACCESS_TOKEN";

// ============================================================================
// Schema
// ============================================================================

/// `[catalog]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogLayer {
    pub rate_per_second: Option<f64>,
    pub api_base: Option<String>,
    pub access_token: Option<String>,
}

/// One configuration layer. Unset fields defer to lower layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub hard_threshold: Option<f64>,
    pub reject_threshold: Option<f64>,
    pub max_candidates: Option<usize>,
    pub interactive: Option<bool>,
    pub dry_run: Option<bool>,
    pub skip_policy: Option<SkipPolicy>,
    pub album_missing: Option<f64>,
    pub album_placeholder: Option<f64>,
    pub catalog: CatalogLayer,
}

fn overlay<T>(base: &mut Option<T>, top: Option<T>) {
    if top.is_some() {
        *base = top;
    }
}

impl ConfigLayer {
    /// Fields set in `top` replace ours.
    pub fn merge(&mut self, top: ConfigLayer) {
        overlay(&mut self.hard_threshold, top.hard_threshold);
        overlay(&mut self.reject_threshold, top.reject_threshold);
        overlay(&mut self.max_candidates, top.max_candidates);
        overlay(&mut self.interactive, top.interactive);
        overlay(&mut self.dry_run, top.dry_run);
        overlay(&mut self.skip_policy, top.skip_policy);
        overlay(&mut self.album_missing, top.album_missing);
        overlay(&mut self.album_placeholder, top.album_placeholder);
        overlay(&mut self.catalog.rate_per_second, top.catalog.rate_per_second);
        overlay(&mut self.catalog.api_base, top.catalog.api_base);
        overlay(&mut self.catalog.access_token, top.catalog.access_token);
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid config file")
    }
}

// ============================================================================
// Validated Configuration
// ============================================================================

/// Connection settings for the remote catalog.
#[derive(Clone, PartialEq)]
pub struct CatalogSettings {
    pub api_base: String,
    pub access_token: Option<String>,
    pub rate_per_second: f64,
}

impl fmt::Debug for CatalogSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogSettings")
            .field("api_base", &self.api_base)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("rate_per_second", &self.rate_per_second)
            .finish()
    }
}

/// Fully validated settings for one run. Built only by `ConfigBuilder`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    thresholds: Thresholds,
    max_candidates: usize,
    interactive: bool,
    dry_run: bool,
    skip_policy: SkipPolicy,
    album: AlbumScoring,
    catalog: CatalogSettings,
}

impl MatchConfig {
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn max_candidates(&self) -> usize {
        self.max_candidates
    }

    pub fn interactive(&self) -> bool {
        self.interactive
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn skip_policy(&self) -> SkipPolicy {
        self.skip_policy
    }

    pub fn album_scoring(&self) -> &AlbumScoring {
        &self.album
    }

    pub fn catalog(&self) -> &CatalogSettings {
        &self.catalog
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            max_candidates: DEFAULT_MAX_CANDIDATES,
            interactive: false,
            dry_run: false,
            skip_policy: SkipPolicy::default(),
            album: AlbumScoring::default(),
            catalog: CatalogSettings {
                api_base: DEFAULT_API_BASE.to_string(),
                access_token: None,
                rate_per_second: DEFAULT_CATALOG_RATE,
            },
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

fn parse_env_bool(key: &str, value: &str) -> Result<bool, MatchError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(MatchError::config(format!("{} is not a boolean: '{}'", key, value))),
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, MatchError> {
    value
        .trim()
        .parse()
        .map_err(|_| MatchError::config(format!("{} has an invalid value: '{}'", key, value)))
}

fn check_unit(name: &str, value: f64) -> Result<(), MatchError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(MatchError::config(format!("{} must be within [0, 1], got {}", name, value)))
    }
}

/// Staged builder. Each `with_*` call applies one layer on top of the
/// previous ones; `build` validates.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    layer: ConfigLayer,
    sources: Vec<String>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an explicit config file. Missing or malformed files are errors.
    pub fn with_file(mut self, path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let layer = ConfigLayer::from_toml(&text).with_context(|| format!("In {:?}", path))?;
        self.layer.merge(layer);
        self.sources.push(path.display().to_string());
        Ok(self)
    }

    /// Applies the first default config file found, if any.
    pub fn with_default_file(self) -> Result<Self> {
        match default_config_path() {
            Some(path) => self.with_file(&path),
            None => Ok(self),
        }
    }

    /// Applies `SONGMATCH_*` variables and `SPOTIFY_ACCESS_TOKEN`.
    pub fn with_env(self) -> Result<Self, MatchError> {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Same as `with_env` with an injectable lookup.
    pub fn with_env_from<F>(mut self, lookup: F) -> Result<Self, MatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            let key = format!("{}{}", ENV_PREFIX, name);
            lookup(&key).filter(|v| !v.trim().is_empty()).map(|v| (key, v))
        };

        let mut layer = ConfigLayer::default();
        if let Some((k, v)) = get("HARD_THRESHOLD") {
            layer.hard_threshold = Some(parse_env(&k, &v)?);
        }
        if let Some((k, v)) = get("REJECT_THRESHOLD") {
            layer.reject_threshold = Some(parse_env(&k, &v)?);
        }
        if let Some((k, v)) = get("MAX_CANDIDATES") {
            layer.max_candidates = Some(parse_env(&k, &v)?);
        }
        if let Some((k, v)) = get("INTERACTIVE") {
            layer.interactive = Some(parse_env_bool(&k, &v)?);
        }
        if let Some((k, v)) = get("DRY_RUN") {
            layer.dry_run = Some(parse_env_bool(&k, &v)?);
        }
        if let Some((k, v)) = get("SKIP_POLICY") {
            layer.skip_policy = Some(v.parse().map_err(|e: String| MatchError::config(format!("{}: {}", k, e)))?);
        }
        if let Some((k, v)) = get("CATALOG_RATE") {
            layer.catalog.rate_per_second = Some(parse_env(&k, &v)?);
        }
        if let Some((_, v)) = get("API_BASE") {
            layer.catalog.api_base = Some(v);
        }
        if let Some(token) = lookup(TOKEN_ENV).filter(|v| !v.trim().is_empty()) {
            layer.catalog.access_token = Some(token);
        }

        if layer != ConfigLayer::default() {
            self.sources.push("environment".to_string());
        }
        self.layer.merge(layer);
        Ok(self)
    }

    /// Applies command-line overrides.
    pub fn with_overrides(mut self, overrides: ConfigLayer) -> Self {
        if overrides != ConfigLayer::default() {
            self.sources.push("command line".to_string());
        }
        self.layer.merge(overrides);
        self
    }

    /// Validates the merged layers into a `MatchConfig`.
    pub fn build(self) -> Result<MatchConfig, MatchError> {
        let layer = self.layer;
        let defaults = MatchConfig::default();

        let hard = layer.hard_threshold.unwrap_or(DEFAULT_HARD_THRESHOLD);
        let reject = layer.reject_threshold.unwrap_or(DEFAULT_REJECT_THRESHOLD);
        let thresholds = Thresholds::new(hard, reject)?;

        let max_candidates = layer.max_candidates.unwrap_or(DEFAULT_MAX_CANDIDATES);
        if max_candidates < 1 {
            return Err(MatchError::config("max_candidates must be at least 1"));
        }

        let album = AlbumScoring {
            missing: layer.album_missing.unwrap_or(defaults.album.missing),
            placeholder: layer.album_placeholder.unwrap_or(defaults.album.placeholder),
        };
        check_unit("album_missing", album.missing)?;
        check_unit("album_placeholder", album.placeholder)?;

        let rate = layer.catalog.rate_per_second.unwrap_or(DEFAULT_CATALOG_RATE);
        if !rate.is_finite() || rate <= 0.0 {
            return Err(MatchError::config(format!(
                "catalog.rate_per_second must be positive, got {}",
                rate
            )));
        }

        let api_base = layer
            .catalog
            .api_base
            .unwrap_or(defaults.catalog.api_base)
            .trim_end_matches('/')
            .to_string();
        if api_base.is_empty() {
            return Err(MatchError::config("catalog.api_base must not be empty"));
        }

        debug!(sources = ?self.sources, "configuration assembled");
        Ok(MatchConfig {
            thresholds,
            max_candidates,
            interactive: layer.interactive.unwrap_or(false),
            dry_run: layer.dry_run.unwrap_or(false),
            skip_policy: layer.skip_policy.unwrap_or_default(),
            album,
            catalog: CatalogSettings {
                api_base,
                access_token: layer.catalog.access_token,
                rate_per_second: rate,
            },
        })
    }
}

/// `./.songmatch.toml`, else `~/.songmatch.toml`, when one exists.
pub fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    dirs::home_dir()
        .map(|home| home.join(CONFIG_FILE_NAME))
        .filter(|path| path.is_file())
}

/// Commented sample written by `songmatch init-config`.
pub fn sample_config_toml() -> &'static str {
    r#"# songmatch configuration
# Precedence: defaults < this file < SONGMATCH_* environment < command line

# Minimum composite score for automatic acceptance
hard_threshold = 0.87
# Composite scores below this are rejected automatically
reject_threshold = 0.60
# Candidates kept per song after deduplication
max_candidates = 5
# Ask about uncertain matches instead of skipping them
interactive = false
# Compute favorites without applying them
dry_run = false
# How skipped songs count in the success rate: "count-as-failure" or "neutral"
skip_policy = "count-as-failure"
# Album score when either side has no album
album_missing = 0.5
# Album score when either album is "Single", "EP" or blank
album_placeholder = 0.7

[catalog]
rate_per_second = 10.0
api_base = "https://api.spotify.com/v1"
# access_token = "..."  (or set SPOTIFY_ACCESS_TOKEN)
"#
}
