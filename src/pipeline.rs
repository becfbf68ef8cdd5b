//! Per-song pipeline and batch runner.
//!
//! Each song goes through search, scoring and the decision engine in order,
//! then the favorite side effect (skipped in dry runs). Songs are processed
//! strictly one after another; the only thing that stops a batch early is a
//! human abort or a cancel signal.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::MatchConfig;
use crate::decision::{decide, summarize};
use crate::error::MatchError;
use crate::models::{CandidateRecord, Decision, FavoriteStatus, SongReference, Summary};
use crate::review::{CancelSignal, Reviewer};
use crate::scoring::Scorer;
use crate::search::search_candidates;

/// Result of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub decisions: Vec<Decision>,
    pub summary: Summary,
    /// True when the batch stopped on a human abort or cancel signal
    pub aborted: bool,
    /// Favorites applied, or that would be applied in a dry run
    pub favorites_applied: usize,
    /// Accepted tracks that were already favorites
    pub favorites_existing: usize,
}

impl BatchReport {
    /// Write report to JSON file
    pub fn write_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Matching engine bound to one catalog and one validated configuration.
pub struct Matcher {
    catalog: Arc<dyn Catalog>,
    config: MatchConfig,
    scorer: Scorer,
}

impl Matcher {
    pub fn new(catalog: Arc<dyn Catalog>, config: MatchConfig) -> Self {
        let scorer = Scorer::new(*config.album_scoring());
        Self {
            catalog,
            config,
            scorer,
        }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Searched, deduplicated and scored candidates, best first.
    pub fn candidates_for(&self, song: &SongReference) -> Vec<CandidateRecord> {
        let found = search_candidates(song, self.catalog.as_ref(), self.config.max_candidates());
        self.scorer.score(song, found)
    }

    /// Search, score and decide one song. The favorite side effect is not
    /// applied here, see `apply_favorite`.
    pub fn process_song(
        &self,
        song: &SongReference,
        reviewer: Option<&mut dyn Reviewer>,
    ) -> Result<Decision, MatchError> {
        let candidates = self.candidates_for(song);
        let reviewer = if self.config.interactive() { reviewer } else { None };
        decide(song.clone(), candidates, self.config.thresholds(), reviewer)
    }

    /// Runs the favorite side effect for an accepted decision. Failures are
    /// recorded on the decision and never retried.
    pub fn apply_favorite(&self, decision: Decision) -> Decision {
        let Some(id) = decision.chosen().map(|c| c.id.clone()) else {
            return decision.with_favorite(FavoriteStatus::NotApplicable);
        };
        if self.config.dry_run() {
            return decision.with_favorite(FavoriteStatus::WouldApply);
        }
        match self.catalog.mark_favorite(&id) {
            Ok(true) => decision.with_favorite(FavoriteStatus::Applied),
            Ok(false) => decision.with_favorite(FavoriteStatus::AlreadyApplied),
            Err(e) => {
                warn!(id = %id, error = %e, "failed to mark favorite");
                decision.with_favorite(FavoriteStatus::Failed(e.to_string()))
            }
        }
    }

    /// Processes `songs` in order, at most `limit` of them.
    ///
    /// `on_decision` sees every final decision as it is made. An aborted song
    /// produces no decision; everything decided before the abort is kept.
    pub fn run_batch<F>(
        &self,
        songs: &[SongReference],
        limit: Option<usize>,
        mut reviewer: Option<&mut dyn Reviewer>,
        cancel: &CancelSignal,
        mut on_decision: F,
    ) -> BatchReport
    where
        F: FnMut(&Decision),
    {
        if self.config.interactive() && reviewer.is_none() {
            warn!("interactive mode without a reviewer; uncertain matches will be skipped");
        }

        let take = limit.unwrap_or(songs.len()).min(songs.len());
        let mut decisions = Vec::with_capacity(take);
        let mut aborted = false;

        for song in &songs[..take] {
            if cancel.is_cancelled() {
                info!(remaining = take - decisions.len(), "batch cancelled");
                aborted = true;
                break;
            }
            let reviewer = reviewer.as_mut().map(|r| &mut **r as &mut dyn Reviewer);
            match self.process_song(song, reviewer) {
                Ok(decision) => {
                    let decision = self.apply_favorite(decision);
                    on_decision(&decision);
                    decisions.push(decision);
                }
                Err(MatchError::HumanAbort) => {
                    info!(line = song.source_line, "aborted by reviewer");
                    aborted = true;
                    break;
                }
                Err(e) => {
                    // Configuration errors cannot surface after build()
                    warn!(error = %e, "unexpected error, stopping batch");
                    aborted = true;
                    break;
                }
            }
        }

        let favorites_applied = decisions
            .iter()
            .filter(|d| matches!(d.favorite(), FavoriteStatus::Applied | FavoriteStatus::WouldApply))
            .count();
        let favorites_existing = decisions
            .iter()
            .filter(|d| matches!(d.favorite(), FavoriteStatus::AlreadyApplied))
            .count();
        let summary = summarize(&decisions, self.config.skip_policy());
        BatchReport {
            decisions,
            summary,
            aborted,
            favorites_applied,
            favorites_existing,
        }
    }
}
