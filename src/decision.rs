//! Decision engine: threshold classification, human escalation for the
//! uncertain band, and the summary reducer.
//!
//! ```text
//! no candidates        -> NoCandidates
//! best >= hard         -> AutoAccept
//! best <  reject       -> AutoReject
//! otherwise            -> Skipped (batch) | AwaitingHuman (interactive)
//! AwaitingHuman        -> ManualAccept | ManualReject | Skipped | abort
//! ```

use tracing::{info, warn};

use crate::error::MatchError;
use crate::models::{CandidateRecord, Decision, Outcome, SkipPolicy, SongReference, Summary};
use crate::review::{ReviewAction, Reviewer, MAX_PRESENTED};

pub const DEFAULT_HARD_THRESHOLD: f64 = 0.87;
pub const DEFAULT_REJECT_THRESHOLD: f64 = 0.60;

/// Validated pair `hard > reject`, both in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    hard: f64,
    reject: f64,
}

impl Thresholds {
    pub fn new(hard: f64, reject: f64) -> Result<Self, MatchError> {
        for (name, value) in [("hard_threshold", hard), ("reject_threshold", reject)] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(MatchError::config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if hard <= reject {
            return Err(MatchError::config(format!(
                "hard_threshold ({}) must be greater than reject_threshold ({})",
                hard, reject
            )));
        }
        Ok(Self { hard, reject })
    }

    pub fn hard(&self) -> f64 {
        self.hard
    }

    pub fn reject(&self) -> f64 {
        self.reject
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            hard: DEFAULT_HARD_THRESHOLD,
            reject: DEFAULT_REJECT_THRESHOLD,
        }
    }
}

/// Result of the automatic step.
#[derive(Debug, Clone)]
pub enum Verdict {
    Final(Decision),
    /// Uncertain band in interactive mode; a reviewer must resolve it.
    AwaitingHuman {
        song: SongReference,
        candidates: Vec<CandidateRecord>,
    },
}

impl Verdict {
    pub fn outcome(&self) -> Outcome {
        match self {
            Verdict::Final(decision) => decision.outcome(),
            Verdict::AwaitingHuman { .. } => Outcome::AwaitingHuman,
        }
    }
}

fn uncertain_skip(song: SongReference, score: f64) -> Decision {
    Decision::new(
        song,
        None,
        Outcome::Skipped,
        score,
        format!("Uncertain match - requires manual review (score: {:.2})", score),
        false,
    )
}

/// Automatic classification of sorted candidates against the thresholds.
pub fn classify(
    song: SongReference,
    mut candidates: Vec<CandidateRecord>,
    thresholds: &Thresholds,
    interactive: bool,
) -> Verdict {
    let Some(best) = candidates.first() else {
        return Verdict::Final(Decision::new(
            song,
            None,
            Outcome::NoCandidates,
            0.0,
            "No candidates found in catalog search".to_string(),
            false,
        ));
    };
    let score = best.scores.composite;

    if score >= thresholds.hard {
        let best = candidates.swap_remove(0);
        return Verdict::Final(Decision::new(
            song,
            Some(best),
            Outcome::AutoAccept,
            score,
            format!("High confidence match (score: {:.2})", score),
            false,
        ));
    }

    if score < thresholds.reject {
        return Verdict::Final(Decision::new(
            song,
            None,
            Outcome::AutoReject,
            score,
            format!("Below rejection threshold (score: {:.2})", score),
            false,
        ));
    }

    if interactive {
        Verdict::AwaitingHuman { song, candidates }
    } else {
        Verdict::Final(uncertain_skip(song, score))
    }
}

/// Runs the review loop for an uncertain song.
///
/// Previews and refused confirmations return to the same prompt.
/// Out-of-range indices are ignored and the prompt is re-issued.
pub fn resolve_interactively(
    song: SongReference,
    candidates: &[CandidateRecord],
    reviewer: &mut dyn Reviewer,
) -> Result<Decision, MatchError> {
    let shown = &candidates[..candidates.len().min(MAX_PRESENTED)];
    let best_score = shown.first().map(|c| c.scores.composite).unwrap_or(0.0);

    loop {
        match reviewer.choose(&song, shown) {
            ReviewAction::Select(i) if i < shown.len() => {
                let chosen = &shown[i];
                if reviewer.confirm(&song, chosen)? {
                    return Ok(Decision::new(
                        song,
                        Some(chosen.clone()),
                        Outcome::ManualAccept,
                        chosen.scores.composite,
                        format!("Manually selected (option {})", i + 1),
                        true,
                    ));
                }
            }
            ReviewAction::Preview(i) if i < shown.len() => reviewer.preview(&shown[i]),
            ReviewAction::Select(i) | ReviewAction::Preview(i) => {
                warn!(index = i, shown = shown.len(), "selection out of range, asking again");
            }
            ReviewAction::Skip => {
                return Ok(Decision::new(
                    song,
                    None,
                    Outcome::Skipped,
                    best_score,
                    "Manually skipped".to_string(),
                    true,
                ));
            }
            ReviewAction::Reject => {
                return Ok(Decision::new(
                    song,
                    None,
                    Outcome::ManualReject,
                    0.0,
                    "Manually rejected - no good match".to_string(),
                    true,
                ));
            }
            ReviewAction::Abort => return Err(MatchError::HumanAbort),
        }
    }
}

/// Classifies and, when a reviewer is given, resolves the uncertain band.
/// Without a reviewer the uncertain band is skipped.
pub fn decide(
    song: SongReference,
    candidates: Vec<CandidateRecord>,
    thresholds: &Thresholds,
    reviewer: Option<&mut dyn Reviewer>,
) -> Result<Decision, MatchError> {
    let interactive = reviewer.is_some();
    let decision = match (classify(song, candidates, thresholds, interactive), reviewer) {
        (Verdict::Final(decision), _) => decision,
        (Verdict::AwaitingHuman { song, candidates }, Some(reviewer)) => {
            resolve_interactively(song, &candidates, reviewer)?
        }
        (Verdict::AwaitingHuman { song, candidates }, None) => {
            let score = candidates.first().map(|c| c.scores.composite).unwrap_or(0.0);
            uncertain_skip(song, score)
        }
    };
    info!(
        line = decision.song().source_line,
        title = %decision.song().title,
        outcome = %decision.outcome(),
        confidence = decision.confidence(),
        "decided"
    );
    Ok(decision)
}

// ============================================================================
// Summary Reducer
// ============================================================================

/// Counts outcomes and derives rates. An empty slice gives a zeroed summary.
pub fn summarize(decisions: &[Decision], policy: SkipPolicy) -> Summary {
    let mut summary = Summary {
        total: decisions.len(),
        skip_policy: policy,
        ..Summary::default()
    };

    let mut confidence_sum = 0.0;
    let mut confidence_count = 0usize;
    for decision in decisions {
        match decision.outcome() {
            Outcome::AutoAccept => summary.auto_accept += 1,
            Outcome::ManualAccept => summary.manual_accept += 1,
            Outcome::AutoReject => summary.auto_reject += 1,
            Outcome::ManualReject => summary.manual_reject += 1,
            Outcome::Skipped => summary.skipped += 1,
            Outcome::NoCandidates => summary.no_candidates += 1,
            Outcome::AwaitingHuman => {}
        }
        if decision.confidence() > 0.0 {
            confidence_sum += decision.confidence();
            confidence_count += 1;
        }
    }

    let denominator = match policy {
        SkipPolicy::CountAsFailure => summary.total,
        SkipPolicy::Neutral => summary.total - summary.skipped,
    };
    if denominator > 0 {
        summary.success_rate = summary.matched() as f64 / denominator as f64;
    }
    if confidence_count > 0 {
        summary.avg_confidence = confidence_sum / confidence_count as f64;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MatchError;
    use std::collections::VecDeque;

    fn candidate(id: &str, composite: f64) -> CandidateRecord {
        let mut c = CandidateRecord::new(id, "Song", &["Artist"], None, 50);
        c.scores.composite = composite;
        c
    }

    fn song() -> SongReference {
        SongReference::simple("Song", "Artist")
    }

    fn defaults() -> Thresholds {
        Thresholds::new(0.87, 0.60).unwrap()
    }

    /// Replays a fixed list of answers and records what it was shown.
    struct ScriptedReviewer {
        actions: VecDeque<ReviewAction>,
        confirmations: VecDeque<bool>,
        previewed: Vec<String>,
        prompts: usize,
    }

    impl ScriptedReviewer {
        fn new(actions: Vec<ReviewAction>, confirmations: Vec<bool>) -> Self {
            Self {
                actions: actions.into(),
                confirmations: confirmations.into(),
                previewed: Vec::new(),
                prompts: 0,
            }
        }
    }

    impl Reviewer for ScriptedReviewer {
        fn choose(&mut self, _song: &SongReference, candidates: &[CandidateRecord]) -> ReviewAction {
            assert!(candidates.len() <= MAX_PRESENTED);
            self.prompts += 1;
            self.actions.pop_front().unwrap_or(ReviewAction::Skip)
        }

        fn confirm(&mut self, _song: &SongReference, _candidate: &CandidateRecord) -> Result<bool, MatchError> {
            Ok(self.confirmations.pop_front().unwrap_or(true))
        }

        fn preview(&mut self, candidate: &CandidateRecord) {
            self.previewed.push(candidate.id.clone());
        }
    }

    #[test]
    fn test_thresholds_validation() {
        assert!(Thresholds::new(0.87, 0.60).is_ok());
        assert!(matches!(
            Thresholds::new(0.5, 0.6),
            Err(MatchError::ConfigurationInvalid(_))
        ));
        assert!(Thresholds::new(0.6, 0.6).is_err());
        assert!(Thresholds::new(1.2, 0.6).is_err());
        assert!(Thresholds::new(0.9, -0.1).is_err());
        assert!(Thresholds::new(f64::NAN, 0.1).is_err());
    }

    #[test]
    fn test_decision_table() {
        let t = defaults();
        assert_eq!(classify(song(), vec![candidate("a", 0.90)], &t, false).outcome(), Outcome::AutoAccept);
        assert_eq!(classify(song(), vec![candidate("a", 0.50)], &t, false).outcome(), Outcome::AutoReject);
        assert_eq!(classify(song(), vec![candidate("a", 0.75)], &t, false).outcome(), Outcome::Skipped);
        assert_eq!(classify(song(), vec![candidate("a", 0.75)], &t, true).outcome(), Outcome::AwaitingHuman);
    }

    #[test]
    fn test_threshold_boundaries() {
        let t = defaults();
        assert_eq!(classify(song(), vec![candidate("a", 0.87)], &t, false).outcome(), Outcome::AutoAccept);
        assert_eq!(classify(song(), vec![candidate("a", 0.60)], &t, false).outcome(), Outcome::Skipped);
    }

    #[test]
    fn test_no_candidates_independent_of_thresholds() {
        for (hard, reject) in [(0.87, 0.60), (1.0, 0.0), (0.2, 0.1)] {
            let t = Thresholds::new(hard, reject).unwrap();
            let Verdict::Final(d) = classify(song(), vec![], &t, true) else {
                panic!("expected final verdict");
            };
            assert_eq!(d.outcome(), Outcome::NoCandidates);
            assert_eq!(d.confidence(), 0.0);
            assert!(d.chosen().is_none());
        }
    }

    #[test]
    fn test_auto_decisions_fields() {
        let t = defaults();
        let Verdict::Final(accept) = classify(song(), vec![candidate("a", 0.91), candidate("b", 0.5)], &t, false) else {
            panic!("expected final verdict");
        };
        assert_eq!(accept.chosen().map(|c| c.id.as_str()), Some("a"));
        assert_eq!(accept.confidence(), 0.91);
        assert_eq!(accept.reason(), "High confidence match (score: 0.91)");
        assert!(!accept.is_human_override());

        let Verdict::Final(reject) = classify(song(), vec![candidate("a", 0.42)], &t, false) else {
            panic!("expected final verdict");
        };
        assert!(reject.chosen().is_none());
        assert_eq!(reject.confidence(), 0.42);
        assert_eq!(reject.reason(), "Below rejection threshold (score: 0.42)");

        let Verdict::Final(skip) = classify(song(), vec![candidate("a", 0.75)], &t, false) else {
            panic!("expected final verdict");
        };
        assert_eq!(skip.reason(), "Uncertain match - requires manual review (score: 0.75)");
    }

    #[test]
    fn test_manual_accept_after_confirmation() {
        let cands = vec![candidate("a", 0.80), candidate("b", 0.70)];
        let mut reviewer = ScriptedReviewer::new(vec![ReviewAction::Select(1)], vec![true]);
        let d = resolve_interactively(song(), &cands, &mut reviewer).unwrap();
        assert_eq!(d.outcome(), Outcome::ManualAccept);
        assert_eq!(d.chosen().map(|c| c.id.as_str()), Some("b"));
        assert_eq!(d.confidence(), 0.70);
        assert_eq!(d.reason(), "Manually selected (option 2)");
        assert!(d.is_human_override());
    }

    #[test]
    fn test_declined_confirmation_returns_to_prompt() {
        let cands = vec![candidate("a", 0.80)];
        let mut reviewer = ScriptedReviewer::new(
            vec![ReviewAction::Select(0), ReviewAction::Reject],
            vec![false],
        );
        let d = resolve_interactively(song(), &cands, &mut reviewer).unwrap();
        assert_eq!(d.outcome(), Outcome::ManualReject);
        assert_eq!(d.confidence(), 0.0);
        assert_eq!(reviewer.prompts, 2);
    }

    #[test]
    fn test_preview_and_out_of_range_are_not_terminal() {
        let cands = vec![candidate("a", 0.80), candidate("b", 0.70)];
        let mut reviewer = ScriptedReviewer::new(
            vec![
                ReviewAction::Preview(1),
                ReviewAction::Select(7),
                ReviewAction::Preview(9),
                ReviewAction::Skip,
            ],
            vec![],
        );
        let d = resolve_interactively(song(), &cands, &mut reviewer).unwrap();
        assert_eq!(d.outcome(), Outcome::Skipped);
        assert_eq!(d.reason(), "Manually skipped");
        assert_eq!(d.confidence(), 0.80);
        assert_eq!(reviewer.previewed, vec!["b".to_string()]);
        assert_eq!(reviewer.prompts, 4);
    }

    #[test]
    fn test_only_top_five_are_selectable() {
        let cands: Vec<_> = (0..7).map(|i| candidate(&format!("c{}", i), 0.8 - i as f64 * 0.01)).collect();
        let mut reviewer = ScriptedReviewer::new(vec![ReviewAction::Select(6), ReviewAction::Select(4)], vec![true]);
        let d = resolve_interactively(song(), &cands, &mut reviewer).unwrap();
        assert_eq!(d.chosen().map(|c| c.id.as_str()), Some("c4"));
    }

    #[test]
    fn test_abort_propagates() {
        let cands = vec![candidate("a", 0.75)];
        let mut reviewer = ScriptedReviewer::new(vec![ReviewAction::Abort], vec![]);
        let result = decide(song(), cands, &defaults(), Some(&mut reviewer));
        assert_eq!(result.unwrap_err(), MatchError::HumanAbort);
    }

    #[test]
    fn test_decide_without_reviewer_skips_uncertain() {
        let d = decide(song(), vec![candidate("a", 0.75)], &defaults(), None).unwrap();
        assert_eq!(d.outcome(), Outcome::Skipped);
        assert!(!d.is_human_override());
    }

    #[test]
    fn test_decide_interactive_does_not_prompt_outside_band() {
        let mut reviewer = ScriptedReviewer::new(vec![ReviewAction::Abort], vec![]);
        let d = decide(song(), vec![candidate("a", 0.95)], &defaults(), Some(&mut reviewer)).unwrap();
        assert_eq!(d.outcome(), Outcome::AutoAccept);
        assert_eq!(reviewer.prompts, 0);
    }

    fn sample_decisions() -> Vec<Decision> {
        let t = defaults();
        let mut out = Vec::new();
        for score in [0.95, 0.90, 0.75, 0.30] {
            out.push(decide(song(), vec![candidate("x", score)], &t, None).unwrap());
        }
        out.push(decide(song(), vec![], &t, None).unwrap());
        out
    }

    #[test]
    fn test_summary_count_as_failure() {
        let s = summarize(&sample_decisions(), SkipPolicy::CountAsFailure);
        assert_eq!(s.total, 5);
        assert_eq!(s.auto_accept, 2);
        assert_eq!(s.skipped, 1);
        assert_eq!(s.auto_reject, 1);
        assert_eq!(s.no_candidates, 1);
        assert!((s.success_rate - 0.4).abs() < 1e-9);
        // NoCandidates has confidence 0 and is left out of the mean
        assert!((s.avg_confidence - (0.95 + 0.90 + 0.75 + 0.30) / 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_neutral_skip() {
        let s = summarize(&sample_decisions(), SkipPolicy::Neutral);
        assert_eq!(s.total, 5);
        assert!((s.success_rate - 0.5).abs() < 1e-9);
        assert_eq!(s.skip_policy, SkipPolicy::Neutral);
    }

    #[test]
    fn test_summary_empty_and_all_skipped() {
        let s = summarize(&[], SkipPolicy::CountAsFailure);
        assert_eq!(s.total, 0);
        assert_eq!(s.success_rate, 0.0);
        assert_eq!(s.avg_confidence, 0.0);

        let skipped = vec![decide(song(), vec![candidate("x", 0.7)], &defaults(), None).unwrap()];
        assert_eq!(summarize(&skipped, SkipPolicy::Neutral).success_rate, 0.0);
    }
}
