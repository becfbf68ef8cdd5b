//! Human review of uncertain matches.
//!
//! The decision engine talks to a `Reviewer`. Two implementations exist:
//! a terminal prompt for the CLI, and a channel pair for hosted sessions
//! where another thread (or a UI) answers. Cancellation is a disconnected
//! channel, so a pending prompt wakes up immediately on abort.

use std::io::{self, BufRead, Write};
use std::sync::Mutex;
use std::time::Duration;

use crossbeam_channel::{select, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, warn};

use crate::error::MatchError;
use crate::models::{CandidateRecord, SongReference};
use crate::scoring::match_quality;

/// Number of top candidates shown to the reviewer.
pub const MAX_PRESENTED: usize = 5;

/// One answer to the candidate prompt. Indices are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    /// Pick candidate `i` (still needs confirmation)
    Select(usize),
    Skip,
    /// No good match
    Reject,
    /// Show details of candidate `i`, then ask again
    Preview(usize),
    /// Stop the whole batch
    Abort,
}

pub trait Reviewer {
    /// Shows up to `MAX_PRESENTED` candidates and returns the answer.
    fn choose(&mut self, song: &SongReference, candidates: &[CandidateRecord]) -> ReviewAction;

    /// Confirmation sub-step of a selection. `Err(HumanAbort)` when the
    /// reviewer went away.
    fn confirm(&mut self, song: &SongReference, candidate: &CandidateRecord) -> Result<bool, MatchError>;

    fn preview(&mut self, candidate: &CandidateRecord);
}

// ============================================================================
// Cancellation
// ============================================================================

/// Observes cancellation. Cancelled once the paired trigger fires or is dropped.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: Receiver<()>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self {
            rx: crossbeam_channel::never(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

/// Fires the paired `CancelSignal` by disconnecting the channel.
#[derive(Debug)]
pub struct CancelTrigger {
    tx: Mutex<Option<Sender<()>>>,
}

impl CancelTrigger {
    pub fn cancel(&self) {
        let mut tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        if tx.take().is_some() {
            debug!("cancellation requested");
        }
    }
}

pub fn cancel_pair() -> (CancelTrigger, CancelSignal) {
    let (tx, rx) = crossbeam_channel::bounded(0);
    (CancelTrigger { tx: Mutex::new(Some(tx)) }, CancelSignal { rx })
}

// ============================================================================
// Channel Reviewer
// ============================================================================

/// Prompt sent from the engine to whoever holds the `ReviewHandle`.
#[derive(Debug, Clone)]
pub enum ReviewRequest {
    Choose {
        song: SongReference,
        candidates: Vec<CandidateRecord>,
    },
    Confirm {
        song: SongReference,
        candidate: CandidateRecord,
    },
    /// Informational, no reply expected
    Preview { candidate: CandidateRecord },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewReply {
    Action(ReviewAction),
    Confirmed(bool),
}

/// Engine side of a review channel.
pub struct ChannelReviewer {
    requests: Sender<ReviewRequest>,
    replies: Receiver<ReviewReply>,
    cancel: CancelSignal,
}

/// Answering side of a review channel.
#[derive(Clone)]
pub struct ReviewHandle {
    requests: Receiver<ReviewRequest>,
    replies: Sender<ReviewReply>,
}

pub fn review_channel(cancel: CancelSignal) -> (ChannelReviewer, ReviewHandle) {
    let (req_tx, req_rx) = unbounded();
    let (reply_tx, reply_rx) = unbounded();
    (
        ChannelReviewer {
            requests: req_tx,
            replies: reply_rx,
            cancel,
        },
        ReviewHandle {
            requests: req_rx,
            replies: reply_tx,
        },
    )
}

impl ChannelReviewer {
    /// Sends a prompt and blocks until a reply, a cancel, or a dropped handle.
    fn ask(&self, request: ReviewRequest) -> Option<ReviewReply> {
        if self.requests.send(request).is_err() {
            return None;
        }
        select! {
            recv(self.replies) -> reply => reply.ok(),
            recv(self.cancel.receiver()) -> _ => None,
        }
    }
}

impl Reviewer for ChannelReviewer {
    fn choose(&mut self, song: &SongReference, candidates: &[CandidateRecord]) -> ReviewAction {
        let request = ReviewRequest::Choose {
            song: song.clone(),
            candidates: candidates.iter().take(MAX_PRESENTED).cloned().collect(),
        };
        loop {
            match self.ask(request.clone()) {
                Some(ReviewReply::Action(action)) => return action,
                Some(ReviewReply::Confirmed(_)) => {
                    warn!("ignoring confirmation sent to a choose prompt");
                }
                None => return ReviewAction::Abort,
            }
        }
    }

    fn confirm(&mut self, song: &SongReference, candidate: &CandidateRecord) -> Result<bool, MatchError> {
        let request = ReviewRequest::Confirm {
            song: song.clone(),
            candidate: candidate.clone(),
        };
        loop {
            match self.ask(request.clone()) {
                Some(ReviewReply::Confirmed(yes)) => return Ok(yes),
                Some(ReviewReply::Action(ReviewAction::Abort)) | None => {
                    return Err(MatchError::HumanAbort)
                }
                Some(ReviewReply::Action(other)) => {
                    warn!(?other, "ignoring action sent to a confirm prompt");
                }
            }
        }
    }

    fn preview(&mut self, candidate: &CandidateRecord) {
        let _ = self.requests.send(ReviewRequest::Preview {
            candidate: candidate.clone(),
        });
    }
}

impl ReviewHandle {
    /// Blocks for the next prompt. `None` once the engine is gone.
    pub fn next_request(&self) -> Option<ReviewRequest> {
        self.requests.recv().ok()
    }

    pub fn next_request_timeout(&self, timeout: Duration) -> Result<ReviewRequest, RecvTimeoutError> {
        self.requests.recv_timeout(timeout)
    }

    /// Returns false when the engine no longer listens.
    pub fn act(&self, action: ReviewAction) -> bool {
        self.replies.send(ReviewReply::Action(action)).is_ok()
    }

    pub fn confirm(&self, yes: bool) -> bool {
        self.replies.send(ReviewReply::Confirmed(yes)).is_ok()
    }
}

// ============================================================================
// Terminal Reviewer
// ============================================================================

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Line-oriented prompt. Empty input picks the default (skip, or yes when
/// confirming). Numbers shown to the user are 1-based.
pub struct TerminalReviewer<R, W> {
    input: R,
    output: W,
}

impl TerminalReviewer<io::StdinLock<'static>, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> TerminalReviewer<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// `None` when the input is unusable. EOF reads as an empty answer;
    /// undecodable lines are refused and asked again.
    fn ask(&mut self, prompt: &str, default: &str) -> Option<String> {
        loop {
            if default.is_empty() {
                let _ = write!(self.output, "{}: ", prompt);
            } else {
                let _ = write!(self.output, "{} [{}]: ", prompt, default);
            }
            let _ = self.output.flush();
            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(_) => {
                    let answer = line.trim().to_lowercase();
                    return Some(if answer.is_empty() { default.to_string() } else { answer });
                }
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    let _ = writeln!(self.output, "Invalid input.");
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(error = %e, "failed to read reviewer input");
                    return None;
                }
            }
        }
    }

    fn show_candidates(&mut self, song: &SongReference, candidates: &[CandidateRecord]) {
        let out = &mut self.output;
        let _ = writeln!(out, "\nMatching: {} by {}", song.title, song.artist);
        if let Some(album) = &song.album {
            let _ = writeln!(out, "   Album: {}", album);
        }
        let _ = writeln!(
            out,
            "{:>3}  {:<28} {:<23} {:<23} {:>5}  {}",
            "#", "Title", "Artist", "Album", "Score", "Quality"
        );
        for (i, c) in candidates.iter().enumerate() {
            let _ = writeln!(
                out,
                "{:>3}  {:<28} {:<23} {:<23} {:>5.2}  {}",
                i + 1,
                truncate(&c.title, 25),
                truncate(&c.artist, 20),
                truncate(c.album.as_deref().unwrap_or(""), 20),
                c.scores.composite,
                match_quality(c.scores.composite).label()
            );
        }
    }

    fn show_options(&mut self, count: usize) {
        let _ = writeln!(
            self.output,
            "\nOptions:\n  1-{}: Select a candidate\n  s: Skip this song\n  r: Reject (no good match)\n  p: Preview candidate\n  q: Quit",
            count
        );
    }

    fn parse_index(answer: &str, count: usize) -> Option<usize> {
        answer
            .parse::<usize>()
            .ok()
            .filter(|n| (1..=count).contains(n))
            .map(|n| n - 1)
    }
}

impl<R: BufRead, W: Write> Reviewer for TerminalReviewer<R, W> {
    fn choose(&mut self, song: &SongReference, candidates: &[CandidateRecord]) -> ReviewAction {
        let shown = &candidates[..candidates.len().min(MAX_PRESENTED)];
        self.show_candidates(song, shown);

        loop {
            self.show_options(shown.len());
            let Some(answer) = self.ask("Your choice", "s") else {
                return ReviewAction::Abort;
            };
            match answer.as_str() {
                "q" => return ReviewAction::Abort,
                "s" => return ReviewAction::Skip,
                "r" => return ReviewAction::Reject,
                "p" => {
                    let prompt = format!("Which candidate to preview? (1-{} or 'b' to go back)", shown.len());
                    let Some(which) = self.ask(&prompt, "b") else {
                        return ReviewAction::Abort;
                    };
                    if which == "b" {
                        continue;
                    }
                    match Self::parse_index(&which, shown.len()) {
                        Some(i) => return ReviewAction::Preview(i),
                        None => {
                            let _ = writeln!(self.output, "Invalid selection.");
                        }
                    }
                }
                other => match Self::parse_index(other, shown.len()) {
                    Some(i) => return ReviewAction::Select(i),
                    None => {
                        let _ = writeln!(
                            self.output,
                            "Invalid input. Please choose a number 1-{} or use s/r/p/q.",
                            shown.len()
                        );
                    }
                },
            }
        }
    }

    fn confirm(&mut self, _song: &SongReference, candidate: &CandidateRecord) -> Result<bool, MatchError> {
        let prompt = format!(
            "Confirm selection: {} by {} ({} match)? (y/n)",
            candidate.title,
            candidate.artist,
            match_quality(candidate.scores.composite).label()
        );
        match self.ask(&prompt, "y") {
            Some(answer) => Ok(matches!(answer.as_str(), "y" | "yes")),
            None => Err(MatchError::HumanAbort),
        }
    }

    fn preview(&mut self, candidate: &CandidateRecord) {
        let out = &mut self.output;
        let _ = writeln!(out, "\nPreview: {} by {}", candidate.title, candidate.artist);
        if let Some(album) = &candidate.album {
            let _ = writeln!(out, "Album: {}", album);
        }
        if candidate.duration_ms > 0 {
            let _ = writeln!(out, "Duration: {}", candidate.duration_label());
        }
        match &candidate.external_url {
            Some(url) => {
                let _ = writeln!(out, "Catalog URL: {}", url);
            }
            None => {
                let _ = writeln!(out, "Catalog URL: (none)");
            }
        }
        match &candidate.preview_url {
            Some(url) => {
                let _ = writeln!(out, "Preview URL: {}", url);
            }
            None => {
                let _ = writeln!(out, "No preview available");
            }
        }
        let _ = writeln!(out, "Copy the URL to your browser to listen\n");
        let _ = self.ask("Press Enter to continue", "");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::thread;

    fn candidates(n: usize) -> Vec<CandidateRecord> {
        (0..n)
            .map(|i| CandidateRecord::new(format!("id{}", i), format!("Song {}", i), &["Artist"], None, 50))
            .collect()
    }

    fn terminal(script: &str) -> TerminalReviewer<Cursor<Vec<u8>>, Vec<u8>> {
        TerminalReviewer::new(Cursor::new(script.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn test_terminal_choose_actions() {
        let song = SongReference::simple("Song", "Artist");
        let cands = candidates(3);
        assert_eq!(terminal("2\n").choose(&song, &cands), ReviewAction::Select(1));
        assert_eq!(terminal("\n").choose(&song, &cands), ReviewAction::Skip);
        assert_eq!(terminal("R\n").choose(&song, &cands), ReviewAction::Reject);
        assert_eq!(terminal("q\n").choose(&song, &cands), ReviewAction::Abort);
        assert_eq!(terminal("p\n3\n").choose(&song, &cands), ReviewAction::Preview(2));
    }

    #[test]
    fn test_terminal_reprompts_on_invalid_input() {
        let song = SongReference::simple("Song", "Artist");
        let cands = candidates(2);
        // 3 is out of range, "x" is garbage, then "p" "b" goes back
        let mut reviewer = terminal("3\nx\np\nb\n1\n");
        assert_eq!(reviewer.choose(&song, &cands), ReviewAction::Select(0));
        let out = String::from_utf8(reviewer.output).unwrap();
        assert!(out.contains("Invalid input"));
        assert!(out.contains("Song 1"));
    }

    #[test]
    fn test_terminal_only_offers_top_five() {
        let song = SongReference::simple("Song", "Artist");
        let cands = candidates(8);
        assert_eq!(terminal("6\n5\n").choose(&song, &cands), ReviewAction::Select(4));
    }

    #[test]
    fn test_terminal_confirm_defaults_to_yes() {
        let song = SongReference::simple("Song", "Artist");
        let c = &candidates(1)[0];
        assert_eq!(terminal("\n").confirm(&song, c), Ok(true));
        assert_eq!(terminal("n\n").confirm(&song, c), Ok(false));
    }

    #[test]
    fn test_terminal_undecodable_line_asks_again() {
        let song = SongReference::simple("Song", "Artist");
        let cands = candidates(2);
        let script = vec![0xff, 0xfe, b'\n', b's', b'\n'];
        let mut reviewer = TerminalReviewer::new(Cursor::new(script), Vec::new());
        assert_eq!(reviewer.choose(&song, &cands), ReviewAction::Skip);
        let out = String::from_utf8(reviewer.output).unwrap();
        assert!(out.contains("Invalid input."));

        let script = vec![0xc3, 0x28, b'\n', b'n', b'\n'];
        let mut reviewer = TerminalReviewer::new(Cursor::new(script), Vec::new());
        assert_eq!(reviewer.confirm(&song, &cands[0]), Ok(false));
    }

    #[test]
    fn test_terminal_eof_picks_default() {
        let song = SongReference::simple("Song", "Artist");
        let cands = candidates(2);
        assert_eq!(terminal("").choose(&song, &cands), ReviewAction::Skip);
        assert_eq!(terminal("").confirm(&song, &cands[0]), Ok(true));
    }

    #[test]
    fn test_terminal_preview_details() {
        let mut c = CandidateRecord::new("x", "Song", &["Artist"], Some("Album"), 10);
        c.duration_ms = 354_000;
        c.preview_url = Some("https://p.example/x".to_string());
        let mut reviewer = terminal("\n");
        reviewer.preview(&c);
        let out = String::from_utf8(reviewer.output).unwrap();
        assert!(out.contains("Duration: 5:54"));
        assert!(out.contains("Album: Album"));
        assert!(out.contains("Preview URL: https://p.example/x"));
        assert!(out.contains("Catalog URL: (none)"));
    }

    #[test]
    fn test_cancel_pair() {
        let (trigger, signal) = cancel_pair();
        assert!(!signal.is_cancelled());
        trigger.cancel();
        assert!(signal.is_cancelled());
        trigger.cancel();
        assert!(!CancelSignal::never().is_cancelled());
    }

    #[test]
    fn test_channel_round_trip() {
        let (mut reviewer, handle) = review_channel(CancelSignal::never());
        let song = SongReference::simple("Song", "Artist");
        let cands = candidates(7);

        let answerer = thread::spawn(move || {
            match handle.next_request() {
                Some(ReviewRequest::Choose { candidates, .. }) => {
                    assert_eq!(candidates.len(), MAX_PRESENTED);
                    handle.act(ReviewAction::Select(0));
                }
                other => panic!("unexpected request {:?}", other),
            }
            match handle.next_request() {
                Some(ReviewRequest::Confirm { candidate, .. }) => {
                    assert_eq!(candidate.id, "id0");
                    handle.confirm(true);
                }
                other => panic!("unexpected request {:?}", other),
            }
        });

        assert_eq!(reviewer.choose(&song, &cands), ReviewAction::Select(0));
        assert_eq!(reviewer.confirm(&song, &cands[0]), Ok(true));
        answerer.join().unwrap();
    }

    #[test]
    fn test_channel_cancel_wakes_pending_prompt() {
        let (trigger, signal) = cancel_pair();
        let (mut reviewer, handle) = review_channel(signal);
        let song = SongReference::simple("Song", "Artist");
        let cands = candidates(2);

        let canceller = thread::spawn(move || {
            // Wait until the prompt is actually pending, then cancel
            let request = handle.next_request();
            assert!(matches!(request, Some(ReviewRequest::Choose { .. })));
            trigger.cancel();
            handle
        });

        assert_eq!(reviewer.choose(&song, &cands), ReviewAction::Abort);
        let _handle = canceller.join().unwrap();
    }

    #[test]
    fn test_channel_dropped_handle_is_abort() {
        let (mut reviewer, handle) = review_channel(CancelSignal::never());
        drop(handle);
        let song = SongReference::simple("Song", "Artist");
        let cands = candidates(1);
        assert_eq!(reviewer.choose(&song, &cands), ReviewAction::Abort);
        assert_eq!(reviewer.confirm(&song, &cands[0]), Err(MatchError::HumanAbort));
    }
}
