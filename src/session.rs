//! Hosted matching sessions.
//!
//! A session runs one batch on its own thread with its own songs, counters
//! and pending prompt. Nothing is shared between sessions except the catalog
//! passed in (wrap it in a `SharedCatalog` to serialize and throttle it).
//! There is no registry: whoever holds the `SessionHandle` owns the session,
//! and dropping the handle cancels it.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::anyhow;
use crossbeam_channel::{unbounded, Receiver};
use tracing::{info, info_span};

use crate::catalog::Catalog;
use crate::config::MatchConfig;
use crate::models::{Decision, SongReference, Summary};
use crate::pipeline::{BatchReport, Matcher};
use crate::review::{cancel_pair, review_channel, CancelTrigger, ReviewHandle};

/// Progress notifications from a running session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// `index` counts decisions made so far in this session, from 0
    Decided { index: usize, decision: Decision },
    Finished { aborted: bool, summary: Summary },
}

pub struct SessionHandle {
    label: String,
    events: Receiver<SessionEvent>,
    review: ReviewHandle,
    cancel: CancelTrigger,
    worker: JoinHandle<BatchReport>,
}

/// Starts a session thread. Uncertain matches are sent to `review()` when
/// the configuration is interactive, and skipped otherwise.
pub fn start(
    label: impl Into<String>,
    songs: Vec<SongReference>,
    catalog: Arc<dyn Catalog>,
    config: MatchConfig,
) -> io::Result<SessionHandle> {
    let label = label.into();
    let (cancel, signal) = cancel_pair();
    let (mut reviewer, review) = review_channel(signal.clone());
    let (events_tx, events) = unbounded();

    let thread_label = label.clone();
    let worker = thread::Builder::new()
        .name(format!("session-{}", label))
        .spawn(move || {
            let _span = info_span!("session", label = %thread_label).entered();
            info!(songs = songs.len(), "session started");

            let matcher = Matcher::new(catalog, config);
            let mut index = 0;
            let report = matcher.run_batch(&songs, None, Some(&mut reviewer), &signal, |decision| {
                let _ = events_tx.send(SessionEvent::Decided {
                    index,
                    decision: decision.clone(),
                });
                index += 1;
            });

            let _ = events_tx.send(SessionEvent::Finished {
                aborted: report.aborted,
                summary: report.summary.clone(),
            });
            info!(decisions = report.decisions.len(), aborted = report.aborted, "session finished");
            report
        })?;

    Ok(SessionHandle {
        label,
        events,
        review,
        cancel,
        worker,
    })
}

impl SessionHandle {
    /// Decisions as they are made, then one `Finished`.
    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    /// Answering side of the session's review prompts. Clone it to answer
    /// from another thread.
    pub fn review(&self) -> &ReviewHandle {
        &self.review
    }

    /// Cancels the session. A pending prompt resolves as an abort and no
    /// further songs are processed.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// Waits for the session to end. This handle's review side is dropped
    /// first, so prompts nobody else answers resolve as aborts.
    pub fn join(self) -> anyhow::Result<BatchReport> {
        let SessionHandle {
            label,
            review,
            cancel,
            worker,
            ..
        } = self;
        drop(review);
        let report = worker
            .join()
            .map_err(|_| anyhow!("session '{}' panicked", label));
        drop(cancel);
        report
    }
}
