//! Event deduplication.
//!
//! Every poll returns the whole task state, so the same milestone is
//! observed many times. Two rules decide whether a candidate event is new:
//! 1. Its id (derived from task id + milestone) has never been admitted.
//! 2. No event with the same content, kind and step was admitted within the
//!    trailing window.
//!
//! Decisions are final: an admitted event is never retracted and a
//! suppressed one is never reconsidered.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

use crate::event::{Event, EventKind};
use crate::task::StepId;

/// Default trailing window for the content guard.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    content: String,
    kind: EventKind,
    step_id: Option<StepId>,
}

impl Fingerprint {
    fn of(event: &Event) -> Self {
        Self {
            content: event.content.clone(),
            kind: event.kind,
            step_id: event.step_id.clone(),
        }
    }
}

/// Why a candidate event was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppressed {
    DuplicateId,
    RecentContent,
}

/// Registry of decided events for one task session.
#[derive(Debug)]
pub struct EventDeduplicator {
    /// Every id ever offered, admitted or suppressed.
    seen_ids: HashSet<String>,
    recent: VecDeque<(Fingerprint, Instant)>,
    window: Duration,
}

impl EventDeduplicator {
    pub fn new(window: Duration) -> Self {
        Self {
            seen_ids: HashSet::new(),
            recent: VecDeque::new(),
            window,
        }
    }

    /// Check a candidate. Its id is claimed either way, so the same id is
    /// refused on every later call.
    pub fn admit(&mut self, event: &Event, now: Instant) -> Result<(), Suppressed> {
        if !self.seen_ids.insert(event.id.clone()) {
            return Err(Suppressed::DuplicateId);
        }

        self.prune(now);
        let fingerprint = Fingerprint::of(event);
        if self.recent.iter().any(|(seen, _)| *seen == fingerprint) {
            tracing::debug!(
                "Suppressing event {} ({}): same content emitted within {:?}",
                event.id,
                event.kind,
                self.window
            );
            return Err(Suppressed::RecentContent);
        }

        self.recent.push_back((fingerprint, now));
        Ok(())
    }

    /// Whether an event with this id has been decided.
    pub fn has_seen(&self, id: &str) -> bool {
        self.seen_ids.contains(id)
    }

    fn prune(&mut self, now: Instant) {
        while let Some((_, at)) = self.recent.front() {
            if now.saturating_duration_since(*at) >= self.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for EventDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}
