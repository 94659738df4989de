//! Fetch coordination: one refresh in flight, non-forced refreshes throttled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::board::Board;
use crate::clock::Clock;
use crate::normalize::normalize_rows;
use crate::record::{ParticipantRecord, Submission};
use crate::scheduler::SchedulerEvent;
use crate::source::{parse_payload, DataSource, SourceError};

pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(1500);

#[derive(Debug)]
pub struct Refreshed {
    pub records: Vec<ParticipantRecord>,
    pub event: SchedulerEvent,
}

pub struct FetchCoordinator<S, C> {
    source: S,
    clock: C,
    throttle: Duration,
    in_flight: AtomicBool,
    last_attempt: StdMutex<Option<Instant>>,
}

/// Marks a refresh in flight until dropped.
pub struct FetchPermit<'a> {
    in_flight: &'a AtomicBool,
}

impl Drop for FetchPermit<'_> {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

impl<S: DataSource, C: Clock> FetchCoordinator<S, C> {
    pub fn new(source: S, clock: C, throttle: Duration) -> Self {
        Self {
            source,
            clock,
            throttle,
            in_flight: AtomicBool::new(false),
            last_attempt: StdMutex::new(None),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Claims the single refresh slot. `None` while another refresh runs, or
    /// for a non-forced call inside the throttle interval of the last attempt.
    pub fn try_begin(&self, force: bool) -> Option<FetchPermit<'_>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(force, "refresh skipped; another is in flight");
            return None;
        }
        let permit = FetchPermit {
            in_flight: &self.in_flight,
        };

        let now = self.clock.now();
        let mut last_attempt = self
            .last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !force {
            if let Some(last) = *last_attempt {
                if now.saturating_duration_since(last) < self.throttle {
                    debug!("refresh throttled");
                    return None;
                }
            }
        }
        *last_attempt = Some(now);
        Some(permit)
    }

    /// Fetches, normalizes, ranks for the board's active category and submits
    /// the result to the scheduler. Failures leave the board untouched and are
    /// only logged.
    pub async fn refresh<K: Clock>(&self, force: bool, board: &Mutex<Board<K>>) -> Option<Refreshed> {
        let _permit = self.try_begin(force)?;

        let rows = match self.source.fetch(force).await.and_then(parse_payload) {
            Ok(rows) => rows,
            Err(err) => {
                warn!(kind = err.kind(), %err, force, "leaderboard refresh failed");
                return None;
            }
        };
        let records = normalize_rows(&rows);

        let event = board.lock().await.ingest(records.clone());
        info!(rows = records.len(), force, "leaderboard refreshed");
        Some(Refreshed { records, event })
    }

    pub async fn submit(&self, submission: &Submission) -> Result<(), SourceError> {
        self.source.submit(submission).await
    }
}
