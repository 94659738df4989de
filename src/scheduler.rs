//! Snapshot gate and apply scheduler.
//!
//! Decides when a freshly computed ranking reaches the display. While the view
//! is closed updates are parked; during the settle window after opening they
//! are held behind a timer; once stable they apply directly. Every submission
//! takes a new version and a timer only applies the version it was armed for,
//! so overlapping fetches can never apply out of order.
//!
//! The scheduler never sleeps. It hands out [`TimerRequest`]s and the host
//! calls [`ApplyScheduler::fire_timer`] when one elapses.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use tracing::debug;

use crate::clock::Clock;
use crate::delta::{compute_deltas, plan_transitions, DeltaMap, RankSnapshot, TransitionItem};
use crate::identity::IdentitySignature;
use crate::ranker::RankedEntry;
use crate::record::Category;

pub const DEFAULT_SETTLE: Duration = Duration::from_millis(1200);
pub const DEFAULT_PRE_SUBMIT_WINDOW: Duration = Duration::from_millis(3000);
pub const DEFAULT_HINT_DURATION: Duration = Duration::from_millis(8500);

#[derive(Clone, Debug)]
pub struct SchedulerSettings {
    pub settle: Duration,
    pub pre_submit_window: Duration,
    /// Show the pre-submission snapshot on open even when it is older than
    /// `pre_submit_window`.
    pub prefer_pre_submit_on_open: bool,
    pub hint_duration: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            settle: DEFAULT_SETTLE,
            pre_submit_window: DEFAULT_PRE_SUBMIT_WINDOW,
            prefer_pre_submit_on_open: true,
            hint_duration: DEFAULT_HINT_DURATION,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewPhase {
    Closed,
    OpenSettling,
    OpenStable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyMode {
    /// Subject to the settle window.
    Gated,
    /// Apply now if the view is open, whatever the phase.
    Immediate,
}

#[derive(Clone, Debug)]
pub struct RankingUpdate {
    pub category: Category,
    pub entries: Vec<RankedEntry>,
    pub spotlight: Option<IdentitySignature>,
    /// Discard the pre-submission snapshot once this update is shown.
    pub clear_pre_submit: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingApply {
    pub entries: Vec<RankedEntry>,
    pub spotlight: Option<IdentitySignature>,
    pub version: u64,
    pub clear_pre_submit: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub category: Category,
    pub version: u64,
    arm: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimerRequest {
    pub token: TimerToken,
    pub delay: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionPlan {
    pub version: u64,
    pub category: Category,
    pub entries: Vec<RankedEntry>,
    pub deltas: DeltaMap,
    pub transitions: Vec<TransitionItem>,
    pub spotlight: Option<IdentitySignature>,
    #[serde(rename = "hintDurationMs", serialize_with = "as_millis")]
    pub hint_duration: Duration,
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchedulerEvent {
    Applied(TransitionPlan),
    Queued { category: Category, version: u64 },
    Deferred(TimerRequest),
}

#[derive(Clone, Debug)]
pub(crate) struct PreSubmitSnapshot {
    captured_at: Instant,
    rankings: HashMap<Category, Vec<RankedEntry>>,
}

pub struct ApplyScheduler<C: Clock> {
    clock: C,
    settings: SchedulerSettings,
    opened_at: Option<Instant>,
    version: u64,
    arms: u64,
    pending: HashMap<Category, PendingApply>,
    armed: HashMap<Category, TimerToken>,
    snapshots: HashMap<Category, RankSnapshot>,
    displayed: HashMap<Category, Vec<RankedEntry>>,
    pre_submit: Option<PreSubmitSnapshot>,
    hint_owner: Option<u64>,
}

impl<C: Clock> ApplyScheduler<C> {
    pub fn new(settings: SchedulerSettings, clock: C) -> Self {
        Self {
            clock,
            settings,
            opened_at: None,
            version: 0,
            arms: 0,
            pending: HashMap::new(),
            armed: HashMap::new(),
            snapshots: HashMap::new(),
            displayed: HashMap::new(),
            pre_submit: None,
            hint_owner: None,
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn phase(&self) -> ViewPhase {
        match self.opened_at {
            None => ViewPhase::Closed,
            Some(opened_at) => {
                if self.clock.now().saturating_duration_since(opened_at) < self.settings.settle {
                    ViewPhase::OpenSettling
                } else {
                    ViewPhase::OpenStable
                }
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.opened_at.is_some()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn pending(&self, category: &Category) -> Option<&PendingApply> {
        self.pending.get(category)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn snapshot(&self, category: &Category) -> Option<&RankSnapshot> {
        self.snapshots.get(category)
    }

    pub fn displayed(&self, category: &Category) -> &[RankedEntry] {
        self.displayed
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn armed_timer(&self, category: &Category) -> Option<&TimerToken> {
        self.armed.get(category)
    }

    pub fn has_pre_submit(&self) -> bool {
        self.pre_submit.is_some()
    }

    /// Remembers what the board looked like right before a submission so the
    /// next open can show it first.
    pub fn capture_pre_submit(&mut self, rankings: HashMap<Category, Vec<RankedEntry>>) {
        self.pre_submit = Some(PreSubmitSnapshot {
            captured_at: self.clock.now(),
            rankings,
        });
    }

    pub(crate) fn take_pre_submit(&mut self) -> Option<PreSubmitSnapshot> {
        self.pre_submit.take()
    }

    pub(crate) fn restore_pre_submit(&mut self, snapshot: Option<PreSubmitSnapshot>) {
        self.pre_submit = snapshot;
    }

    /// Opens the view on `category`. An eligible pre-submission ranking is
    /// shown at once; a ranking parked while closed is then re-submitted under
    /// the settle gate. Opening an open view does nothing.
    pub fn open(&mut self, category: &Category) -> Vec<SchedulerEvent> {
        if self.opened_at.is_some() {
            return Vec::new();
        }
        let now = self.clock.now();
        self.opened_at = Some(now);

        let mut events = Vec::new();
        let carried = self.pending.remove(category);

        if let Some(entries) = self.pre_submit_ranking(category, now) {
            let version = self.next_version();
            let plan = self.apply(
                category,
                PendingApply {
                    entries,
                    spotlight: None,
                    version,
                    clear_pre_submit: false,
                },
            );
            events.push(SchedulerEvent::Applied(plan));
        }

        if let Some(carried) = carried {
            events.push(self.submit_ranking(
                RankingUpdate {
                    category: category.clone(),
                    entries: carried.entries,
                    spotlight: carried.spotlight,
                    clear_pre_submit: carried.clear_pre_submit,
                },
                ApplyMode::Gated,
            ));
        }
        events
    }

    /// Cancels armed timers. Parked rankings are kept for the next open.
    pub fn close(&mut self) {
        self.opened_at = None;
        self.armed.clear();
    }

    pub fn submit_ranking(&mut self, update: RankingUpdate, mode: ApplyMode) -> SchedulerEvent {
        let version = self.next_version();
        let category = update.category;
        // A newer ranking makes timers armed for other categories stale. Their
        // payloads stay parked for the next open.
        self.armed.retain(|armed, _| *armed == category);
        let pending = PendingApply {
            entries: update.entries,
            spotlight: update.spotlight,
            version,
            clear_pre_submit: update.clear_pre_submit,
        };

        let opened_at = match self.opened_at {
            Some(opened_at) => opened_at,
            None => {
                self.pending.insert(category.clone(), pending);
                return SchedulerEvent::Queued { category, version };
            }
        };

        let elapsed = self.clock.now().saturating_duration_since(opened_at);
        if mode == ApplyMode::Gated && elapsed < self.settings.settle {
            self.arms += 1;
            let token = TimerToken {
                category: category.clone(),
                version,
                arm: self.arms,
            };
            self.pending.insert(category.clone(), pending);
            self.armed.insert(category, token.clone());
            return SchedulerEvent::Deferred(TimerRequest {
                token,
                delay: self.settings.settle - elapsed,
            });
        }

        SchedulerEvent::Applied(self.apply(&category, pending))
    }

    /// Applies the parked ranking the timer was armed for. Returns `None` when
    /// the view closed, the timer was re-armed, or a newer ranking superseded it.
    pub fn fire_timer(&mut self, token: &TimerToken) -> Option<TransitionPlan> {
        if self.opened_at.is_none() {
            debug!(version = token.version, "apply timer fired while closed");
            return None;
        }
        if self.armed.get(&token.category) != Some(token) {
            debug!(version = token.version, "apply timer cancelled or re-armed");
            return None;
        }
        let current = self.pending.get(&token.category)?.version;
        if current != token.version {
            debug!(version = token.version, current, "apply timer superseded");
            return None;
        }
        let pending = self.pending.remove(&token.category)?;
        Some(self.apply(&token.category, pending))
    }

    /// True when `version` still owns the visible rank hints; they are then
    /// considered hidden.
    pub fn expire_hints(&mut self, version: u64) -> bool {
        if self.hint_owner == Some(version) {
            self.hint_owner = None;
            true
        } else {
            false
        }
    }

    fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    fn pre_submit_ranking(&self, category: &Category, now: Instant) -> Option<Vec<RankedEntry>> {
        let snapshot = self.pre_submit.as_ref()?;
        let recent =
            now.saturating_duration_since(snapshot.captured_at) < self.settings.pre_submit_window;
        if !(recent || self.settings.prefer_pre_submit_on_open) {
            return None;
        }
        snapshot
            .rankings
            .get(category)
            .filter(|entries| !entries.is_empty())
            .cloned()
    }

    // The only place snapshot and displayed state change.
    fn apply(&mut self, category: &Category, pending: PendingApply) -> TransitionPlan {
        let deltas = match self.snapshots.get(category) {
            Some(previous) => compute_deltas(&pending.entries, previous),
            None => compute_deltas(&pending.entries, &RankSnapshot::default()),
        };
        let previous_entries = self.displayed.remove(category).unwrap_or_default();
        let transitions = plan_transitions(&previous_entries, &pending.entries);

        self.snapshots
            .insert(category.clone(), RankSnapshot::from_entries(&pending.entries));
        self.displayed
            .insert(category.clone(), pending.entries.clone());
        self.pending.remove(category);
        self.armed.remove(category);
        if pending.clear_pre_submit {
            self.pre_submit = None;
        }
        self.hint_owner = Some(pending.version);

        TransitionPlan {
            version: pending.version,
            category: category.clone(),
            entries: pending.entries,
            deltas,
            transitions,
            spotlight: pending.spotlight,
            hint_duration: self.settings.hint_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::delta::Direction;
    use crate::identity::DisplayKeyRegistry;
    use crate::ranker::Ranker;
    use crate::record::ParticipantRecord;

    const SETTLE: Duration = Duration::from_millis(1200);

    fn scheduler(clock: &ManualClock) -> ApplyScheduler<ManualClock> {
        ApplyScheduler::new(SchedulerSettings::default(), clock.clone())
    }

    fn entries(registry: &mut DisplayKeyRegistry, scores: &[(&str, i64)]) -> Vec<RankedEntry> {
        let records: Vec<ParticipantRecord> = scores
            .iter()
            .map(|(name, score)| ParticipantRecord::new(name, "", *score, Some(Category::Men)))
            .collect();
        Ranker::default().rank(&records, &Category::Men, registry)
    }

    fn update(entries: Vec<RankedEntry>) -> RankingUpdate {
        RankingUpdate {
            category: Category::Men,
            entries,
            spotlight: None,
            clear_pre_submit: true,
        }
    }

    fn deferred(event: SchedulerEvent) -> TimerRequest {
        match event {
            SchedulerEvent::Deferred(request) => request,
            other => panic!("expected deferred, got {other:?}"),
        }
    }

    fn applied(event: SchedulerEvent) -> TransitionPlan {
        match event {
            SchedulerEvent::Applied(plan) => plan,
            other => panic!("expected applied, got {other:?}"),
        }
    }

    #[test]
    fn settle_window_is_a_pure_time_transition() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        assert_eq!(scheduler.phase(), ViewPhase::Closed);

        assert!(scheduler.open(&Category::Men).is_empty());
        assert_eq!(scheduler.phase(), ViewPhase::OpenSettling);

        clock.advance(SETTLE);
        assert_eq!(scheduler.phase(), ViewPhase::OpenStable);

        scheduler.close();
        assert_eq!(scheduler.phase(), ViewPhase::Closed);
    }

    #[test]
    fn only_the_latest_submission_in_the_window_applies() {
        let clock = ManualClock::new();
        let mut registry = DisplayKeyRegistry::new();
        let mut scheduler = scheduler(&clock);
        scheduler.open(&Category::Men);

        let v1 = entries(&mut registry, &[("a", 3)]);
        let v2 = entries(&mut registry, &[("a", 3), ("b", 9)]);

        let first = deferred(scheduler.submit_ranking(update(v1), ApplyMode::Gated));
        clock.advance(Duration::from_millis(400));
        let second = deferred(scheduler.submit_ranking(update(v2.clone()), ApplyMode::Gated));
        assert!(second.token.version > first.token.version);
        assert_eq!(second.delay, Duration::from_millis(800));

        clock.advance(Duration::from_millis(800));
        assert!(scheduler.fire_timer(&first.token).is_none());
        assert!(scheduler.snapshot(&Category::Men).is_none());

        let plan = scheduler.fire_timer(&second.token).expect("latest applies");
        assert_eq!(plan.version, second.token.version);
        assert_eq!(plan.entries, v2);
        assert_eq!(scheduler.displayed(&Category::Men), v2.as_slice());
        assert!(scheduler.pending(&Category::Men).is_none());

        assert!(scheduler.fire_timer(&second.token).is_none());
    }

    #[test]
    fn closed_view_parks_rankings_until_open_and_settle() {
        let clock = ManualClock::new();
        let mut registry = DisplayKeyRegistry::new();
        let mut scheduler = scheduler(&clock);

        let ranking = entries(&mut registry, &[("a", 3)]);
        let event = scheduler.submit_ranking(update(ranking.clone()), ApplyMode::Immediate);
        assert!(matches!(event, SchedulerEvent::Queued { .. }));
        assert!(scheduler.snapshot(&Category::Men).is_none());

        clock.advance(Duration::from_secs(30));
        assert!(scheduler.snapshot(&Category::Men).is_none());

        let mut events = scheduler.open(&Category::Men);
        assert_eq!(events.len(), 1);
        let request = deferred(events.remove(0));
        assert_eq!(request.delay, SETTLE);
        assert!(scheduler.snapshot(&Category::Men).is_none());

        clock.advance(SETTLE);
        let plan = scheduler.fire_timer(&request.token).expect("applies after settle");
        assert_eq!(plan.entries, ranking);
        assert_eq!(
            scheduler
                .snapshot(&Category::Men)
                .and_then(|snapshot| snapshot.rank_of(&ranking[0].signature)),
            Some(1)
        );
    }

    #[test]
    fn close_cancels_timer_but_keeps_payload() {
        let clock = ManualClock::new();
        let mut registry = DisplayKeyRegistry::new();
        let mut scheduler = scheduler(&clock);
        scheduler.open(&Category::Men);

        let ranking = entries(&mut registry, &[("a", 3)]);
        let request = deferred(scheduler.submit_ranking(update(ranking.clone()), ApplyMode::Gated));
        scheduler.close();
        assert!(scheduler.armed_timer(&Category::Men).is_none());
        assert!(scheduler.pending(&Category::Men).is_some());

        clock.advance(SETTLE);
        assert!(scheduler.fire_timer(&request.token).is_none());

        let reopened = deferred(scheduler.open(&Category::Men).remove(0));
        // the timer from before the close must stay dead after reopening
        assert!(scheduler.fire_timer(&request.token).is_none());
        clock.advance(SETTLE);
        let plan = scheduler.fire_timer(&reopened.token).expect("reopened applies");
        assert_eq!(plan.entries, ranking);
    }

    #[test]
    fn stable_or_immediate_submissions_apply_directly() {
        let clock = ManualClock::new();
        let mut registry = DisplayKeyRegistry::new();
        let mut scheduler = scheduler(&clock);
        scheduler.open(&Category::Men);

        let forced = entries(&mut registry, &[("a", 3)]);
        let plan = applied(scheduler.submit_ranking(update(forced), ApplyMode::Immediate));
        assert_eq!(plan.deltas.values().next().map(|d| d.direction), Some(Direction::New));

        clock.advance(SETTLE);
        let next = entries(&mut registry, &[("b", 5), ("a", 3)]);
        let plan = applied(scheduler.submit_ranking(update(next), ApplyMode::Gated));
        assert_eq!(plan.entries.len(), 2);
        let a = &plan.entries[1].signature;
        assert_eq!(plan.deltas[a].direction, Direction::Down);
    }

    #[test]
    fn immediate_apply_supersedes_a_parked_ranking() {
        let clock = ManualClock::new();
        let mut registry = DisplayKeyRegistry::new();
        let mut scheduler = scheduler(&clock);
        scheduler.open(&Category::Men);

        let slow = entries(&mut registry, &[("a", 3)]);
        let request = deferred(scheduler.submit_ranking(update(slow), ApplyMode::Gated));
        let fast = entries(&mut registry, &[("b", 4)]);
        applied(scheduler.submit_ranking(update(fast.clone()), ApplyMode::Immediate));

        clock.advance(SETTLE);
        assert!(scheduler.fire_timer(&request.token).is_none());
        assert_eq!(scheduler.displayed(&Category::Men), fast.as_slice());
    }

    #[test]
    fn pre_submit_snapshot_shows_first_then_real_update_after_settle() {
        let clock = ManualClock::new();
        let mut registry = DisplayKeyRegistry::new();
        let mut scheduler = scheduler(&clock);

        let before = entries(&mut registry, &[("a", 10)]);
        scheduler.capture_pre_submit(HashMap::from([(Category::Men, before.clone())]));

        let after = entries(&mut registry, &[("new", 20), ("a", 10)]);
        scheduler.submit_ranking(update(after.clone()), ApplyMode::Gated);

        let mut events = scheduler.open(&Category::Men);
        assert_eq!(events.len(), 2);
        let shown = applied(events.remove(0));
        assert_eq!(shown.entries, before);
        let request = deferred(events.remove(0));

        clock.advance(SETTLE);
        let plan = scheduler.fire_timer(&request.token).expect("real update");
        assert_eq!(plan.entries, after);
        assert_eq!(plan.deltas[&after[0].signature].direction, Direction::New);
        assert_eq!(plan.deltas[&after[1].signature].direction, Direction::Down);
        assert!(!scheduler.has_pre_submit());
    }

    #[test]
    fn stale_pre_submit_snapshot_is_skipped_unless_preferred() {
        let clock = ManualClock::new();
        let mut registry = DisplayKeyRegistry::new();
        let settings = SchedulerSettings {
            prefer_pre_submit_on_open: false,
            ..SchedulerSettings::default()
        };
        let mut scheduler = ApplyScheduler::new(settings, clock.clone());

        let before = entries(&mut registry, &[("a", 10)]);
        scheduler.capture_pre_submit(HashMap::from([(Category::Men, before)]));
        clock.advance(DEFAULT_PRE_SUBMIT_WINDOW);

        assert!(scheduler.open(&Category::Men).is_empty());
        assert!(scheduler.snapshot(&Category::Men).is_none());
    }

    #[test]
    fn zero_settle_reevaluates_parked_ranking_directly() {
        let clock = ManualClock::new();
        let mut registry = DisplayKeyRegistry::new();
        let settings = SchedulerSettings {
            settle: Duration::ZERO,
            ..SchedulerSettings::default()
        };
        let mut scheduler = ApplyScheduler::new(settings, clock.clone());
        scheduler.submit_ranking(update(entries(&mut registry, &[("a", 1)])), ApplyMode::Gated);

        let mut events = scheduler.open(&Category::Men);
        assert_eq!(scheduler.phase(), ViewPhase::OpenStable);
        applied(events.remove(0));
    }

    #[test]
    fn only_the_latest_apply_owns_hints() {
        let clock = ManualClock::new();
        let mut registry = DisplayKeyRegistry::new();
        let mut scheduler = scheduler(&clock);
        scheduler.open(&Category::Men);

        let first = applied(scheduler.submit_ranking(
            update(entries(&mut registry, &[("a", 1)])),
            ApplyMode::Immediate,
        ));
        let second = applied(scheduler.submit_ranking(
            update(entries(&mut registry, &[("a", 2)])),
            ApplyMode::Immediate,
        ));
        assert!(!scheduler.expire_hints(first.version));
        assert!(scheduler.expire_hints(second.version));
        assert!(!scheduler.expire_hints(second.version));
    }

    #[test]
    fn newer_ranking_for_another_category_disarms_parked_timer() {
        let clock = ManualClock::new();
        let mut registry = DisplayKeyRegistry::new();
        let mut scheduler = scheduler(&clock);
        scheduler.open(&Category::Men);

        let men = entries(&mut registry, &[("a", 3)]);
        let request = deferred(scheduler.submit_ranking(update(men), ApplyMode::Gated));
        let women = RankingUpdate {
            category: Category::Women,
            entries: Vec::new(),
            spotlight: None,
            clear_pre_submit: false,
        };
        applied(scheduler.submit_ranking(women, ApplyMode::Immediate));
        assert!(scheduler.armed_timer(&Category::Men).is_none());

        clock.advance(SETTLE);
        assert!(scheduler.fire_timer(&request.token).is_none());
        assert!(scheduler.displayed(&Category::Men).is_empty());
        assert_eq!(
            scheduler.pending(&Category::Men).map(|pending| pending.version),
            Some(request.token.version)
        );
    }
}
