//! The piece the hosting application owns: display-key registry, ranker, apply
//! scheduler, the last fetched records and the active category.

use std::collections::HashMap;

use tracing::info;

use crate::clock::Clock;
use crate::identity::{DisplayKeyRegistry, IdentitySignature};
use crate::ranker::{RankedEntry, Ranker};
use crate::record::{Category, ParticipantRecord, Submission};
use crate::scheduler::{
    ApplyMode, ApplyScheduler, PreSubmitSnapshot, RankingUpdate, SchedulerEvent,
    SchedulerSettings, TimerToken, TransitionPlan, ViewPhase,
};

pub struct Board<C: Clock> {
    registry: DisplayKeyRegistry,
    ranker: Ranker,
    scheduler: ApplyScheduler<C>,
    records: Vec<ParticipantRecord>,
    category: Category,
    spotlight: Option<IdentitySignature>,
    rollback: Option<SubmissionRollback>,
}

/// What `prepare_submission` displaced, put back if the write fails.
struct SubmissionRollback {
    signature: IdentitySignature,
    spotlight: Option<IdentitySignature>,
    pre_submit: Option<PreSubmitSnapshot>,
}

impl<C: Clock> Board<C> {
    pub fn new(ranker: Ranker, settings: SchedulerSettings, category: Category, clock: C) -> Self {
        Self {
            registry: DisplayKeyRegistry::new(),
            ranker,
            scheduler: ApplyScheduler::new(settings, clock),
            records: Vec::new(),
            category,
            spotlight: None,
            rollback: None,
        }
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    pub fn records(&self) -> &[ParticipantRecord] {
        &self.records
    }

    pub fn scheduler(&self) -> &ApplyScheduler<C> {
        &self.scheduler
    }

    pub fn phase(&self) -> ViewPhase {
        self.scheduler.phase()
    }

    pub fn displayed(&self, category: &Category) -> &[RankedEntry] {
        self.scheduler.displayed(category)
    }

    pub fn spotlight(&self) -> Option<&IdentitySignature> {
        self.spotlight.as_ref()
    }

    pub fn registry(&self) -> &DisplayKeyRegistry {
        &self.registry
    }

    pub fn rank(&mut self, category: &Category) -> Vec<RankedEntry> {
        self.ranker.rank(&self.records, category, &mut self.registry)
    }

    /// Seeds the record cache without touching the display.
    pub fn warm(&mut self, records: Vec<ParticipantRecord>) {
        self.records = records;
    }

    /// Takes a fresh fetch result and pushes its ranking for the active
    /// category through the settle gate.
    pub fn ingest(&mut self, records: Vec<ParticipantRecord>) -> SchedulerEvent {
        self.records = records;
        let category = self.category.clone();
        let entries = self.rank(&category);
        self.scheduler.submit_ranking(
            RankingUpdate {
                category,
                entries,
                spotlight: self.spotlight.clone(),
                clear_pre_submit: true,
            },
            ApplyMode::Gated,
        )
    }

    /// Switches the active category and, when records are cached, shows their
    /// ranking at once. The caller is expected to follow with a forced refresh.
    pub fn switch_category(&mut self, category: Category) -> Option<SchedulerEvent> {
        if category != self.category {
            info!(from = %self.category, to = %category, "switching leaderboard category");
        }
        self.category = category.clone();
        if self.records.is_empty() {
            return None;
        }
        let entries = self.rank(&category);
        Some(self.scheduler.submit_ranking(
            RankingUpdate {
                category,
                entries,
                spotlight: None,
                clear_pre_submit: false,
            },
            ApplyMode::Immediate,
        ))
    }

    /// Opens the view. When neither a pre-submission ranking nor a parked
    /// ranking is waiting, the cached records are shown at once.
    pub fn open(&mut self) -> Vec<SchedulerEvent> {
        if self.scheduler.is_open() {
            return Vec::new();
        }
        let category = self.category.clone();
        let mut events = self.scheduler.open(&category);
        if events.is_empty() && !self.records.is_empty() {
            let entries = self.rank(&category);
            events.push(self.scheduler.submit_ranking(
                RankingUpdate {
                    category,
                    entries,
                    spotlight: self.spotlight.clone(),
                    clear_pre_submit: false,
                },
                ApplyMode::Immediate,
            ));
        }
        events
    }

    pub fn close(&mut self) {
        self.scheduler.close();
    }

    /// Call right before writing `submission`: snapshots the current rankings
    /// for the next open and spotlights the submitter.
    pub fn prepare_submission(&mut self, submission: &Submission) -> IdentitySignature {
        let mut categories: Vec<Category> = Category::SWITCHABLE.to_vec();
        if !categories.contains(&self.category) {
            categories.push(self.category.clone());
        }
        let rankings: HashMap<Category, Vec<RankedEntry>> = categories
            .into_iter()
            .map(|category| {
                let entries = self.rank(&category);
                (category, entries)
            })
            .collect();
        let pre_submit = self.scheduler.take_pre_submit();
        self.scheduler.capture_pre_submit(rankings);

        let signature = IdentitySignature::of(&submission.as_record());
        let spotlight = self.spotlight.replace(signature.clone());
        self.rollback = Some(SubmissionRollback {
            signature: signature.clone(),
            spotlight,
            pre_submit,
        });
        signature
    }

    /// Undoes `prepare_submission` after a failed write. A no-op when another
    /// submission was prepared since.
    pub fn abandon_submission(&mut self, signature: &IdentitySignature) {
        let rollback = match self.rollback.take() {
            Some(rollback) if &rollback.signature == signature => rollback,
            other => {
                self.rollback = other;
                return;
            }
        };
        self.spotlight = rollback.spotlight;
        self.scheduler.restore_pre_submit(rollback.pre_submit);
    }

    pub fn fire_timer(&mut self, token: &TimerToken) -> Option<TransitionPlan> {
        self.scheduler.fire_timer(token)
    }

    pub fn expire_hints(&mut self, version: u64) -> bool {
        self.scheduler.expire_hints(version)
    }
}
