//! Rank movement between what was last shown and what is about to be shown.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::identity::{DisplayKey, IdentitySignature};
use crate::ranker::RankedEntry;

/// Signature to rank, as last applied to the display for one category.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RankSnapshot(BTreeMap<IdentitySignature, usize>);

impl RankSnapshot {
    pub fn from_entries(entries: &[RankedEntry]) -> Self {
        Self(
            entries
                .iter()
                .map(|entry| (entry.signature.clone(), entry.rank))
                .collect(),
        )
    }

    pub fn rank_of(&self, signature: &IdentitySignature) -> Option<usize> {
        self.0.get(signature).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Same,
    New,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RankDelta {
    pub direction: Direction,
    /// Previous rank minus new rank; 0 for new entries.
    pub magnitude: i64,
}

pub type DeltaMap = BTreeMap<IdentitySignature, RankDelta>;

/// Entries that dropped out of the list get no record.
pub fn compute_deltas(entries: &[RankedEntry], previous: &RankSnapshot) -> DeltaMap {
    entries
        .iter()
        .map(|entry| {
            let delta = match previous.rank_of(&entry.signature) {
                None => RankDelta {
                    direction: Direction::New,
                    magnitude: 0,
                },
                Some(previous_rank) => {
                    let magnitude = previous_rank as i64 - entry.rank as i64;
                    let direction = match magnitude {
                        m if m > 0 => Direction::Up,
                        m if m < 0 => Direction::Down,
                        _ => Direction::Same,
                    };
                    RankDelta {
                        direction,
                        magnitude,
                    }
                }
            };
            (entry.signature.clone(), delta)
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Transition {
    Enter { to: usize },
    Move { from: usize, to: usize },
    Hold { rank: usize },
    Exit { from: usize },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionItem {
    pub display_key: DisplayKey,
    #[serde(flatten)]
    pub transition: Transition,
}

/// Matches items by display key. Items of `next` come first in `next` order,
/// then exits in `previous` order, so the plan is deterministic.
pub fn plan_transitions(previous: &[RankedEntry], next: &[RankedEntry]) -> Vec<TransitionItem> {
    let mut items = Vec::with_capacity(previous.len() + next.len());
    for entry in next {
        let transition = match previous
            .iter()
            .find(|old| old.display_key == entry.display_key)
        {
            None => Transition::Enter { to: entry.rank },
            Some(old) if old.rank == entry.rank => Transition::Hold { rank: entry.rank },
            Some(old) => Transition::Move {
                from: old.rank,
                to: entry.rank,
            },
        };
        items.push(TransitionItem {
            display_key: entry.display_key.clone(),
            transition,
        });
    }

    let remaining: HashSet<&DisplayKey> = next.iter().map(|entry| &entry.display_key).collect();
    for old in previous {
        if !remaining.contains(&old.display_key) {
            items.push(TransitionItem {
                display_key: old.display_key.clone(),
                transition: Transition::Exit { from: old.rank },
            });
        }
    }
    items
}
