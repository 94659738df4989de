use std::collections::HashMap;

use serde::Serialize;

use crate::identity::{DisplayKey, DisplayKeyRegistry, IdentitySignature};
use crate::normalize::normalize_rows;
use crate::record::{Category, ParticipantRecord, RawRecord};

pub const DEFAULT_LEADERBOARD_SIZE: usize = 5;

/// What to do with records that carry no category tag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UntaggedPolicy {
    /// Show them in every category's view. Sources do not always tag gender.
    #[default]
    IncludeEverywhere,
    Exclude,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    pub display_key: DisplayKey,
    pub signature: IdentitySignature,
    pub rank: usize,
    #[serde(flatten)]
    pub participant: ParticipantRecord,
}

#[derive(Clone, Debug)]
pub struct Ranker {
    size: usize,
    untagged: UntaggedPolicy,
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new(DEFAULT_LEADERBOARD_SIZE, UntaggedPolicy::default())
    }
}

impl Ranker {
    pub fn new(size: usize, untagged: UntaggedPolicy) -> Self {
        Self { size, untagged }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn rank_rows(
        &self,
        rows: &[RawRecord],
        category: &Category,
        registry: &mut DisplayKeyRegistry,
    ) -> Vec<RankedEntry> {
        self.rank(&normalize_rows(rows), category, registry)
    }

    /// Ranks `records` for `category`.
    ///
    /// Input order is meaningful: the data source delivers rows most recent
    /// first, and that order decides both which duplicate survives a score tie
    /// and how equal scores are ordered. No secondary sort key is applied.
    pub fn rank(
        &self,
        records: &[ParticipantRecord],
        category: &Category,
        registry: &mut DisplayKeyRegistry,
    ) -> Vec<RankedEntry> {
        let mut survivors = dedup_best(records);
        survivors.retain(|(_, record)| record.score > 0 && !record.is_unnamed());
        survivors.retain(|(_, record)| self.admits(record, category));
        // stable: equal scores keep source order
        survivors.sort_by(|(_, a), (_, b)| b.score.cmp(&a.score));
        survivors.truncate(self.size);

        survivors
            .into_iter()
            .enumerate()
            .map(|(index, (signature, record))| RankedEntry {
                display_key: registry.display_key_for(&signature),
                signature,
                rank: index + 1,
                participant: record.clone(),
            })
            .collect()
    }

    fn admits(&self, record: &ParticipantRecord, category: &Category) -> bool {
        match &record.category {
            Some(tag) => tag == category,
            None => self.untagged == UntaggedPolicy::IncludeEverywhere,
        }
    }
}

/// One record per signature, the highest score winning and the first seen
/// winning a tie. Groups stay in order of first appearance.
fn dedup_best(records: &[ParticipantRecord]) -> Vec<(IdentitySignature, &ParticipantRecord)> {
    let mut slots: HashMap<IdentitySignature, usize> = HashMap::new();
    let mut best: Vec<(IdentitySignature, &ParticipantRecord)> = Vec::new();
    for record in records {
        let signature = IdentitySignature::of(record);
        match slots.get(&signature) {
            Some(&slot) => {
                if record.score > best[slot].1.score {
                    best[slot].1 = record;
                }
            }
            None => {
                slots.insert(signature.clone(), best.len());
                best.push((signature, record));
            }
        }
    }
    best
}
