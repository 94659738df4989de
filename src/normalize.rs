//! Row normalization: loosely typed source rows in, canonical records out.
//!
//! Pure and total. The output has the same length and order as the input.

use serde_json::Value;

use crate::record::{split_first_word, Category, ParticipantRecord, RawRecord};

const FIRST_NAME_KEYS: &[&str] = &["first_name", "firstName", "name"];
const LAST_NAME_KEYS: &[&str] = &["last_name", "lastName", "familyName"];
const FULL_NAME_KEYS: &[&str] = &["fullName"];
const SCORE_KEYS: &[&str] = &["count", "pushUps", "pushups"];
const CATEGORY_KEY: &str = "gender";

/// Ways of finding a participant's name, tried in order until one yields a
/// first name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameStrategy {
    ExplicitFields,
    FullNameSplit,
    HeuristicScan,
}

impl NameStrategy {
    pub const ORDER: [NameStrategy; 3] = [
        NameStrategy::ExplicitFields,
        NameStrategy::FullNameSplit,
        NameStrategy::HeuristicScan,
    ];

    /// Always returns a pair; both halves may be empty.
    pub fn extract(self, row: &RawRecord) -> (String, String) {
        match self {
            Self::ExplicitFields => (
                text_of(row.first_present(FIRST_NAME_KEYS)),
                text_of(row.first_present(LAST_NAME_KEYS)),
            ),
            Self::FullNameSplit => split_first_word(&text_of(row.first_present(FULL_NAME_KEYS))),
            Self::HeuristicScan => row
                .iter()
                .filter(|(key, _)| !key.eq_ignore_ascii_case(CATEGORY_KEY))
                .filter_map(|(_, value)| value.as_str())
                .map(str::trim)
                .find(|value| value.chars().any(char::is_alphabetic))
                .map(split_first_word)
                .unwrap_or_default(),
        }
    }
}

pub fn normalize_rows(rows: &[RawRecord]) -> Vec<ParticipantRecord> {
    rows.iter().map(normalize_row).collect()
}

pub fn normalize_row(row: &RawRecord) -> ParticipantRecord {
    let (first, last) = extract_name(row);
    ParticipantRecord {
        first_name: first,
        last_name: last,
        score: score_of(row.first_present(SCORE_KEYS)),
        category: category_of(row.get(CATEGORY_KEY)),
    }
}

/// A last name found without a first name is held back: a later full name
/// still wins, and otherwise it is promoted to the first name ahead of the
/// heuristic scan.
fn extract_name(row: &RawRecord) -> (String, String) {
    let mut lone_last: Option<String> = None;
    for strategy in NameStrategy::ORDER {
        if strategy == NameStrategy::HeuristicScan {
            if let Some(last) = lone_last.take() {
                return (last, String::new());
            }
        }
        let (first, last) = strategy.extract(row);
        if !first.is_empty() {
            return (first, last);
        }
        if lone_last.is_none() && !last.is_empty() {
            lone_last = Some(last);
        }
    }
    (lone_last.unwrap_or_default(), String::new())
}

fn text_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string().trim().to_string(),
    }
}

/// Numbers and numeric strings are accepted; anything else, or a non-finite
/// result, is 0. Fractions truncate toward zero. Negative values pass through.
fn score_of(value: Option<&Value>) -> i64 {
    let parsed = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        _ => None,
    };
    match parsed {
        Some(score) if score.is_finite() => score.trunc() as i64,
        _ => 0,
    }
}

fn category_of(value: Option<&Value>) -> Option<Category> {
    match value {
        Some(Value::String(text)) => Category::parse(text),
        Some(Value::Null) | None => None,
        Some(other) => Category::parse(&other.to_string()),
    }
}
