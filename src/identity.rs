use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::ParticipantRecord;

/// Case and whitespace insensitive identity of a participant. Score is not
/// part of it, so repeat attempts by one person collapse into one slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentitySignature(String);

impl IdentitySignature {
    pub fn of(record: &ParticipantRecord) -> Self {
        Self::from_parts(
            &record.first_name,
            &record.last_name,
            record.category.as_ref().map(|category| category.as_str()),
        )
    }

    pub fn from_parts(first_name: &str, last_name: &str, category: Option<&str>) -> Self {
        Self(format!(
            "{}|{}|{}",
            first_name.trim().to_lowercase(),
            last_name.trim().to_lowercase(),
            category.unwrap_or("")
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentitySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn signature_of(record: &ParticipantRecord) -> IdentitySignature {
    IdentitySignature::of(record)
}

/// Opaque id a render sink uses to keep an element alive across reorders.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayKey(String);

impl DisplayKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Append-only signature to key mapping. Keys are allocated from a monotonic
/// counter and never reassigned or reused.
#[derive(Debug, Default)]
pub struct DisplayKeyRegistry {
    keys: HashMap<IdentitySignature, DisplayKey>,
    next: u64,
}

impl DisplayKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn display_key_for(&mut self, signature: &IdentitySignature) -> DisplayKey {
        if let Some(key) = self.keys.get(signature) {
            return key.clone();
        }
        let key = DisplayKey(format!("uid-{}", self.next));
        self.next += 1;
        self.keys.insert(signature.clone(), key.clone());
        key
    }

    pub fn get(&self, signature: &IdentitySignature) -> Option<&DisplayKey> {
        self.keys.get(signature)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
