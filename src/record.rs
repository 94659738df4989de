use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A row as delivered by the data source. Field names vary between sources and
/// unrelated keys are common; nothing is guaranteed about its shape.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub Map<String, Value>);

impl RawRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// First value among `keys` that is present and not null.
    pub fn first_present(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .filter_map(|key| self.0.get(*key))
            .find(|value| !value.is_null())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Men,
    Women,
    /// Any tag that is neither canonical nor a known alias, carried verbatim.
    Other(String),
}

impl Category {
    /// Categories offered as switchable leaderboard views.
    pub const SWITCHABLE: [Category; 2] = [Category::Men, Category::Women];

    /// Maps canonical values and the legacy `Male`/`Female` aliases. Blank input
    /// is treated as untagged.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        match trimmed {
            "" => None,
            "Men" | "Male" => Some(Self::Men),
            "Women" | "Female" => Some(Self::Women),
            other => Some(Self::Other(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Men => "Men",
            Self::Women => "Women",
            Self::Other(value) => value,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Category::parse(&value)
            .ok_or_else(|| serde::de::Error::custom("category must not be blank"))
    }
}

/// Canonical participant record produced by the normalizer.
///
/// The serialized shape (`firstName`, `lastName`, `count`, `gender`) is also
/// accepted by the normalizer, so a cached list can be fed straight back in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRecord {
    pub first_name: String,
    pub last_name: String,
    #[serde(rename = "count")]
    pub score: i64,
    #[serde(rename = "gender", default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

impl ParticipantRecord {
    pub fn new(first_name: &str, last_name: &str, score: i64, category: Option<Category>) -> Self {
        Self {
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            score,
            category,
        }
    }

    pub fn is_unnamed(&self) -> bool {
        self.first_name.is_empty() && self.last_name.is_empty()
    }

    pub fn display_name(&self) -> String {
        if self.last_name.is_empty() {
            self.first_name.clone()
        } else {
            format!("{} {}", self.first_name, self.last_name)
        }
    }
}

/// A finished attempt on its way to the data source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub first_name: String,
    pub last_name: String,
    #[serde(rename = "count")]
    pub score: i64,
    #[serde(rename = "gender", skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

impl Submission {
    /// Splits a typed display name on its first whitespace run.
    pub fn from_display_name(name: &str, score: i64, category: Option<Category>) -> Self {
        let (first, last) = split_first_word(name);
        Self {
            first_name: first,
            last_name: last,
            score,
            category,
        }
    }

    pub fn as_record(&self) -> ParticipantRecord {
        ParticipantRecord::new(
            &self.first_name,
            &self.last_name,
            self.score,
            self.category.clone(),
        )
    }
}

/// `"  Ana  Maria Lopez "` becomes `("Ana", "Maria Lopez")`.
pub fn split_first_word(value: &str) -> (String, String) {
    let trimmed = value.trim();
    match trimmed.find(char::is_whitespace) {
        Some(index) => (
            trimmed[..index].to_string(),
            trimmed[index..].trim_start().to_string(),
        ),
        None => (trimmed.to_string(), String::new()),
    }
}
