use std::future::Future;

use serde_json::Value;
use thiserror::Error;

use crate::record::{RawRecord, Submission};

/// Why a refresh produced nothing. None of these are fatal; the board keeps
/// showing its last good state.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("data source returned an unrecognized payload: {0}")]
    Malformed(String),
    #[error("data source reported an error: {message}")]
    Reported { message: String },
    #[error("data source returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("data source transport failed: {0}")]
    Transport(String),
}

impl SourceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::Reported { .. } => "reported",
            Self::Status { .. } => "status",
            Self::Transport(_) => "transport",
        }
    }
}

/// The backing store. `force` asks the source to bypass any cache it keeps.
pub trait DataSource: Send + Sync {
    fn fetch(&self, force: bool) -> impl Future<Output = Result<Value, SourceError>> + Send;

    fn submit(&self, submission: &Submission)
        -> impl Future<Output = Result<(), SourceError>> + Send;
}

/// Classifies a fetched payload: an array of rows, an explicit
/// `{"status": "ERROR"}` object, an empty object (no rows), or garbage.
pub fn parse_payload(payload: Value) -> Result<Vec<RawRecord>, SourceError> {
    match payload {
        Value::Array(rows) => Ok(rows
            .into_iter()
            .map(|row| match row {
                Value::Object(map) => RawRecord(map),
                _ => RawRecord::new(),
            })
            .collect()),
        Value::Object(map) if map.get("status").and_then(Value::as_str) == Some("ERROR") => {
            Err(SourceError::Reported {
                message: map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            })
        }
        Value::Object(map) if map.is_empty() => Ok(Vec::new()),
        other => Err(SourceError::Malformed(preview(&other))),
    }
}

fn preview(value: &Value) -> String {
    let text = value.to_string();
    match text.char_indices().nth(200) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text,
    }
}
