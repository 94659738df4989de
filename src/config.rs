use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use rep_leaderboard::{Category, Ranker, SchedulerSettings, UntaggedPolicy};
use tracing::warn;

use crate::constants::{
    DEFAULT_CHANGE_HINT_MS, DEFAULT_FETCH_THROTTLE_MS, DEFAULT_HEARTBEAT_MS,
    DEFAULT_LEADERBOARD_SIZE, DEFAULT_PORT, DEFAULT_PRE_SUBMIT_WINDOW_MS,
    DEFAULT_REFRESH_INTERVAL_MS, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SETTLE_MS,
    DEFAULT_SOURCE_URL,
};
use crate::util::parse_bool;

#[derive(Clone)]
pub(crate) struct Config {
    pub(crate) port: u16,
    pub(crate) source_url: String,
    pub(crate) source_submit_url: String,
    pub(crate) source_token: Option<String>,
    pub(crate) request_timeout: Duration,
    pub(crate) refresh_interval: Duration,
    pub(crate) fetch_throttle: Duration,
    pub(crate) settle: Duration,
    pub(crate) pre_submit_window: Duration,
    pub(crate) pre_submit_always: bool,
    pub(crate) change_hint: Duration,
    pub(crate) leaderboard_size: usize,
    pub(crate) untagged_in_all_categories: bool,
    pub(crate) default_category: Category,
    pub(crate) session_cache_path: Option<PathBuf>,
    pub(crate) heartbeat: Duration,
}

impl Config {
    pub(crate) fn from_env() -> Result<Self> {
        let source_override = read_env_first(&["SOURCE_URL"]);
        if source_override.is_none() {
            warn!("SOURCE_URL not set; defaulting to {}", DEFAULT_SOURCE_URL);
        }
        let source_url = source_override.unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string());
        let source_submit_url =
            read_env_first(&["SOURCE_SUBMIT_URL"]).unwrap_or_else(|| source_url.clone());
        let source_token = read_env_first(&["SOURCE_TOKEN", "SOURCE_X_TOKEN"]);

        let port = read_env_first(&["PORT"])
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let leaderboard_size = read_env_first(&["LEADERBOARD_SIZE"])
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_LEADERBOARD_SIZE);

        let default_category = read_env_first(&["DEFAULT_CATEGORY"])
            .and_then(|value| Category::parse(&value))
            .unwrap_or(Category::Men);

        Ok(Self {
            port,
            source_url,
            source_submit_url,
            source_token,
            request_timeout: read_ms(&["REQUEST_TIMEOUT_MS"], DEFAULT_REQUEST_TIMEOUT_MS),
            refresh_interval: read_ms(&["REFRESH_INTERVAL_MS"], DEFAULT_REFRESH_INTERVAL_MS),
            fetch_throttle: read_ms(&["FETCH_THROTTLE_MS"], DEFAULT_FETCH_THROTTLE_MS),
            settle: read_ms(&["TOP5_SETTLE_MS", "SETTLE_MS"], DEFAULT_SETTLE_MS),
            pre_submit_window: read_ms(
                &["PRESUBMIT_WINDOW_MS", "PRE_SUBMIT_MS"],
                DEFAULT_PRE_SUBMIT_WINDOW_MS,
            ),
            pre_submit_always: read_bool(&["PRESUBMIT_ALWAYS", "PRE_ALWAYS"], true),
            change_hint: read_ms(&["CHANGE_HINT_MS"], DEFAULT_CHANGE_HINT_MS),
            leaderboard_size,
            untagged_in_all_categories: read_bool(&["UNTAGGED_IN_ALL_CATEGORIES"], true),
            default_category,
            session_cache_path: read_env_first(&["SESSION_CACHE_PATH"]).map(PathBuf::from),
            heartbeat: read_ms(&["SSE_HEARTBEAT_MS"], DEFAULT_HEARTBEAT_MS),
        })
    }

    pub(crate) fn ranker(&self) -> Ranker {
        let untagged = if self.untagged_in_all_categories {
            UntaggedPolicy::IncludeEverywhere
        } else {
            UntaggedPolicy::Exclude
        };
        Ranker::new(self.leaderboard_size, untagged)
    }

    pub(crate) fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            settle: self.settle,
            pre_submit_window: self.pre_submit_window,
            prefer_pre_submit_on_open: self.pre_submit_always,
            hint_duration: self.change_hint,
        }
    }
}

fn read_env_first(keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Ok(value) = env::var(key) {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
    }
    None
}

fn read_ms(keys: &[&str], fallback: u64) -> Duration {
    let millis = match read_env_first(keys) {
        Some(value) => match value.parse::<u64>() {
            Ok(millis) => millis,
            Err(_) => {
                warn!(keys = ?keys, value = %value, "ignoring invalid millisecond value");
                fallback
            }
        },
        None => fallback,
    };
    Duration::from_millis(millis)
}

fn read_bool(keys: &[&str], fallback: bool) -> bool {
    read_env_first(keys)
        .and_then(|value| parse_bool(&value))
        .unwrap_or(fallback)
}
