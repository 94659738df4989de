use std::time::{SystemTime, UNIX_EPOCH};

use url::Url;

use crate::constants::NOCACHE_PARAM;

/// Appends the cache-busting parameter the data source understands. Values
/// that do not parse as URLs are returned untouched.
pub(crate) fn with_nocache(source_url: &str, force: bool) -> String {
    if !force {
        return source_url.to_string();
    }
    let mut url = match Url::parse(source_url) {
        Ok(url) => url,
        Err(_) => return source_url.to_string(),
    };
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != NOCACHE_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair(NOCACHE_PARAM, "true");
    url.to_string()
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
