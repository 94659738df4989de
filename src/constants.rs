pub(crate) const DEFAULT_PORT: u16 = 3000;
pub(crate) const DEFAULT_SOURCE_URL: &str = "http://127.0.0.1:8787/rows";
pub(crate) const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub(crate) const DEFAULT_REFRESH_INTERVAL_MS: u64 = 15_000;
pub(crate) const DEFAULT_FETCH_THROTTLE_MS: u64 = 1_500;
pub(crate) const DEFAULT_SETTLE_MS: u64 = 1_200;
pub(crate) const DEFAULT_PRE_SUBMIT_WINDOW_MS: u64 = 3_000;
pub(crate) const DEFAULT_CHANGE_HINT_MS: u64 = 8_500;
pub(crate) const DEFAULT_LEADERBOARD_SIZE: usize = 5;
pub(crate) const DEFAULT_HEARTBEAT_MS: u64 = 15_000;
pub(crate) const DEFAULT_STATIC_DIR: &str = "./public";
pub(crate) const BROADCAST_BUFFER: usize = 64;
pub(crate) const METRICS_INTERVAL_SECS: u64 = 10;
pub(crate) const NOCACHE_PARAM: &str = "nocache";
