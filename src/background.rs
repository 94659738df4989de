use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::constants::METRICS_INTERVAL_SECS;
use crate::state::AppState;
use crate::util::now_ms;

/// Periodic non-forced refresh. Ticks that land inside the throttle window or
/// while another refresh runs are dropped by the coordinator.
pub(crate) async fn run_passive_refresh(state: Arc<AppState>) {
    let period = state.config.refresh_interval;
    if period.is_zero() {
        info!("passive refresh disabled");
        return;
    }

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        state.refresh(false).await;
    }
}

pub(crate) async fn run_board_metrics(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(Duration::from_secs(METRICS_INTERVAL_SECS));
    loop {
        interval.tick().await;
        let subscriber_count = state.sender.receiver_count();
        if subscriber_count == 0 {
            continue;
        }

        let (category, phase, version, pending_updates, records, pre_submit) = {
            let board = state.board.lock().await;
            let scheduler = board.scheduler();
            (
                board.category().to_string(),
                board.phase(),
                scheduler.version(),
                scheduler.pending_count(),
                board.records().len(),
                scheduler.has_pre_submit(),
            )
        };

        let refreshes = state.refreshes.load(Ordering::SeqCst);
        let last_refresh_ms = state.last_refresh_ms.load(Ordering::SeqCst);
        let last_refresh_age_ms = if last_refresh_ms == 0 {
            "-".to_string()
        } else {
            now_ms().saturating_sub(last_refresh_ms).to_string()
        };

        info!(
            subscribers = subscriber_count,
            category = %category,
            phase = ?phase,
            version,
            pending_updates,
            records,
            pre_submit,
            refreshes,
            refresh_in_flight = state.coordinator.is_in_flight(),
            last_refresh_age_ms = %last_refresh_age_ms,
            "board metrics"
        );
    }
}
