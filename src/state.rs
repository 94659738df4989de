use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};

use rep_leaderboard::{
    Board, FetchCoordinator, SchedulerEvent, SystemClock, TimerRequest, TransitionPlan,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::BROADCAST_BUFFER;
use crate::models::ViewStatusPayload;
use crate::session_cache::SessionCache;
use crate::upstream::HttpSource;
use crate::util::now_ms;

#[derive(Clone)]
pub(crate) enum StreamEvent {
    Plan(TransitionPlan),
    HintsHidden(u64),
    Shutdown,
}

pub(crate) struct AppState {
    pub(crate) sender: broadcast::Sender<StreamEvent>,
    pub(crate) board: Mutex<Board<SystemClock>>,
    pub(crate) coordinator: FetchCoordinator<HttpSource, SystemClock>,
    latest_plan: StdRwLock<Option<TransitionPlan>>,
    pub(crate) session_cache: Option<SessionCache>,
    pub(crate) config: Config,
    pub(crate) refreshes: AtomicU64,
    pub(crate) last_refresh_ms: AtomicU64,
}

impl AppState {
    pub(crate) fn new(config: Config, source: HttpSource) -> Arc<Self> {
        let (sender, _) = broadcast::channel(BROADCAST_BUFFER);
        let board = Board::new(
            config.ranker(),
            config.scheduler_settings(),
            config.default_category.clone(),
            SystemClock,
        );
        let coordinator = FetchCoordinator::new(source, SystemClock, config.fetch_throttle);
        let session_cache = config.session_cache_path.clone().map(SessionCache::new);
        Arc::new(Self {
            sender,
            board: Mutex::new(board),
            coordinator,
            latest_plan: StdRwLock::new(None),
            session_cache,
            config,
            refreshes: AtomicU64::new(0),
            last_refresh_ms: AtomicU64::new(0),
        })
    }

    pub(crate) async fn warm_from_session_cache(&self) {
        let cache = match &self.session_cache {
            Some(cache) => cache,
            None => return,
        };
        match cache.load().await {
            Ok(Some(records)) => {
                info!(
                    records = records.len(),
                    path = %cache.path().display(),
                    "warmed board from session cache"
                );
                self.board.lock().await.warm(records);
            }
            Ok(None) => {}
            Err(err) => warn!(?err, "failed to load session cache"),
        }
    }

    /// Runs one refresh through the coordinator and routes its outcome.
    /// Returns the number of rows fetched, or `None` when skipped or failed.
    pub(crate) async fn refresh(self: &Arc<Self>, force: bool) -> Option<usize> {
        let refreshed = self.coordinator.refresh(force, &self.board).await?;
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        self.last_refresh_ms.store(now_ms(), Ordering::SeqCst);

        if let Some(cache) = &self.session_cache {
            if let Err(err) = cache.store(&refreshed.records).await {
                warn!(?err, "failed to write session cache");
            }
        }

        let rows = refreshed.records.len();
        self.dispatch(vec![refreshed.event]);
        Some(rows)
    }

    pub(crate) fn spawn_refresh(self: &Arc<Self>, force: bool) {
        let state = Arc::clone(self);
        tokio::spawn(async move {
            state.refresh(force).await;
        });
    }

    pub(crate) fn dispatch(self: &Arc<Self>, events: Vec<SchedulerEvent>) {
        for event in events {
            match event {
                SchedulerEvent::Applied(plan) => self.publish(plan),
                SchedulerEvent::Queued { category, version } => {
                    debug!(category = %category, version, "ranking parked until view opens");
                }
                SchedulerEvent::Deferred(request) => self.arm_timer(request),
            }
        }
    }

    fn arm_timer(self: &Arc<Self>, request: TimerRequest) {
        debug!(
            category = %request.token.category,
            version = request.token.version,
            delay_ms = request.delay.as_millis() as u64,
            "ranking held for settle window"
        );
        let state = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(request.delay).await;
            let plan = state.board.lock().await.fire_timer(&request.token);
            if let Some(plan) = plan {
                state.publish(plan);
            }
        });
    }

    /// Records and broadcasts `plan` before returning, so plans reach
    /// subscribers in the order they are published. A plan older than the
    /// last one published is dropped.
    fn publish(self: &Arc<Self>, plan: TransitionPlan) {
        let version = plan.version;
        let hint_duration = plan.hint_duration;
        {
            let mut latest = self
                .latest_plan
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(current) = latest.as_ref() {
                if current.version > version {
                    debug!(version, current = current.version, "dropping superseded plan");
                    return;
                }
            }
            info!(
                category = %plan.category,
                version,
                entries = plan.entries.len(),
                "leaderboard applied"
            );
            *latest = Some(plan.clone());
            let _ = self.sender.send(StreamEvent::Plan(plan));
        }

        let state = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(hint_duration).await;
            if state.board.lock().await.expire_hints(version) {
                let _ = state.sender.send(StreamEvent::HintsHidden(version));
            }
        });
    }

    pub(crate) fn latest_plan(&self) -> Option<TransitionPlan> {
        self.latest_plan
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) async fn view_status(&self) -> ViewStatusPayload {
        let board = self.board.lock().await;
        ViewStatusPayload {
            category: board.category().clone(),
            phase: board.phase(),
            pending_updates: board.scheduler().pending_count(),
            records: board.records().len(),
        }
    }

    pub(crate) fn broadcast_shutdown(&self) {
        let _ = self.sender.send(StreamEvent::Shutdown);
    }
}
