use std::convert::Infallible;
use std::sync::Arc;

use async_stream::stream;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rep_leaderboard::{Category, TransitionPlan};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::models::{
    CategoryRequest, HintsHiddenPayload, LeaderboardParams, LeaderboardPayload, RefreshParams,
    RefreshPayload, SubmissionAccepted, SubmissionRequest,
};
use crate::state::{AppState, StreamEvent};
use crate::util::{now_ms, parse_bool};

pub(crate) async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub(crate) async fn leaderboard_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeaderboardParams>,
) -> Response {
    let requested = params.category.as_deref().and_then(Category::parse);
    let (category, phase, entries) = {
        let board = state.board.lock().await;
        let category = requested.unwrap_or_else(|| board.category().clone());
        let entries = board.displayed(&category).to_vec();
        (category, board.phase(), entries)
    };
    let last_plan = state
        .latest_plan()
        .filter(|plan| plan.category == category);

    json_response(&LeaderboardPayload {
        category,
        phase,
        entries,
        last_plan,
        ts: now_ms(),
    })
}

pub(crate) async fn open_view_handler(State(state): State<Arc<AppState>>) -> Response {
    let events = state.board.lock().await.open();
    state.dispatch(events);
    state.spawn_refresh(true);
    json_response(&state.view_status().await)
}

pub(crate) async fn close_view_handler(State(state): State<Arc<AppState>>) -> Response {
    state.board.lock().await.close();
    json_response(&state.view_status().await)
}

pub(crate) async fn category_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CategoryRequest>,
) -> Response {
    let category = match Category::parse(&request.category) {
        Some(category) if Category::SWITCHABLE.contains(&category) => category,
        _ => {
            let allowed: Vec<String> = Category::SWITCHABLE
                .iter()
                .map(|category| category.to_string())
                .collect();
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("category must be one of {}", allowed.join(", ")),
            );
        }
    };

    let event = state.board.lock().await.switch_category(category);
    if let Some(event) = event {
        state.dispatch(vec![event]);
    }
    state.spawn_refresh(true);
    json_response(&state.view_status().await)
}

pub(crate) async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RefreshParams>,
) -> Response {
    let force = params
        .force
        .as_deref()
        .map(|value| value.trim().is_empty() || parse_bool(value).unwrap_or(false))
        .unwrap_or(false);
    let rows = state.refresh(force).await;
    json_response(&RefreshPayload {
        refreshed: rows.is_some(),
        rows,
    })
}

pub(crate) async fn submission_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmissionRequest>,
) -> Response {
    let submission = match request.into_submission() {
        Ok(submission) => submission,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    let signature = state.board.lock().await.prepare_submission(&submission);
    if let Err(err) = state.coordinator.submit(&submission).await {
        warn!(kind = err.kind(), %err, "submission rejected by data source");
        state.board.lock().await.abandon_submission(&signature);
        return error_response(StatusCode::BAD_GATEWAY, err.to_string());
    }

    info!(signature = %signature, score = submission.score, "submission recorded");
    state.spawn_refresh(true);
    json_response(&SubmissionAccepted { signature })
}

pub(crate) async fn options_handler() -> impl IntoResponse {
    (StatusCode::NO_CONTENT, cors_headers())
}

pub(crate) async fn leaderboard_stream(State(state): State<Arc<AppState>>) -> Response {
    let stream_state = Arc::clone(&state);
    let heartbeat = state.config.heartbeat;

    let stream = stream! {
        let mut rx = stream_state.sender.subscribe();

        yield Ok::<_, Infallible>(Event::default().comment("stream-open"));

        if let Some(plan) = stream_state.latest_plan() {
            if let Some(event) = plan_event(&plan) {
                yield Ok::<_, Infallible>(event);
            }
        }

        loop {
            match rx.recv().await {
                Ok(StreamEvent::Plan(plan)) => {
                    if let Some(event) = plan_event(&plan) {
                        yield Ok::<_, Infallible>(event);
                    }
                }
                Ok(StreamEvent::HintsHidden(version)) => {
                    if let Some(event) = json_event("hints-hidden", &HintsHiddenPayload { version }) {
                        yield Ok::<_, Infallible>(event);
                    }
                }
                Ok(StreamEvent::Shutdown) => break,
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    warn!("leaderboard-stream lagged; skipping messages");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    let sse = Sse::new(stream).keep_alive(KeepAlive::new().interval(heartbeat).text("heartbeat"));
    let mut response = sse.into_response();
    apply_stream_headers(&mut response);
    response
}

fn plan_event(plan: &TransitionPlan) -> Option<Event> {
    json_event("plan", plan)
}

fn json_event<T: Serialize>(name: &str, payload: &T) -> Option<Event> {
    match serde_json::to_string(payload) {
        Ok(json) => Some(Event::default().event(name).data(json)),
        Err(err) => {
            warn!(?err, event = name, "failed to serialize stream event");
            None
        }
    }
}

fn json_response<T: Serialize>(payload: &T) -> Response {
    let body = match serde_json::to_string(payload) {
        Ok(body) => body,
        Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    };
    let mut headers = cors_headers();
    headers.insert("Content-Type", HeaderValue::from_static("application/json"));
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    (StatusCode::OK, headers, body).into_response()
}

fn error_response(status: StatusCode, message: String) -> Response {
    let headers = cors_headers();
    (status, headers, message).into_response()
}

fn cors_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Content-Type"),
    );
    headers
}

fn apply_stream_headers(response: &mut Response) {
    let headers = response.headers_mut();
    headers.extend(cors_headers());
    headers.insert(
        "Cache-Control",
        HeaderValue::from_static("no-cache, no-transform"),
    );
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));
    headers.insert("X-Accel-Buffering", HeaderValue::from_static("no"));
}
