use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;
use tracing::info;

use crate::handlers::{
    category_handler, close_view_handler, health_handler, leaderboard_handler,
    leaderboard_stream, open_view_handler, options_handler, refresh_handler, submission_handler,
};
use crate::state::AppState;

pub(crate) fn build_router(state: Arc<AppState>, static_dir: String) -> Router {
    Router::new()
        .route(
            "/api/leaderboard",
            get(leaderboard_handler).options(options_handler),
        )
        .route(
            "/api/leaderboard-stream",
            get(leaderboard_stream).options(options_handler),
        )
        .route(
            "/api/view/open",
            post(open_view_handler).options(options_handler),
        )
        .route(
            "/api/view/close",
            post(close_view_handler).options(options_handler),
        )
        .route(
            "/api/category",
            post(category_handler).options(options_handler),
        )
        .route(
            "/api/refresh",
            post(refresh_handler).options(options_handler),
        )
        .route(
            "/api/submissions",
            post(submission_handler).options(options_handler),
        )
        .route("/health", get(health_handler))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
        .layer(middleware::from_fn(log_request))
}

async fn log_request(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req
        .uri()
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or_else(|| req.uri().path())
        .to_string();
    let remote_ip = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip().to_string())
        })
        .unwrap_or_else(|| "-".to_string());
    let start = Instant::now();
    let response = next.run(req).await;
    let status = response.status().as_u16();
    let elapsed = start.elapsed();
    info!(
        remote_ip = %remote_ip,
        method = %method,
        uri = %uri,
        status,
        elapsed_ms = elapsed.as_millis(),
        "request served"
    );
    response
}
