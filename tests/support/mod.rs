#![allow(dead_code)]

use std::net::SocketAddr;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use portpicker::pick_unused_port;
use reqwest::Client;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::sleep;

pub struct TestServer {
    child: Child,
    base_url: String,
}

impl TestServer {
    pub async fn spawn() -> Self {
        Self::spawn_with(&[]).await
    }

    pub async fn spawn_with(envs: &[(&str, &str)]) -> Self {
        let port = pick_unused_port().expect("free port");
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("rep-leaderboard"));
        cmd.env("PORT", port.to_string())
            .env("DISABLE_BACKGROUND_TASKS", "1")
            .env("SOURCE_URL", "http://127.0.0.1:1/rows")
            .env("REQUEST_TIMEOUT_MS", "500")
            .env_remove("SESSION_CACHE_PATH")
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        for (key, value) in envs {
            cmd.env(key, value);
        }

        let child = cmd.spawn().expect("spawn rep-leaderboard");
        let base_url = format!("http://127.0.0.1:{}", port);
        wait_for_ready(&base_url).await;

        Self { child, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// In-process stand-in for the row store: GET returns the rows newest first,
/// POST unwraps the `data` envelope and prepends it.
#[derive(Clone)]
pub struct FakeSource {
    rows: Arc<Mutex<Vec<Value>>>,
    url: String,
}

impl FakeSource {
    pub async fn spawn(rows: Vec<Value>) -> Self {
        let rows = Arc::new(Mutex::new(rows));
        let app = Router::new()
            .route("/rows", get(list_rows).post(append_row))
            .with_state(Arc::clone(&rows));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake source");
        let addr: SocketAddr = listener.local_addr().expect("fake source addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            rows,
            url: format!("http://{}/rows", addr),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn rows(&self) -> Vec<Value> {
        self.rows.lock().expect("rows lock").clone()
    }
}

async fn list_rows(State(rows): State<Arc<Mutex<Vec<Value>>>>) -> Json<Value> {
    let rows = rows.lock().expect("rows lock").clone();
    Json(Value::Array(rows))
}

async fn append_row(
    State(rows): State<Arc<Mutex<Vec<Value>>>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let row = body.get("data").cloned().unwrap_or(Value::Null);
    rows.lock().expect("rows lock").insert(0, row);
    Json(serde_json::json!({ "status": "OK" }))
}

async fn wait_for_ready(base_url: &str) {
    let client = Client::new();
    let health_url = format!("{}/health", base_url);
    for _ in 0..50 {
        if let Ok(response) = client.get(&health_url).send().await {
            if response.status().is_success() {
                return;
            }
        }
        sleep(Duration::from_millis(100)).await;
    }
    panic!("server did not become ready at {}", health_url);
}
