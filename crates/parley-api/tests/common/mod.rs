//! Shared helpers for service and RPC integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use parley_api::bridge::Bridge;
use parley_api::rpc;
use parley_api::{AppState, AppStateInner, ServiceConfig};
use parley_db::Database;
use parley_gateway::Broker;
use parley_types::events::{Event, EventKind};

/// A service over a throwaway database. Keep it alive for the whole test.
pub struct TestService {
    pub state: AppState,
    _dir: TempDir,
}

/// Replies `"Keep going: <prompt>"` and counts calls.
#[derive(Default)]
pub struct EchoBridge {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Bridge for EchoBridge {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("Keep going: {prompt}"))
    }
}

/// Always fails, like an unreachable endpoint.
pub struct FailingBridge;

#[async_trait]
impl Bridge for FailingBridge {
    async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
        anyhow::bail!("connection refused")
    }
}

/// Answers only after the given delay.
pub struct SlowBridge(pub Duration);

#[async_trait]
impl Bridge for SlowBridge {
    async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
        tokio::time::sleep(self.0).await;
        Ok("too late".into())
    }
}

/// Runs `sql` on its own connection to the store while "generating", as if
/// another process changed things mid-call.
pub struct SqlBridge {
    pub db_path: PathBuf,
    pub sql: &'static str,
}

#[async_trait]
impl Bridge for SqlBridge {
    async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
        let conn = rusqlite::Connection::open(&self.db_path)?;
        conn.execute_batch(self.sql)?;
        Ok("changed underneath".into())
    }
}

/// Takes an exclusive write lock on the store from another connection and
/// holds it for `hold` after answering.
pub struct LockingBridge {
    pub db_path: PathBuf,
    pub hold: Duration,
}

#[async_trait]
impl Bridge for LockingBridge {
    async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
        let path = self.db_path.clone();
        let hold = self.hold;
        let (locked_tx, locked_rx) = tokio::sync::oneshot::channel();
        std::thread::spawn(move || {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch("BEGIN EXCLUSIVE").unwrap();
            let _ = locked_tx.send(());
            std::thread::sleep(hold);
            let _ = conn.execute_batch("ROLLBACK");
        });
        locked_rx.await?;
        Ok("locked out".into())
    }
}

pub fn db_file(dir: &Path) -> PathBuf {
    dir.join("parley.db")
}

pub fn service() -> TestService {
    service_with(Arc::new(EchoBridge::default()), ServiceConfig::default())
}

pub fn service_with(bridge: Arc<dyn Bridge>, config: ServiceConfig) -> TestService {
    let dir = TempDir::new().expect("Failed to create temp dir");
    service_in(dir, bridge, config)
}

/// Like [`service_with`], over a directory the caller already knows.
pub fn service_in(dir: TempDir, bridge: Arc<dyn Bridge>, config: ServiceConfig) -> TestService {
    let db = Database::open(&db_file(dir.path())).expect("Failed to open database");
    let state = Arc::new(AppStateInner::new(db, Broker::new(), bridge, config));
    TestService { state, _dir: dir }
}

/// Register and log in; returns (user id, session token).
pub async fn signup(state: &AppState, email: &str, name: &str) -> (i64, String) {
    state.register_user(email, name, "correct horse").await.unwrap();
    let session = state.login(email, "correct horse").await.unwrap();
    (session.user_id, session.token)
}

/// Register without logging in; returns the user id.
pub async fn register(state: &AppState, email: &str, name: &str) -> i64 {
    state.register_user(email, name, "correct horse").await.unwrap()
}

/// Run a `SELECT COUNT(*) ...`-style scalar query.
pub fn scalar(state: &AppState, sql: &str) -> i64 {
    state
        .db
        .with_conn(|conn| -> anyhow::Result<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) })
        .unwrap()
}

/// Every event in `user_id`'s log.
pub async fn all_events(state: &AppState, user_id: i64) -> Vec<Event> {
    state.events_since(user_id, 0).await.unwrap()
}

pub async fn events_of_kind(state: &AppState, user_id: i64, kind: EventKind) -> Vec<Event> {
    all_events(state, user_id)
        .await
        .into_iter()
        .filter(|e| e.kind == kind)
        .collect()
}

/// The full RPC router over `state`, as the binary mounts it.
pub fn app(state: &AppState) -> Router {
    rpc::router(state.clone())
}

/// POST a JSON body and return the status and decoded reply.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();
    send(app, request).await
}

pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}
