//! Local stand-in for the `reqres.in` users API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_USERS: &str = "/api/users";
pub const PATH_USER: &str = "/api/users/{id}";
pub const PATH_STATUS: &str = "/status/{code}";
pub const PATH_SLOW: &str = "/slow";

/// Ids served by `GET /api/users/{id}`.
const KNOWN_USERS: std::ops::RangeInclusive<u64> = 1..=12;
const FIRST_CREATED_ID: u64 = 100;

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    users_created: Arc<AtomicU64>,
    users_updated: Arc<AtomicU64>,
    saw_json_content_type: Arc<AtomicU64>,
}

impl TestServerStats {
    fn on_request(&self, headers: &HeaderMap) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().starts_with("application/json"))
        {
            self.saw_json_content_type.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn users_created(&self) -> u64 {
        self.users_created.load(Ordering::Relaxed)
    }

    pub fn users_updated(&self) -> u64 {
        self.users_updated.load(Ordering::Relaxed)
    }

    pub fn saw_json_content_type(&self) -> u64 {
        self.saw_json_content_type.load(Ordering::Relaxed)
    }
}

fn now_rfc3339() -> String {
    humantime::format_rfc3339_millis(SystemTime::now()).to_string()
}

fn parse_object(body: &Bytes) -> Result<Map<String, Value>, (StatusCode, Json<Value>)> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) | Err(_) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "expected a JSON object body" })),
        )),
    }
}

async fn create_user(
    State(stats): State<TestServerStats>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    stats.on_request(&headers);
    let mut user = match parse_object(&body) {
        Ok(user) => user,
        Err(err) => return err,
    };

    let id = FIRST_CREATED_ID + stats.users_created.fetch_add(1, Ordering::Relaxed);
    user.insert("id".to_string(), Value::String(id.to_string()));
    user.insert("createdAt".to_string(), Value::String(now_rfc3339()));
    (StatusCode::CREATED, Json(Value::Object(user)))
}

async fn update_user(
    State(stats): State<TestServerStats>,
    Path(_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    stats.on_request(&headers);
    let mut user = match parse_object(&body) {
        Ok(user) => user,
        Err(err) => return err,
    };

    stats.users_updated.fetch_add(1, Ordering::Relaxed);
    user.insert("updatedAt".to_string(), Value::String(now_rfc3339()));
    (StatusCode::OK, Json(Value::Object(user)))
}

async fn get_user(
    State(stats): State<TestServerStats>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    stats.on_request(&headers);
    if !KNOWN_USERS.contains(&id) {
        return (StatusCode::NOT_FOUND, Json(json!({})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "data": {
                "id": id,
                "email": format!("user{id}@reqres.in"),
                "first_name": "User",
                "last_name": id.to_string(),
            }
        })),
    )
}

async fn delete_user(
    State(stats): State<TestServerStats>,
    Path(_id): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    stats.on_request(&headers);
    StatusCode::NO_CONTENT
}

async fn fixed_status(
    State(stats): State<TestServerStats>,
    Path(code): Path<u16>,
    headers: HeaderMap,
) -> StatusCode {
    stats.on_request(&headers);
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

#[derive(Debug, Deserialize)]
struct SlowQuery {
    ms: Option<u64>,
}

async fn slow(
    State(stats): State<TestServerStats>,
    Query(query): Query<SlowQuery>,
    headers: HeaderMap,
) -> &'static str {
    stats.on_request(&headers);
    sleep(Duration::from_millis(query.ms.unwrap_or(50))).await;
    "slow"
}

pub fn router(stats: TestServerStats) -> Router {
    Router::new()
        .route(PATH_USERS, post(create_user))
        .route(
            PATH_USER,
            get(get_user).put(update_user).delete(delete_user),
        )
        .route(PATH_STATUS, get(fixed_status))
        .route(PATH_SLOW, get(slow))
        .with_state(stats)
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
