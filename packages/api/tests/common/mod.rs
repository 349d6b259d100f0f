#![allow(dead_code, clippy::disallowed_methods)]

use std::sync::LazyLock;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use tokio::sync::{Mutex, MutexGuard};
use tower::ServiceExt;

use api::{Producer, ServerConfig};
use db::repositories::ReadinessRepository;
use db::{DbConfig, DbError};
use storage::{Storage, StorageConfig, StorageError};

pub const REPLICA: &str = "replica-test";

static TEST_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub async fn setup_db() -> Result<MutexGuard<'static, ()>, DbError> {
    let guard = TEST_LOCK.lock().await;
    db::init(DbConfig::memory()).await?;
    let db_conn = db::get_db()?;
    db_conn
        .query("DELETE pending; DELETE job; DELETE readiness;")
        .await?;
    Ok(guard)
}

/// Open the readiness gate as a worker would.
pub async fn open_gate() -> Result<(), DbError> {
    ReadinessRepository::mark_building("test-session").await?;
    ReadinessRepository::mark_ready("test-session").await?;
    Ok(())
}

pub async fn memory_storage() -> Result<Storage, StorageError> {
    Storage::new(StorageConfig::memory()).await
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        replica_id: REPLICA.to_string(),
        request_timeout_secs: 30,
    }
}

/// Build the application router exactly as the producer binary does.
pub fn build_test_app(storage: Storage) -> Router {
    api::build_app(Producer::new(REPLICA, storage), test_config())
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, json: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
