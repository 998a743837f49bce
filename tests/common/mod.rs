//! Common test utilities
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use sqlx::{Executor, PgPool};
use tokio::sync::OnceCell;
use tower::util::ServiceExt;

use coin_shop::api::{build_router, AppState};
use coin_shop::auth::{PasswordHasher, TokenManager};
use coin_shop::domain::{Balance, Catalog};
use coin_shop::store::{LedgerStore, MemoryStore, PgStore};

pub const JWT_SECRET: &str = "integration-test-secret";
pub const INITIAL_COINS: i64 = 1000;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

static MIGRATED: OnceCell<()> = OnceCell::const_new();

/// Full router over the given store
pub fn app_with<S: LedgerStore + 'static>(store: Arc<S>) -> Router {
    let state = AppState::new(
        store,
        Arc::new(Catalog::merch()),
        Arc::new(TokenManager::new(JWT_SECRET, 3600)),
        PasswordHasher::new(8, 1, 1),
        Balance::new(INITIAL_COINS).unwrap(),
    );
    build_router(state, &["*".to_string()])
}

/// Full router over a fresh in-memory store
pub fn memory_app() -> Router {
    app_with(Arc::new(MemoryStore::new()))
}

/// Send a request and decode the JSON body (`Value::Null` when empty or not JSON)
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// Log in (registering on first use) and return the bearer token
pub async fn login(app: &Router, username: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/auth",
        None,
        Some(serde_json::json!({ "username": username, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["token"].as_str().unwrap().to_string()
}

/// Connect to the test database, creating the schema once per test binary.
/// Returns `None` when `DATABASE_URL` is not set so callers can skip.
pub async fn try_pg_pool() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    MIGRATED
        .get_or_init(|| async {
            pool.execute(SCHEMA).await.expect("Failed to apply schema");
        })
        .await;

    Some(pool)
}

pub async fn try_pg_store() -> Option<Arc<PgStore>> {
    try_pg_pool().await.map(|pool| Arc::new(PgStore::new(pool)))
}

/// Username unique across test runs against a shared database
pub fn unique_name(prefix: &str) -> String {
    format!("{prefix}_{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
}
