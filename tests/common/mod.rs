#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::{self, Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

use transparency_portal::acl::Acl;
use transparency_portal::app::{build_router, AppState};
use transparency_portal::config::AppConfig;
use transparency_portal::jwt::JwtConfig;
use transparency_portal::utils::hash_password;

pub const PASSWORD: &str = "password123";

/// A migrated temp database and the router built on it. Keep `dir` alive for the test.
pub struct TestApp {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub app: Router,
}

pub async fn migrated_pool(dir: &TempDir) -> Result<SqlitePool> {
    migrated_pool_with(dir, 10).await
}

pub async fn migrated_pool_with(dir: &TempDir, max_connections: u32) -> Result<SqlitePool> {
    let db_path = dir.path().join("test.db");
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(opts)
        .await?;

    let migrator =
        sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;
    Ok(pool)
}

/// Fresh database with the default roles and permissions seeded.
pub async fn spawn_app() -> Result<TestApp> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let pool = migrated_pool(&dir).await?;
    transparency_portal::seed::seed_acl(&pool).await?;

    let config = AppConfig {
        storage_root: dir.path().join("storage"),
        ..AppConfig::default()
    };
    let jwt = JwtConfig {
        secret: std::sync::Arc::new(b"test-secret".to_vec()),
        exp_hours: 1,
    };
    let app = build_router(AppState::new(pool.clone(), jwt, config));
    Ok(TestApp { dir, pool, app })
}

/// Inserts an active, verified user and grants `roles`. Returns the internal id.
pub async fn create_user(pool: &SqlitePool, email: &str, is_admin: bool, roles: &[&str]) -> Result<i64> {
    let now = Utc::now();
    let id = sqlx::query(
        "INSERT INTO users (uuid, full_name, email, password, is_admin, is_active, email_verified_at, created_at, updated_at) VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind("Test User")
    .bind(email)
    .bind(hash_password(PASSWORD)?)
    .bind(is_admin)
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?
    .last_insert_rowid();

    let acl = Acl::new(pool.clone());
    for role in roles {
        acl.assign_role(id, role).await?;
    }
    Ok(id)
}

pub async fn login(app: &Router, email: &str) -> Result<String> {
    let (status, body) = send(
        app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": email, "password": PASSWORD })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    Ok(body
        .get("access_token")
        .and_then(Value::as_str)
        .context("missing access_token")?
        .to_string())
}

/// Creates a user and logs it in.
pub async fn user_token(t: &TestApp, email: &str, is_admin: bool, roles: &[&str]) -> Result<String> {
    create_user(&t.pool, email, is_admin, roles).await?;
    login(&t.app, email).await
}

pub async fn send_raw(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, HeaderMap, Bytes)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    Ok((status, headers, bytes))
}

/// Sends a request and parses the body as JSON (`Null` when empty).
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let (status, _, bytes) = send_raw(app, method, uri, token, body).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .with_context(|| format!("non-JSON body: {}", String::from_utf8_lossy(&bytes)))?
    };
    Ok((status, value))
}

pub fn complaint_body(full_name: &str) -> Value {
    json!({
        "type": "Excessive Delay in Report",
        "date_of_incident": "2025-02-14",
        "description": "No response after 30 days.",
        "full_name": full_name,
        "email": "citizen@example.org"
    })
}

pub fn request_body(name: &str) -> Value {
    json!({
        "name_of_applicant": name,
        "date_of_birth": "1990-04-12",
        "address": "12 Independence Ave",
        "telephone_number": "0200000000",
        "email": "applicant@example.org",
        "type_of_applicant": "individual",
        "description_of_information": "Budget allocations for 2024",
        "manner_of_access": "copy",
        "form_of_access": "electronic_copy",
        "date_of_submission": "2025-03-01"
    })
}

pub fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Registers a media row without touching storage. Returns its uuid.
pub async fn insert_media(pool: &SqlitePool, name: &str) -> Result<String> {
    let uuid = Uuid::new_v4().to_string();
    let now = Utc::now();
    sqlx::query("INSERT INTO media (uuid, name, path, mime, size, created_at, updated_at) VALUES (?, ?, ?, 'application/pdf', 1024, ?, ?)")
        .bind(&uuid)
        .bind(name)
        .bind(format!("media/test/{uuid}-{name}"))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(uuid)
}

pub fn resource_body(title: &str, media_uuid: &str) -> Value {
    json!({
        "title": title,
        "description": "Annual access to information report",
        "category": "reports",
        "type": "guides_manuals",
        "file": media_uuid
    })
}
