mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{send, spawn_app, str_field, PASSWORD};

async fn stored_otp(pool: &sqlx::SqlitePool, email: &str, column: &str) -> Result<String> {
    let sql = format!("SELECT {column} FROM users WHERE email = ?");
    let otp: Option<String> = sqlx::query_scalar(&sql).bind(email).fetch_one(pool).await?;
    Ok(otp.unwrap_or_default())
}

#[tokio::test]
async fn signup_then_verify_email() -> Result<()> {
    let t = spawn_app().await?;

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/auth/signup",
        None,
        Some(json!({ "full_name": "Ada Lovelace", "email": "Ada@Example.org", "password": PASSWORD })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["user"]["email"], "ada@example.org");
    assert!(body["user"]["email_verified_at"].is_null());
    assert!(!str_field(&body, "access_token").is_empty());

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/auth/verify-otp",
        None,
        Some(json!({ "email": "ada@example.org", "otp": "000000x" })),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_ACCEPTABLE);

    let otp = stored_otp(&t.pool, "ada@example.org", "otp").await?;
    assert_eq!(otp.len(), 6);

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/auth/verify-otp",
        None,
        Some(json!({ "email": "ada@example.org", "otp": otp })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(!body["email_verified_at"].is_null());

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/auth/verify-otp",
        None,
        Some(json!({ "email": "ada@example.org", "otp": otp })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn signup_rejects_duplicates_and_short_passwords() -> Result<()> {
    let t = spawn_app().await?;
    common::create_user(&t.pool, "taken@example.org", false, &[]).await?;

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/auth/signup",
        None,
        Some(json!({ "email": "TAKEN@example.org", "password": PASSWORD })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/auth/signup",
        None,
        Some(json!({ "email": "new@example.org", "password": "short" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");

    let (status, body) = send(&t.app, "GET", "/api/auth/username/is-available?email=taken@example.org", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], false);
    Ok(())
}

#[tokio::test]
async fn login_failures_are_distinguished() -> Result<()> {
    let t = spawn_app().await?;
    let id = common::create_user(&t.pool, "kim@example.org", false, &[]).await?;

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": "nobody@example.org", "password": PASSWORD })),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": "kim@example.org", "password": "wrong-password" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?")
        .bind(id)
        .execute(&t.pool)
        .await?;
    let (status, _) = send(
        &t.app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": "kim@example.org", "password": PASSWORD })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn logout_revokes_the_token() -> Result<()> {
    let t = spawn_app().await?;
    let token = common::user_token(&t, "lee@example.org", true, &["admin"]).await?;

    let (status, body) = send(&t.app, "GET", "/api/auth/authenticated", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "lee@example.org");
    assert!(body["roles"].as_array().is_some_and(|r| r.iter().any(|s| s == "admin")));

    let (status, _) = send(&t.app, "POST", "/api/auth/logout", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&t.app, "GET", "/api/auth/authenticated", Some(&token), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&t.app, "GET", "/api/auth/authenticated", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn password_reset_with_otp() -> Result<()> {
    let t = spawn_app().await?;
    common::create_user(&t.pool, "rui@example.org", false, &[]).await?;

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/auth/send-reset-password-otp",
        None,
        Some(json!({ "email": "rui@example.org" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let otp = stored_otp(&t.pool, "rui@example.org", "reset_password_otp").await?;
    let (status, _) = send(
        &t.app,
        "POST",
        "/api/auth/verify-reset-password-otp",
        None,
        Some(json!({ "email": "rui@example.org", "otp": otp })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/auth/reset-password",
        None,
        Some(json!({
            "email": "rui@example.org",
            "otp": otp,
            "password": "brand-new-secret",
            "confirm_password": "brand-new-secret"
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": "rui@example.org", "password": "brand-new-secret" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    // the code is single use
    let (status, _) = send(
        &t.app,
        "POST",
        "/api/auth/verify-reset-password-otp",
        None,
        Some(json!({ "email": "rui@example.org", "otp": otp })),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
    Ok(())
}
