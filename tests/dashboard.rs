mod common;

use anyhow::Result;
use axum::http::StatusCode;
use chrono::{Duration, Utc};

use common::{complaint_body, request_body, send, spawn_app, user_token};

#[tokio::test]
async fn daily_window_compares_with_the_previous_day() -> Result<()> {
    let t = spawn_app().await?;
    let root = user_token(&t, "root@example.org", true, &["super-admin"]).await?;

    for name in ["Abena", "Bashir"] {
        send(&t.app, "POST", "/api/complaints", None, Some(complaint_body(name))).await?;
    }
    send(&t.app, "POST", "/api/requests", None, Some(request_body("Chidi"))).await?;

    // one complaint from long ago only counts toward the totals
    let old = Utc::now() - Duration::days(90);
    sqlx::query("UPDATE complaints SET created_at = ? WHERE full_name = 'Bashir'")
        .bind(old)
        .execute(&t.pool)
        .await?;

    let (status, body) = send(&t.app, "GET", "/api/dashboard?period=daily", Some(&root), None).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["period"], "daily");
    assert_eq!(body["complaints"]["current"], 1);
    assert_eq!(body["complaints"]["previous"], 0);
    assert_eq!(body["complaints"]["change"], 100.0);
    assert_eq!(body["requests"]["current"], 1);
    assert_eq!(body["documents"]["current"], 0);
    assert_eq!(body["documents"]["change"], 0.0);
    assert_eq!(body["totals"]["complaints"], 2);
    assert_eq!(body["series"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["recent_complaints"][0]["full_name"], "Abena");
    Ok(())
}

#[tokio::test]
async fn periods_set_the_series_length() -> Result<()> {
    let t = spawn_app().await?;
    let root = user_token(&t, "root@example.org", true, &["super-admin"]).await?;

    let (_, body) = send(&t.app, "GET", "/api/dashboard?period=weekly", Some(&root), None).await?;
    assert_eq!(body["series"].as_array().map(Vec::len), Some(7));

    let (_, body) = send(&t.app, "GET", "/api/dashboard", Some(&root), None).await?;
    assert_eq!(body["period"], "monthly");
    assert_eq!(body["series"].as_array().map(Vec::len), Some(30));

    let (status, body) = send(
        &t.app,
        "GET",
        "/api/dashboard?period=custom&start_date=2025-01-01&end_date=2025-01-10",
        Some(&root),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["start_date"], "2025-01-01");
    assert_eq!(body["series"].as_array().map(Vec::len), Some(10));
    assert_eq!(body["series"][0]["complaints"], 0);
    Ok(())
}

#[tokio::test]
async fn custom_period_needs_an_ordered_range() -> Result<()> {
    let t = spawn_app().await?;
    let root = user_token(&t, "root@example.org", true, &["super-admin"]).await?;

    for uri in [
        "/api/dashboard?period=custom",
        "/api/dashboard?period=custom&start_date=2025-02-01&end_date=2025-01-01",
        "/api/dashboard?period=custom&start_date=01/02/2025&end_date=2025-03-01",
        "/api/dashboard?period=custom&start_date=-262143-01-01&end_date=2025-03-01",
        "/api/dashboard?period=custom&start_date=0001-01-01&end_date=9999-12-31",
    ] {
        let (status, _) = send(&t.app, "GET", uri, Some(&root), None).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
    }

    let admin = user_token(&t, "admin@example.org", true, &["admin"]).await?;
    let (status, _) = send(&t.app, "GET", "/api/dashboard", Some(&admin), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}
