mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{create_user, login, send, spawn_app, str_field, user_token};

fn titles(body: &Value) -> Vec<String> {
    let mut titles: Vec<String> = body["data"]
        .as_array()
        .map(|rows| rows.iter().map(|r| str_field(r, "title").to_string()).collect())
        .unwrap_or_default();
    titles.sort();
    titles
}

async fn unread(app: &axum::Router, token: &str) -> Result<i64> {
    let (status, body) = send(app, "GET", "/api/notifications/unread-count", Some(token), None).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(body["count"].as_i64().unwrap_or(-1))
}

#[tokio::test]
async fn users_see_global_and_own_notifications_only() -> Result<()> {
    let t = spawn_app().await?;
    let admin = user_token(&t, "admin@example.org", true, &["admin"]).await?;
    let ama_id = create_user(&t.pool, "ama@example.org", false, &[]).await?;
    let ama = login(&t.app, "ama@example.org").await?;
    let kojo = user_token(&t, "kojo@example.org", false, &[]).await?;
    let ama_uuid: String = sqlx::query_scalar("SELECT uuid FROM users WHERE id = ?")
        .bind(ama_id)
        .fetch_one(&t.pool)
        .await?;

    let (status, global) = send(
        &t.app,
        "POST",
        "/api/notifications/global",
        Some(&admin),
        Some(json!({ "title": "Maintenance", "message": "Portal offline at noon" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "{global}");
    assert_eq!(global["is_global"], true);

    let (status, direct) = send(
        &t.app,
        "POST",
        &format!("/api/notifications/user/{ama_uuid}"),
        Some(&admin),
        Some(json!({ "title": "Your request", "message": "REQ-1 was completed", "metadata": { "sampleID": "REQ-1" } })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "{direct}");

    let (_, body) = send(&t.app, "GET", "/api/notifications", Some(&ama), None).await?;
    assert_eq!(titles(&body), vec!["Maintenance", "Your request"]);
    let (_, body) = send(&t.app, "GET", "/api/notifications", Some(&kojo), None).await?;
    assert_eq!(titles(&body), vec!["Maintenance"]);

    // another user's notification is invisible
    let (status, body) = send(
        &t.app,
        "POST",
        &format!("/api/notifications/{}/read", str_field(&direct, "uuid")),
        Some(&kojo),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");

    // regular users cannot publish
    let (status, _) = send(
        &t.app,
        "POST",
        "/api/notifications/global",
        Some(&kojo),
        Some(json!({ "title": "Spam", "message": "..." })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/notifications/user/00000000-0000-0000-0000-000000000000",
        Some(&admin),
        Some(json!({ "title": "Lost", "message": "nobody" })),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn read_receipts_are_per_user_and_idempotent() -> Result<()> {
    let t = spawn_app().await?;
    let admin = user_token(&t, "admin@example.org", true, &["admin"]).await?;
    let ama = user_token(&t, "ama@example.org", false, &[]).await?;
    let kojo = user_token(&t, "kojo@example.org", false, &[]).await?;

    let mut uuids = Vec::new();
    for title in ["One", "Two", "Three"] {
        let (_, body) = send(
            &t.app,
            "POST",
            "/api/notifications/global",
            Some(&admin),
            Some(json!({ "title": title, "message": "hello" })),
        )
        .await?;
        uuids.push(str_field(&body, "uuid").to_string());
    }
    assert_eq!(unread(&t.app, &ama).await?, 3);

    let read_uri = format!("/api/notifications/{}/read", uuids[0]);
    let (status, body) = send(&t.app, "POST", &read_uri, Some(&ama), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Notification marked as read");
    let (_, body) = send(&t.app, "POST", &read_uri, Some(&ama), None).await?;
    assert_eq!(body["message"], "Already marked as read");

    assert_eq!(unread(&t.app, &ama).await?, 2);
    assert_eq!(unread(&t.app, &kojo).await?, 3, "reads do not leak across users");

    let (_, body) = send(&t.app, "GET", "/api/notifications", Some(&ama), None).await?;
    assert_eq!(titles(&body), vec!["Three", "Two"]);
    let (_, body) = send(&t.app, "GET", "/api/notifications?include_read=true", Some(&ama), None).await?;
    assert_eq!(titles(&body), vec!["One", "Three", "Two"]);

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/notifications/mark-multiple-read",
        Some(&ama),
        Some(json!({ "notification_ids": [uuids[1], "missing-uuid"] })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], 1);
    assert_eq!(body["failed"], 1);

    let (status, _) = send(&t.app, "POST", "/api/notifications/mark-all-read", Some(&kojo), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unread(&t.app, &kojo).await?, 0);
    assert_eq!(unread(&t.app, &ama).await?, 1);
    Ok(())
}
