mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{insert_media, resource_body, send, spawn_app, str_field, user_token};

#[tokio::test]
async fn resource_edit_needs_admin_flag_and_capability() -> Result<()> {
    let t = spawn_app().await?;
    let root = user_token(&t, "root@example.org", true, &["super-admin"]).await?;
    let flag_only = user_token(&t, "flag@example.org", true, &[]).await?;
    let editor_only = user_token(&t, "editor@example.org", false, &["editor"]).await?;
    let admin_editor = user_token(&t, "both@example.org", true, &["editor"]).await?;

    let media = insert_media(&t.pool, "report.pdf").await?;
    let (status, created) = send(&t.app, "POST", "/api/resources", Some(&root), Some(resource_body("Annual report", &media))).await?;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let uri = format!("/api/resources/{}", str_field(&created, "uuid"));
    let update = json!({ "title": "Annual report 2025" });

    let (status, _) = send(&t.app, "PUT", &uri, Some(&flag_only), Some(update.clone())).await?;
    assert_eq!(status, StatusCode::FORBIDDEN, "admin flag without edit-resource");

    let (status, _) = send(&t.app, "PUT", &uri, Some(&editor_only), Some(update.clone())).await?;
    assert_eq!(status, StatusCode::FORBIDDEN, "edit-resource without admin flag");

    let (status, body) = send(&t.app, "PUT", &uri, Some(&admin_editor), Some(update)).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["title"], "Annual report 2025");

    // editors may not delete
    let (status, _) = send(&t.app, "DELETE", &uri, Some(&admin_editor), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&t.app, "DELETE", &uri, Some(&root), None).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn missing_token_is_unauthorized() -> Result<()> {
    let t = spawn_app().await?;
    for uri in ["/api/complaints", "/api/requests", "/api/users", "/api/dashboard", "/api/notifications"] {
        let (status, _) = send(&t.app, "GET", uri, None, None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
    }

    let (status, _) = send(&t.app, "GET", "/api/complaints", Some("not-a-jwt"), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn admin_only_routes_reject_regular_users() -> Result<()> {
    let t = spawn_app().await?;
    let citizen = user_token(&t, "citizen@example.org", false, &[]).await?;
    let admin = user_token(&t, "admin@example.org", true, &["admin"]).await?;

    let (status, _) = send(&t.app, "GET", "/api/complaints", Some(&citizen), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&t.app, "GET", "/api/complaints", Some(&admin), None).await?;
    assert_eq!(status, StatusCode::OK);

    // news administration is limited to the super-admin role
    let (status, _) = send(&t.app, "GET", "/api/news", Some(&admin), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn settings_need_role_and_settings_capability() -> Result<()> {
    let t = spawn_app().await?;
    let root = user_token(&t, "root@example.org", true, &["super-admin"]).await?;
    let admin = user_token(&t, "admin@example.org", true, &["admin"]).await?;

    // the seeded admin role carries no settings permissions
    let (status, _) = send(&t.app, "GET", "/api/settings", Some(&admin), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/settings",
        Some(&root),
        Some(json!({ "key": "site_name", "value": "Open Portal" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/settings",
        Some(&root),
        Some(json!({ "key": "site_name", "value": "Portal" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&t.app, "GET", "/api/settings/json", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["site_name"], "Portal");
    Ok(())
}
