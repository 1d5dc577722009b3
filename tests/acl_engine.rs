mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use transparency_portal::acl::{Acl, Subject};
use transparency_portal::seed::seed_acl;

use common::{create_user, insert_media, resource_body, send, spawn_app, str_field, user_token};

async fn user_uuid(pool: &sqlx::SqlitePool, id: i64) -> Result<String> {
    Ok(sqlx::query_scalar("SELECT uuid FROM users WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?)
}

#[tokio::test]
async fn seeding_twice_creates_nothing_new() -> Result<()> {
    let t = spawn_app().await?;
    let again = seed_acl(&t.pool).await?;
    assert_eq!(again.permissions_created, 0);
    assert_eq!(again.roles_created, 0);
    assert_eq!(again.grants_created, 0);
    Ok(())
}

#[tokio::test]
async fn effective_permissions_union_roles_and_direct_grants() -> Result<()> {
    let t = spawn_app().await?;
    let acl = Acl::new(t.pool.clone());
    let id = create_user(&t.pool, "mix@example.org", true, &["viewer"]).await?;

    assert!(acl.has_permission(id, "view-complaints").await?);
    assert!(!acl.has_permission(id, "edit-complaint").await?);

    assert!(acl.allow(Subject::User(id), "edit-complaint").await?);
    assert!(!acl.allow(Subject::User(id), "edit-complaint").await?, "second grant is a no-op");
    assert!(acl.has_permission(id, "edit-complaint").await?);

    let slugs: Vec<String> = acl.effective_permissions(id).await?.into_iter().map(|p| p.slug).collect();
    let unique: std::collections::HashSet<&String> = slugs.iter().collect();
    assert_eq!(unique.len(), slugs.len(), "no duplicates across sources");

    assert!(acl.revoke_permission(Subject::User(id), "edit-complaint").await?);
    assert!(!acl.revoke_permission(Subject::User(id), "edit-complaint").await?);
    assert!(!acl.has_permission(id, "edit-complaint").await?);

    assert!(acl.revoke_role(id, "viewer").await?);
    assert!(!acl.has_permission(id, "view-complaints").await?);
    Ok(())
}

#[tokio::test]
async fn role_titles_are_unique_and_slugs_are_padded() -> Result<()> {
    let t = spawn_app().await?;
    let root = user_token(&t, "root@example.org", true, &["super-admin"]).await?;

    let (status, first) = send(&t.app, "POST", "/api/roles", Some(&root), Some(json!({ "title": "Admin Team" }))).await?;
    assert_eq!(status, StatusCode::CREATED, "{first}");
    assert_eq!(first["slug"], "admin-team");
    assert_eq!(first["scope"], "default");

    let (status, _) = send(&t.app, "POST", "/api/roles", Some(&root), Some(json!({ "title": "Admin Team" }))).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    // another scope does not make the title available again
    let (status, _) = send(
        &t.app,
        "POST",
        "/api/roles",
        Some(&root),
        Some(json!({ "title": "Admin Team", "scope": "regional" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    // a different title with the same slug gets padded
    let (status, other) = send(
        &t.app,
        "POST",
        "/api/roles",
        Some(&root),
        Some(json!({ "title": "Admin-Team", "scope": "regional" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "{other}");
    assert_eq!(other["slug"], "admin-team-1");
    assert_eq!(other["scope"], "regional");

    let (status, _) = send(&t.app, "POST", "/api/roles", Some(&root), Some(json!({}))).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    Ok(())
}

#[tokio::test]
async fn grants_over_http_change_what_a_user_holds() -> Result<()> {
    let t = spawn_app().await?;
    let root = user_token(&t, "root@example.org", true, &["super-admin"]).await?;
    let target = create_user(&t.pool, "staff@example.org", true, &[]).await?;
    let target_uuid = user_uuid(&t.pool, target).await?;

    let (_, role) = send(&t.app, "POST", "/api/roles", Some(&root), Some(json!({ "title": "Auditors" }))).await?;
    let (_, permission) = send(
        &t.app,
        "POST",
        "/api/permissions",
        Some(&root),
        Some(json!({ "title": "Export Audit Log" })),
    )
    .await?;
    assert_eq!(permission["slug"], "export-audit-log");

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/roles/assign-permission",
        Some(&root),
        Some(json!({ "role_id": role["id"], "permission_id": permission["id"] })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/users/assign-role",
        Some(&root),
        Some(json!({ "user_id": target_uuid, "role_id": role["id"] })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let check = format!("/api/users/{target_uuid}/check-permission?permission=export-audit-log");
    let (status, body) = send(&t.app, "GET", &check, Some(&root), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_permission"], true);

    let (_, body) = send(&t.app, "GET", &format!("/api/users/{target_uuid}/check-role?role=auditors"), Some(&root), None).await?;
    assert_eq!(body["has_role"], true);

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/users/remove-role",
        Some(&root),
        Some(json!({ "user_id": target_uuid, "role_id": role["id"] })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send(&t.app, "GET", &check, Some(&root), None).await?;
    assert_eq!(body["has_permission"], false);

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/users/assign-role",
        Some(&root),
        Some(json!({ "user_id": target_uuid, "role_id": 999_999 })),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&t.app, "GET", &format!("/api/users/{target_uuid}/roles"), Some(&root), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().is_some_and(|roles| roles.is_empty()), "{body}");
    Ok(())
}

#[tokio::test]
async fn revoking_from_a_role_reaches_every_holder() -> Result<()> {
    let t = spawn_app().await?;
    let acl = Acl::new(t.pool.clone());
    let first = create_user(&t.pool, "ed1@example.org", true, &["editor"]).await?;
    let second = create_user(&t.pool, "ed2@example.org", true, &["editor"]).await?;
    let editor = acl.role_by_slug("editor").await?;

    assert!(acl.has_permission(first, "edit-news").await?);
    assert!(acl.revoke_permission(Subject::Role(editor.id), "edit-news").await?);
    assert!(!acl.revoke_permission(Subject::Role(editor.id), "edit-news").await?);
    for user in [first, second] {
        assert!(!acl.has_permission(user, "edit-news").await?);
        assert!(acl.has_role(user, "editor").await?, "membership is untouched");
        assert!(acl.has_permission(user, "view-news").await?);
    }

    // a direct grant survives the role losing the permission
    assert!(acl.allow(Subject::User(second), "edit-news").await?);
    assert!(acl.has_permission(second, "edit-news").await?);
    assert!(!acl.has_permission(first, "edit-news").await?);
    Ok(())
}

#[tokio::test]
async fn removing_a_role_permission_closes_the_route() -> Result<()> {
    let t = spawn_app().await?;
    let root = user_token(&t, "root@example.org", true, &["super-admin"]).await?;
    let editor = user_token(&t, "editor@example.org", true, &["editor"]).await?;
    let media = insert_media(&t.pool, "plan.pdf").await?;

    let (status, resource) = send(&t.app, "POST", "/api/resources", Some(&root), Some(resource_body("Plan", &media))).await?;
    assert_eq!(status, StatusCode::CREATED, "{resource}");
    let uri = format!("/api/resources/{}", str_field(&resource, "uuid"));

    let (status, _) = send(&t.app, "PUT", &uri, Some(&editor), Some(json!({ "title": "Plan v2" }))).await?;
    assert_eq!(status, StatusCode::OK);

    let acl = Acl::new(t.pool.clone());
    let role = acl.role_by_slug("editor").await?;
    let permission = acl.permission_by_slug("edit-resource").await?;
    let body = json!({ "role_id": role.id, "permission_id": permission.id });

    let (status, _) = send(&t.app, "POST", "/api/roles/remove-permission", Some(&root), Some(body.clone())).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&t.app, "POST", "/api/roles/remove-permission", Some(&root), Some(body)).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    // the same token, checked against the current grants
    let (status, _) = send(&t.app, "PUT", &uri, Some(&editor), Some(json!({ "title": "Plan v3" }))).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}
