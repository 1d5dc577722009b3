mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{insert_media, resource_body, send, spawn_app, str_field, user_token};

#[tokio::test]
async fn drafts_stay_private_until_published() -> Result<()> {
    let t = spawn_app().await?;
    let root = user_token(&t, "root@example.org", true, &["super-admin"]).await?;

    let (status, draft) = send(
        &t.app,
        "POST",
        "/api/news",
        Some(&root),
        Some(json!({
            "title": "New disclosure rules",
            "category": "announcement",
            "excerpt": "What changes in April",
            "content": "Full text",
            "featured": true
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "{draft}");
    assert_eq!(draft["status"], "draft");
    assert_eq!(draft["sampleID"], "NEWS-1");
    assert!(draft["published_at"].is_null());

    let public_uri = format!("/api/news/public/{}", str_field(&draft, "uuid"));
    let (status, _) = send(&t.app, "GET", &public_uri, None, None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = send(&t.app, "GET", "/api/news/feature", None, None).await?;
    assert_eq!(body.as_array().map(Vec::len), Some(0));

    let (status, published) = send(
        &t.app,
        "PUT",
        &format!("/api/news/{}", str_field(&draft, "uuid")),
        Some(&root),
        Some(json!({ "status": "published" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "{published}");
    assert!(!published["published_at"].is_null());

    let (status, body) = send(&t.app, "GET", &public_uri, None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["view"], 1);
    let (_, body) = send(&t.app, "GET", &public_uri, None, None).await?;
    assert_eq!(body["view"], 2);

    let (_, body) = send(&t.app, "GET", "/api/news/feature", None, None).await?;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    let (_, body) = send(&t.app, "GET", "/api/news/public", None, None).await?;
    assert_eq!(body["meta"]["total"], 1);
    Ok(())
}

#[tokio::test]
async fn only_published_resources_can_be_downloaded() -> Result<()> {
    let t = spawn_app().await?;
    let root = user_token(&t, "root@example.org", true, &["super-admin"]).await?;
    let media = insert_media(&t.pool, "budget.pdf").await?;

    let (status, resource) = send(&t.app, "POST", "/api/resources", Some(&root), Some(resource_body("Budget", &media))).await?;
    assert_eq!(status, StatusCode::CREATED, "{resource}");
    assert_eq!(resource["mime"], "application/pdf");
    assert_eq!(resource["size"], 1024);
    let uuid = str_field(&resource, "uuid").to_string();

    let download = format!("/api/resources/{uuid}/download");
    let (status, _) = send(&t.app, "GET", &download, None, None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &t.app,
        "PATCH",
        &format!("/api/resources/{uuid}/status"),
        Some(&root),
        Some(json!({ "status": "published" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&t.app, "GET", &download, None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["download"], 1);
    assert!(str_field(&body, "url").contains("/storage/media/"));

    let (_, body) = send(&t.app, "GET", "/api/resources/public", None, None).await?;
    assert_eq!(body["meta"]["total"], 1);

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/resources",
        Some(&root),
        Some(resource_body("Ghost", "00000000-0000-0000-0000-000000000000")),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn commissioner_emails_are_unique_and_inactive_ones_are_hidden() -> Result<()> {
    let t = spawn_app().await?;
    let admin = user_token(&t, "admin@example.org", true, &["admin"]).await?;
    let body = |email: &str| {
        json!({
            "full_name": "Esi Mensah",
            "title": "Chief Commissioner",
            "email": email,
            "appointed_date": "2024-01-01",
            "term_end_date": "2028-01-01"
        })
    };

    let (status, first) = send(&t.app, "POST", "/api/commissioners", Some(&admin), Some(body("esi@example.org"))).await?;
    assert_eq!(status, StatusCode::CREATED, "{first}");
    assert_eq!(first["status"], "active");

    let (status, _) = send(&t.app, "POST", "/api/commissioners", Some(&admin), Some(body("ESI@example.org"))).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, second) = send(&t.app, "POST", "/api/commissioners", Some(&admin), Some(body("kwame@example.org"))).await?;
    let (status, _) = send(
        &t.app,
        "PUT",
        &format!("/api/commissioners/{}", str_field(&second, "uuid")),
        Some(&admin),
        Some(json!({ "status": "inactive" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (_, public) = send(&t.app, "GET", "/api/commissioners", None, None).await?;
    assert_eq!(public["meta"]["total"], 1);
    let (_, all) = send(&t.app, "GET", "/api/commissioners/admin", Some(&admin), None).await?;
    assert_eq!(all["meta"]["total"], 2);
    Ok(())
}

#[tokio::test]
async fn faqs_and_contact_messages() -> Result<()> {
    let t = spawn_app().await?;
    let root = user_token(&t, "root@example.org", true, &["super-admin"]).await?;

    let (status, faq) = send(
        &t.app,
        "POST",
        "/api/faqs",
        Some(&root),
        Some(json!({ "question": "How long does a request take?", "answer": "Up to 14 days." })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "{faq}");
    assert_eq!(faq["sampleID"], "FAQ-1");

    let (_, body) = send(&t.app, "GET", "/api/faqs/public", None, None).await?;
    assert_eq!(body["meta"]["total"], 1);

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/faqs",
        Some(&root),
        Some(json!({ "question": "   ", "answer": "x" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, message) = send(
        &t.app,
        "POST",
        "/api/contact-us",
        None,
        Some(json!({ "full_name": "Yaw", "email": "Yaw@Example.org", "message": "Hello there" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "{message}");
    assert_eq!(message["email"], "yaw@example.org");

    let (status, _) = send(&t.app, "GET", "/api/contact-us", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (_, body) = send(&t.app, "GET", "/api/contact-us?search=hello", Some(&root), None).await?;
    assert_eq!(body["meta"]["total"], 1);
    Ok(())
}
