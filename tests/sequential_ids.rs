mod common;

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::http::StatusCode;
use sqlx::SqliteConnection;

use transparency_portal::ident::{self, Identifiers, SequenceKind, Sequenced};
use transparency_portal::models::faq::FaqPayload;

use common::{complaint_body, migrated_pool_with, request_body, send, spawn_app, str_field};

fn faq(question: &str) -> FaqPayload {
    FaqPayload {
        question: question.into(),
        answer: "See the guide.".into(),
    }
}

/// Inserts its row and then stalls while the write transaction is still open.
struct StallsAfterInsert(FaqPayload);

#[async_trait]
impl Sequenced for StallsAfterInsert {
    const KIND: SequenceKind = SequenceKind::Faq;

    async fn insert(&self, conn: &mut SqliteConnection, ids: &Identifiers) -> Result<i64, sqlx::Error> {
        let id = self.0.insert(conn, ids).await?;
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(id)
    }
}

#[tokio::test]
async fn serial_creates_count_up_per_table() -> Result<()> {
    let t = spawn_app().await?;

    for expected in ["REQ-1", "REQ-2", "REQ-3"] {
        let (status, body) = send(&t.app, "POST", "/api/requests", None, Some(request_body("Applicant"))).await?;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(str_field(&body, "sampleID"), expected);
        assert_eq!(body["status"], "pending");
    }

    // numbering is independent per table
    let (status, body) = send(&t.app, "POST", "/api/complaints", None, Some(complaint_body("Citizen"))).await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(str_field(&body, "sampleID"), "COMP-1");
    Ok(())
}

#[tokio::test]
async fn concurrent_creates_get_distinct_ids() -> Result<()> {
    let t = spawn_app().await?;

    let mut handles = Vec::new();
    for i in 0..12 {
        let app = t.app.clone();
        handles.push(tokio::spawn(async move {
            send(&app, "POST", "/api/complaints", None, Some(complaint_body(&format!("Citizen {i}")))).await
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        let (status, body) = handle.await??;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        ids.insert(str_field(&body, "sampleID").to_string());
    }

    let expected: HashSet<String> = (1..=12).map(|n| format!("COMP-{n}")).collect();
    assert_eq!(ids, expected);

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT sample_id) FROM complaints")
        .fetch_one(&t.pool)
        .await?;
    assert_eq!(stored, 12);
    Ok(())
}

#[tokio::test]
async fn sample_ids_survive_updates() -> Result<()> {
    let t = spawn_app().await?;
    let root = common::user_token(&t, "root@example.org", true, &["super-admin"]).await?;

    let (_, created) = send(&t.app, "POST", "/api/requests", None, Some(request_body("Applicant"))).await?;
    let uri = format!("/api/requests/{}", str_field(&created, "uuid"));

    let (status, body) = send(
        &t.app,
        "PATCH",
        &format!("{uri}/status"),
        Some(&root),
        Some(serde_json::json!({ "status": "inreview" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "inreview");
    assert_eq!(body["sampleID"], created["sampleID"]);

    let (status, _) = send(
        &t.app,
        "PATCH",
        &format!("{uri}/status"),
        Some(&root),
        Some(serde_json::json!({ "status": "archived" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    Ok(())
}

#[tokio::test]
async fn cancelled_create_releases_the_write_lock() -> Result<()> {
    let dir = tempfile::tempdir()?;
    // one connection, so a leaked transaction would be handed to the next caller
    let pool = migrated_pool_with(&dir, 1).await?;

    let stalled = StallsAfterInsert(faq("Abandoned?"));
    let cancelled = tokio::time::timeout(Duration::from_millis(100), ident::create(&pool, &stalled)).await;
    assert!(cancelled.is_err(), "create should still be stalled when the timeout fires");

    for expected in ["FAQ-1", "FAQ-2"] {
        let (_, ids) = ident::create(&pool, &faq("Still working?")).await?;
        assert_eq!(ids.sample_id, expected);
    }

    let questions: Vec<String> = sqlx::query_scalar("SELECT question FROM faqs ORDER BY id").fetch_all(&pool).await?;
    assert_eq!(questions, vec!["Still working?".to_string(), "Still working?".to_string()]);
    Ok(())
}
