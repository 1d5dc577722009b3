mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use transparency_portal::config::{AppConfig, Environment};
use transparency_portal::effects::{EffectWorker, EmailMessage, MailError, MailTransport, Mailer, SideEffect};
use transparency_portal::events::chain_hash;
use transparency_portal::jobs::NotificationCleanupJob;

use common::{complaint_body, migrated_pool, send, spawn_app};

/// Refuses every message and counts the attempts.
#[derive(Default)]
struct BrokenSmtp {
    attempts: AtomicU32,
}

#[async_trait]
impl MailTransport for BrokenSmtp {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn deliver(&self, _from: &str, _message: &EmailMessage) -> Result<(), MailError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(MailError::SendFailed("connection refused".into()))
    }
}

fn message() -> SideEffect {
    SideEffect::SendMail(EmailMessage {
        to: "ada@example.org".into(),
        to_name: Some("Ada".into()),
        subject: "Verify your email address".into(),
        body_text: "code 123456".into(),
    })
}

#[tokio::test]
async fn failed_mail_is_retried_then_dead_lettered() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pool = migrated_pool(&dir).await?;
    let transport = Arc::new(BrokenSmtp::default());
    let config = AppConfig {
        environment: Environment::Production,
        ..AppConfig::default()
    };

    let worker = EffectWorker::new(pool.clone(), Mailer::with_transport(&config, transport.clone()))
        .with_backoff(Duration::from_millis(1));
    worker.process(&message()).await;

    assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
    let (kind, attempts, error): (String, i64, String) =
        sqlx::query_as("SELECT kind, attempts, error FROM dead_letters")
            .fetch_one(&pool)
            .await?;
    assert_eq!(kind, "send_mail");
    assert_eq!(attempts, 3);
    assert!(error.contains("connection refused"));
    Ok(())
}

#[tokio::test]
async fn delivery_is_skipped_outside_production() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pool = migrated_pool(&dir).await?;
    let transport = Arc::new(BrokenSmtp::default());

    let worker = EffectWorker::new(pool.clone(), Mailer::with_transport(&AppConfig::default(), transport.clone()))
        .with_backoff(Duration::from_millis(1));
    worker.process(&message()).await;

    assert_eq!(transport.attempts.load(Ordering::SeqCst), 0);
    let dead: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dead_letters").fetch_one(&pool).await?;
    assert_eq!(dead, 0);
    Ok(())
}

#[tokio::test]
async fn activity_is_recorded_in_a_hash_chain() -> Result<()> {
    let t = spawn_app().await?;
    send(&t.app, "POST", "/api/complaints", None, Some(complaint_body("Abena"))).await?;
    send(&t.app, "POST", "/api/complaints", None, Some(complaint_body("Bashir"))).await?;

    // the listener writes asynchronously
    let mut rows: Vec<(String, Option<String>, String)> = Vec::new();
    for _ in 0..50 {
        rows = sqlx::query_as("SELECT payload, prev_hash, hash FROM event_store ORDER BY seq")
            .fetch_all(&t.pool)
            .await?;
        if rows.len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].1, None);
    assert_eq!(rows[0].2, chain_hash(None, &rows[0].0));
    assert_eq!(rows[1].1.as_deref(), Some(rows[0].2.as_str()));

    let names: Vec<String> = sqlx::query_scalar("SELECT event_name FROM activity_log")
        .fetch_all(&t.pool)
        .await?;
    assert!(names.iter().all(|n| n == "complaint.created"), "{names:?}");
    Ok(())
}

#[tokio::test]
async fn cleanup_purges_only_expired_notifications() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pool = migrated_pool(&dir).await?;
    let now = Utc::now();

    for (uuid, age_days) in [("old", 45), ("fresh", 2)] {
        let created = now - chrono::Duration::days(age_days);
        sqlx::query(
            "INSERT INTO notifications (uuid, title, message, type, is_global, created_at, updated_at) VALUES (?, 'T', 'M', 'info', 1, ?, ?)",
        )
        .bind(uuid)
        .bind(created)
        .bind(created)
        .execute(&pool)
        .await?;
    }

    let deleted = NotificationCleanupJob::new(pool.clone(), 30).purge().await?;
    assert_eq!(deleted, 1);
    let left: Vec<String> = sqlx::query_scalar("SELECT uuid FROM notifications").fetch_all(&pool).await?;
    assert_eq!(left, vec!["fresh".to_string()]);
    Ok(())
}
