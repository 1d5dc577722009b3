use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tracing::info;

use super::scheduler::{Job, JobFrequency};

/// Deletes notifications (and their read receipts) older than the retention window.
pub struct NotificationCleanupJob {
    pool: SqlitePool,
    retention_days: u32,
}

impl NotificationCleanupJob {
    pub fn new(pool: SqlitePool, retention_days: u32) -> Self {
        Self { pool, retention_days }
    }

    pub async fn purge(&self) -> Result<u64, sqlx::Error> {
        let cutoff = Utc::now() - Duration::days(i64::from(self.retention_days));
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM notification_reads WHERE notification_id IN (SELECT id FROM notifications WHERE created_at < ?)",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM notifications WHERE created_at < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted)
    }
}

#[async_trait]
impl Job for NotificationCleanupJob {
    fn name(&self) -> &'static str {
        "notification_cleanup"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Daily
    }

    async fn execute(&self) -> anyhow::Result<()> {
        let deleted = self.purge().await?;
        info!(deleted, retention_days = self.retention_days, "purged old notifications");
        Ok(())
    }
}
