//! Background job scheduler and the jobs registered with it.

mod notification_cleanup;
mod scheduler;

pub use notification_cleanup::NotificationCleanupJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};

use sqlx::SqlitePool;

use crate::config::AppConfig;

/// Builds the scheduler with every job enabled by `config`. Call `start` on the result.
pub fn default_scheduler(pool: SqlitePool, config: &AppConfig) -> JobScheduler {
    let mut scheduler = JobScheduler::new();
    if config.notification_retention_days > 0 {
        scheduler.register(NotificationCleanupJob::new(pool, config.notification_retention_days));
    }
    scheduler
}
