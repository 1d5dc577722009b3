//! Best-effort side effects run off the request path.
//!
//! Handlers [`submit`](SideEffectQueue::submit) work and return immediately.
//! A single worker drains the queue, retries failures with exponential
//! backoff and records jobs that still fail in `dead_letters`.

pub mod mail;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub use mail::{EmailMessage, LogTransport, MailError, MailTransport, Mailer};

pub const QUEUE_CAPACITY: usize = 256;
pub const MAX_ATTEMPTS: u32 = 3;
pub const BASE_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum SideEffect {
    SendMail(EmailMessage),
}

impl SideEffect {
    pub fn kind(&self) -> &'static str {
        match self {
            SideEffect::SendMail(_) => "send_mail",
        }
    }
}

#[derive(Clone)]
pub struct SideEffectQueue {
    tx: mpsc::Sender<SideEffect>,
}

impl SideEffectQueue {
    /// Starts `worker` on its own task and returns the queue feeding it.
    pub fn spawn(worker: EffectWorker) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let handle = tokio::spawn(worker.run(rx));
        (Self { tx }, handle)
    }

    /// Never fails the caller: a full or closed queue drops the effect with a warning.
    pub fn submit(&self, effect: SideEffect) {
        let kind = effect.kind();
        match self.tx.try_send(effect) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(kind, "side-effect queue full, dropping job");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(kind, "side-effect queue closed, dropping job");
            }
        }
    }

    pub fn send_mail(&self, message: EmailMessage) {
        self.submit(SideEffect::SendMail(message));
    }
}

pub struct EffectWorker {
    pool: SqlitePool,
    mailer: Mailer,
    base_backoff: Duration,
}

impl EffectWorker {
    pub fn new(pool: SqlitePool, mailer: Mailer) -> Self {
        Self {
            pool,
            mailer,
            base_backoff: BASE_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        self
    }

    async fn run(self, mut rx: mpsc::Receiver<SideEffect>) {
        info!("side-effect worker started");
        while let Some(effect) = rx.recv().await {
            self.process(&effect).await;
        }
        info!("side-effect worker stopped");
    }

    /// Runs one job to completion: success, or dead letter after the last attempt.
    pub async fn process(&self, effect: &SideEffect) {
        for attempt in 1..=MAX_ATTEMPTS {
            let err = match self.execute(effect).await {
                Ok(()) => return,
                Err(err) => err,
            };

            if attempt < MAX_ATTEMPTS {
                warn!(kind = effect.kind(), attempt, error = %err, "side effect failed, retrying");
                tokio::time::sleep(self.base_backoff * 2u32.pow(attempt - 1)).await;
                continue;
            }

            error!(kind = effect.kind(), attempts = attempt, error = %err, "side effect failed permanently");
            if let Err(db_err) = self.dead_letter(effect, &err.to_string(), attempt).await {
                error!(kind = effect.kind(), error = %db_err, "failed to record dead letter");
            }
        }
    }

    async fn execute(&self, effect: &SideEffect) -> Result<(), MailError> {
        match effect {
            SideEffect::SendMail(message) => self.mailer.send(message).await,
        }
    }

    async fn dead_letter(&self, effect: &SideEffect, error: &str, attempts: u32) -> Result<(), sqlx::Error> {
        let payload = serde_json::to_string(effect).unwrap_or_default();
        sqlx::query("INSERT INTO dead_letters (kind, payload, error, attempts, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(effect.kind())
            .bind(payload)
            .bind(error)
            .bind(attempts as i64)
            .bind(chrono::Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
