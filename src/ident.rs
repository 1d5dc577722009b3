//! Sequential identifiers (`REQ-7`, `COMP-12`, ...) and public uuids.
//!
//! The next number is `MAX(id) + 1` read inside the insert transaction. The
//! `sample_id` column is UNIQUE, so two creators that read the same maximum
//! cannot both commit: the loser sees a unique violation (or a busy error
//! from SQLite) and retries with a fresh read.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::errors::{is_unique_violation, AppError, AppResult};

pub const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceKind {
    Request,
    Complaint,
    Commissioner,
    News,
    Resource,
    Faq,
}

impl SequenceKind {
    pub fn prefix(self) -> &'static str {
        match self {
            SequenceKind::Request => "REQ",
            SequenceKind::Complaint => "COMP",
            SequenceKind::Commissioner => "COM",
            SequenceKind::News => "NEWS",
            SequenceKind::Resource => "RES",
            SequenceKind::Faq => "FAQ",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            SequenceKind::Request => "requests",
            SequenceKind::Complaint => "complaints",
            SequenceKind::Commissioner => "commissioners",
            SequenceKind::News => "news",
            SequenceKind::Resource => "resources",
            SequenceKind::Faq => "faqs",
        }
    }

    pub fn format(self, n: i64) -> String {
        format!("{}-{}", self.prefix(), n)
    }

    /// Reads `"7"` or `"COMP-7"` (any case) as sequence number 7.
    pub fn parse_number(self, term: &str) -> Option<i64> {
        let term = term.trim();
        let digits = match term.split_once('-') {
            Some((prefix, rest)) if prefix.eq_ignore_ascii_case(self.prefix()) => rest,
            Some(_) => return None,
            None => term,
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse::<i64>().ok().filter(|n| *n > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifiers {
    pub uuid: String,
    pub sample_id: String,
}

/// Computes identifiers for the next row of `kind`. Call inside the insert transaction.
pub async fn next_identifiers(conn: &mut SqliteConnection, kind: SequenceKind) -> Result<Identifiers, sqlx::Error> {
    let sql = format!("SELECT COALESCE(MAX(id), 0) FROM {}", kind.table());
    let max_id: i64 = sqlx::query_scalar(&sql).fetch_one(&mut *conn).await?;

    Ok(Identifiers {
        uuid: Uuid::new_v4().to_string(),
        sample_id: kind.format(max_id + 1),
    })
}

/// A row whose insert receives freshly assigned identifiers.
#[async_trait]
pub trait Sequenced: Send + Sync {
    const KIND: SequenceKind;

    /// Inserts the row and returns its primary key.
    async fn insert(&self, conn: &mut SqliteConnection, ids: &Identifiers) -> Result<i64, sqlx::Error>;
}

/// Assigns identifiers and inserts `row` in one transaction, retrying on collisions.
pub async fn create<T: Sequenced>(pool: &SqlitePool, row: &T) -> AppResult<(i64, Identifiers)> {
    for attempt in 1..=MAX_ATTEMPTS {
        let err = match insert_locked(pool, row).await {
            Ok(created) => return Ok(created),
            Err(err) => err,
        };

        if !is_retryable(&err) {
            return Err(err.into());
        }

        tracing::warn!(
            table = T::KIND.table(),
            attempt,
            error = %err,
            "sequential identifier collision, retrying"
        );
        tokio::time::sleep(backoff(attempt)).await;
    }

    Err(AppError::conflict("Could not allocate identifier"))
}

/// `BEGIN IMMEDIATE` takes the write lock before the MAX(id) read, so
/// concurrent creators wait on the busy timeout instead of reading the same maximum.
async fn insert_locked<T: Sequenced>(pool: &SqlitePool, row: &T) -> Result<(i64, Identifiers), sqlx::Error> {
    let mut tx = ImmediateTx::begin(pool).await?;

    let outcome = async {
        let ids = next_identifiers(tx.conn()?, T::KIND).await?;
        let id = row.insert(tx.conn()?, &ids).await?;
        Ok::<_, sqlx::Error>((id, ids))
    }
    .await;

    match outcome {
        Ok(created) => {
            tx.commit().await?;
            Ok(created)
        }
        Err(err) => {
            tx.rollback().await;
            Err(err)
        }
    }
}

/// Pooled connection inside `BEGIN IMMEDIATE`.
///
/// If it is dropped before COMMIT or ROLLBACK completes (the request future was
/// cancelled, or COMMIT failed) the connection is detached and closed, which
/// makes SQLite roll back. It never goes back to the pool holding the write lock.
struct ImmediateTx {
    conn: Option<PoolConnection<Sqlite>>,
    settled: bool,
}

impl ImmediateTx {
    async fn begin(pool: &SqlitePool) -> Result<Self, sqlx::Error> {
        let mut tx = Self {
            conn: Some(pool.acquire().await?),
            settled: false,
        };
        if let Err(err) = sqlx::query("BEGIN IMMEDIATE").execute(tx.conn()?).await {
            // the statement was refused, so no transaction is open
            tx.settled = true;
            return Err(err);
        }
        Ok(tx)
    }

    fn conn(&mut self) -> Result<&mut SqliteConnection, sqlx::Error> {
        self.conn.as_deref_mut().ok_or(sqlx::Error::PoolClosed)
    }

    async fn commit(mut self) -> Result<(), sqlx::Error> {
        sqlx::query("COMMIT").execute(self.conn()?).await?;
        self.settled = true;
        Ok(())
    }

    async fn rollback(mut self) {
        if let Ok(conn) = self.conn() {
            if sqlx::query("ROLLBACK").execute(conn).await.is_ok() {
                self.settled = true;
            }
        }
    }
}

impl Drop for ImmediateTx {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(conn) = self.conn.take() {
            tracing::warn!("closing connection left inside an unfinished transaction");
            drop(conn.detach());
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    // Spread retries without a shared clock: 5ms, 10ms, 20ms, ... plus up to 7ms of uuid noise.
    let jitter = (Uuid::new_v4().as_u128() % 8) as u64;
    Duration::from_millis(5 * (1u64 << attempt.min(6)) / 2 + jitter)
}

fn is_retryable(err: &sqlx::Error) -> bool {
    if is_unique_violation(err, Some(".sample_id")) || is_unique_violation(err, Some(".uuid")) {
        return true;
    }
    match err {
        // SQLITE_BUSY and its extended codes, plus SQLITE_LOCKED
        sqlx::Error::Database(db_err) => matches!(
            db_err.code().as_deref(),
            Some("5") | Some("6") | Some("261") | Some("517")
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_prefix_and_number() {
        assert_eq!(SequenceKind::Complaint.format(1), "COMP-1");
        assert_eq!(SequenceKind::Request.format(42), "REQ-42");
    }

    #[test]
    fn parses_bare_and_prefixed_numbers() {
        let kind = SequenceKind::Complaint;
        assert_eq!(kind.parse_number("7"), Some(7));
        assert_eq!(kind.parse_number("COMP-7"), Some(7));
        assert_eq!(kind.parse_number("comp-07"), Some(7));
        assert_eq!(kind.parse_number("REQ-7"), None);
        assert_eq!(kind.parse_number("7a"), None);
        assert_eq!(kind.parse_number("0"), None);
        assert_eq!(kind.parse_number(""), None);
    }

    #[test]
    fn backoff_grows() {
        assert!(backoff(1) < backoff(4) + Duration::from_millis(8));
        assert!(backoff(6) >= Duration::from_millis(160));
    }
}
