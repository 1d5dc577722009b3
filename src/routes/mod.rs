pub mod acl;
pub mod admins;
pub mod auth;
pub mod commissioners;
pub mod complaints;
pub mod contact;
pub mod dashboard;
pub mod faqs;
pub mod health;
pub mod media;
pub mod news;
pub mod notifications;
pub mod requests;
pub mod resources;
pub mod settings;
pub mod users;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, SqlitePool};

use crate::errors::{AppError, AppResult};

/// Loads one row of `table` by public uuid, or 404 "`<entity>` not found".
pub(crate) async fn find_by_uuid<T>(pool: &SqlitePool, table: &'static str, entity: &str, uuid: &str) -> AppResult<T>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    sqlx::query_as::<_, T>(&format!("SELECT * FROM {table} WHERE uuid = ?"))
        .bind(uuid)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::entity_not_found(entity))
}

pub(crate) async fn find_by_id<T>(pool: &SqlitePool, table: &'static str, entity: &str, id: i64) -> AppResult<T>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    sqlx::query_as::<_, T>(&format!("SELECT * FROM {table} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::entity_not_found(entity))
}

pub(crate) async fn delete_by_id(pool: &SqlitePool, table: &'static str, id: i64) -> AppResult<()> {
    sqlx::query(&format!("DELETE FROM {table} WHERE id = ?"))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
