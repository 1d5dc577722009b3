use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

/// An uploaded file. `path` is relative to the storage root.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Media {
    #[serde(skip)]
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub path: String,
    pub mime: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for Media {
    fn entity_type() -> &'static str {
        "media"
    }

    fn subject_id(&self) -> String {
        self.uuid.clone()
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MediaView {
    #[serde(flatten)]
    pub media: Media,
    pub url: String,
}

impl MediaView {
    pub fn new(media: Media, config: &AppConfig) -> Self {
        let url = config.media_url(&media.path);
        Self { media, url }
    }
}

pub async fn find_by_uuid(pool: &SqlitePool, uuid: &str) -> AppResult<Media> {
    sqlx::query_as::<_, Media>("SELECT * FROM media WHERE uuid = ?")
        .bind(uuid)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::entity_not_found("Media"))
}

/// Resolves an optional media uuid from a payload to its stored path.
pub async fn resolve_path(pool: &SqlitePool, uuid: Option<&str>) -> AppResult<Option<String>> {
    match uuid.map(str::trim).filter(|u| !u.is_empty()) {
        Some(uuid) => Ok(Some(find_by_uuid(pool, uuid).await?.path)),
        None => Ok(None),
    }
}

/// Content columns that point at a media path.
const REFERENCES: &[(&str, &str)] = &[
    ("resources", "file"),
    ("news", "image"),
    ("commissioners", "profile_photo"),
];

/// Number of content rows currently pointing at `path`.
pub async fn reference_count(pool: &SqlitePool, path: &str) -> AppResult<i64> {
    let mut total = 0;
    for (table, column) in REFERENCES {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE {column} = ?"))
            .bind(path)
            .fetch_one(pool)
            .await?;
        total += count;
    }
    Ok(total)
}
