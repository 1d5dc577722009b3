use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use utoipa::ToSchema;
use validator::Validate;

use crate::config::AppConfig;
use crate::csv::{opt, CsvRecord};
use crate::ident::{Identifiers, SequenceKind, Sequenced};
use crate::models::media::Media;
use crate::models::PublishStatus;
use crate::utils::{non_empty, utc_now};

text_enum! {
    pub enum ResourceCategory {
        Legislation = "legislation",
        Reports = "reports",
        Guidelines = "guidelines",
        Financial = "financial",
        Policies = "policies",
    }
}

text_enum! {
    pub enum ResourceType {
        LawsRegulations = "laws_regulations",
        GuidesManuals = "guides_manuals",
        VideoResources = "video_resources",
    }
}

/// A downloadable document. `file`, `mime` and `size` are copied from the uploaded media row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Resource {
    #[serde(skip)]
    pub id: i64,
    pub uuid: String,
    #[serde(rename = "sampleID")]
    pub sample_id: String,
    pub title: String,
    pub description: String,
    pub category: ResourceCategory,
    pub status: PublishStatus,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: ResourceType,
    pub file: String,
    pub url: Option<String>,
    pub mime: String,
    pub size: i64,
    pub download: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for Resource {
    fn entity_type() -> &'static str {
        "resource"
    }

    fn subject_id(&self) -> String {
        self.uuid.clone()
    }
}

impl CsvRecord for Resource {
    fn headers() -> &'static [&'static str] {
        &[
            "Sample ID",
            "Title",
            "Category",
            "Type",
            "Status",
            "Mime",
            "Size",
            "Downloads",
            "URL",
            "Created At",
        ]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.sample_id.clone(),
            self.title.clone(),
            self.category.to_string(),
            self.kind.to_string(),
            self.status.to_string(),
            self.mime.clone(),
            self.size.to_string(),
            self.download.to_string(),
            opt(&self.url),
            self.created_at.to_rfc3339(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResourceView {
    #[serde(flatten)]
    pub resource: Resource,
    pub file_url: String,
}

impl ResourceView {
    pub fn new(resource: Resource, config: &AppConfig) -> Self {
        let file_url = config.media_url(&resource.file);
        Self { resource, file_url }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DownloadResponse {
    pub url: String,
    pub download: i64,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ResourcePayload {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    pub category: ResourceCategory,
    pub status: Option<PublishStatus>,
    #[serde(rename = "type")]
    pub kind: ResourceType,
    /// Media uuid of the document.
    #[validate(length(min = 1, message = "File is required"))]
    pub file: String,
    pub url: Option<String>,
    #[serde(skip)]
    pub media: Option<Media>,
}

#[async_trait]
impl Sequenced for ResourcePayload {
    const KIND: SequenceKind = SequenceKind::Resource;

    async fn insert(&self, conn: &mut SqliteConnection, ids: &Identifiers) -> Result<i64, sqlx::Error> {
        let media = self
            .media
            .as_ref()
            .ok_or_else(|| sqlx::Error::Protocol("resource media was not resolved".into()))?;
        let now = utc_now();

        let result = sqlx::query(
            r#"
            INSERT INTO resources (
                uuid, sample_id, title, description, category, status, type, file, url, mime, size,
                download, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&ids.uuid)
        .bind(&ids.sample_id)
        .bind(self.title.trim())
        .bind(self.description.trim())
        .bind(self.category)
        .bind(self.status.unwrap_or_default())
        .bind(self.kind)
        .bind(&media.path)
        .bind(non_empty(self.url.clone()))
        .bind(&media.mime)
        .bind(media.size)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }
}

#[derive(Debug, Default, Clone, Deserialize, Validate, ToSchema)]
pub struct ResourceUpdate {
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<ResourceCategory>,
    pub status: Option<PublishStatus>,
    #[serde(rename = "type")]
    pub kind: Option<ResourceType>,
    pub file: Option<String>,
    pub url: Option<String>,
    #[serde(skip)]
    pub media: Option<Media>,
}

impl ResourceUpdate {
    /// Applies the update and returns the replaced file path, if the file changed.
    pub fn apply(self, row: &mut Resource) -> Option<String> {
        if let Some(v) = self.title {
            row.title = v.trim().to_string();
        }
        if let Some(v) = self.description {
            row.description = v.trim().to_string();
        }
        if let Some(v) = self.category {
            row.category = v;
        }
        if let Some(v) = self.status {
            row.status = v;
        }
        if let Some(v) = self.kind {
            row.kind = v;
        }
        if self.url.is_some() {
            row.url = non_empty(self.url);
        }
        match self.media {
            Some(media) if media.path != row.file => {
                let old = std::mem::replace(&mut row.file, media.path);
                row.mime = media.mime;
                row.size = media.size;
                Some(old)
            }
            _ => None,
        }
    }
}
