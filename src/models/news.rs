use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use utoipa::ToSchema;
use validator::Validate;

use crate::config::AppConfig;
use crate::csv::CsvRecord;
use crate::ident::{Identifiers, SequenceKind, Sequenced};
use crate::models::PublishStatus;
use crate::utils::utc_now;

text_enum! {
    pub enum NewsCategory {
        Announcement = "announcement",
        PressRelease = "press_release",
        Campaign = "campaign",
        Event = "event",
        Report = "report",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct News {
    #[serde(skip)]
    pub id: i64,
    pub uuid: String,
    #[serde(rename = "sampleID")]
    pub sample_id: String,
    pub title: String,
    pub category: NewsCategory,
    pub excerpt: String,
    pub content: String,
    pub image: Option<String>,
    pub status: PublishStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub featured: bool,
    pub view: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl News {
    /// Moves to `status`: the first publication stamps `published_at`, going back to draft clears it.
    pub fn transition(&mut self, status: PublishStatus, now: DateTime<Utc>) {
        match status {
            PublishStatus::Published if self.published_at.is_none() => self.published_at = Some(now),
            PublishStatus::Draft => self.published_at = None,
            PublishStatus::Published => {}
        }
        self.status = status;
    }
}

impl crate::events::Loggable for News {
    fn entity_type() -> &'static str {
        "news"
    }

    fn subject_id(&self) -> String {
        self.uuid.clone()
    }
}

impl CsvRecord for News {
    fn headers() -> &'static [&'static str] {
        &["Sample ID", "Title", "Category", "Status", "Featured", "Views", "Published At", "Created At"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.sample_id.clone(),
            self.title.clone(),
            self.category.to_string(),
            self.status.to_string(),
            self.featured.to_string(),
            self.view.to_string(),
            self.published_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            self.created_at.to_rfc3339(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NewsView {
    #[serde(flatten)]
    pub news: News,
    pub image_url: Option<String>,
}

impl NewsView {
    pub fn new(news: News, config: &AppConfig) -> Self {
        let image_url = news.image.as_deref().map(|p| config.media_url(p));
        Self { news, image_url }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NewsPayload {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    pub category: NewsCategory,
    #[validate(length(min = 1, message = "Excerpt is required"))]
    pub excerpt: String,
    #[validate(length(min = 1, message = "Content is required"))]
    pub content: String,
    /// Media uuid of the cover image.
    pub image: Option<String>,
    pub status: Option<PublishStatus>,
    #[serde(default)]
    pub featured: bool,
    #[serde(skip)]
    pub image_path: Option<String>,
}

#[async_trait]
impl Sequenced for NewsPayload {
    const KIND: SequenceKind = SequenceKind::News;

    async fn insert(&self, conn: &mut SqliteConnection, ids: &Identifiers) -> Result<i64, sqlx::Error> {
        let now = utc_now();
        let status = self.status.unwrap_or_default();
        let published_at = (status == PublishStatus::Published).then_some(now);

        let result = sqlx::query(
            r#"
            INSERT INTO news (
                uuid, sample_id, title, category, excerpt, content, image, status, published_at,
                featured, view, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&ids.uuid)
        .bind(&ids.sample_id)
        .bind(self.title.trim())
        .bind(self.category)
        .bind(self.excerpt.trim())
        .bind(&self.content)
        .bind(&self.image_path)
        .bind(status)
        .bind(published_at)
        .bind(self.featured)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }
}

#[derive(Debug, Default, Clone, Deserialize, Validate, ToSchema)]
pub struct NewsUpdate {
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: Option<String>,
    pub category: Option<NewsCategory>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub image: Option<String>,
    pub status: Option<PublishStatus>,
    pub featured: Option<bool>,
    #[serde(skip)]
    pub image_path: Option<String>,
}

impl NewsUpdate {
    pub fn apply(self, row: &mut News, now: DateTime<Utc>) {
        if let Some(v) = self.title {
            row.title = v.trim().to_string();
        }
        if let Some(v) = self.category {
            row.category = v;
        }
        if let Some(v) = self.excerpt {
            row.excerpt = v;
        }
        if let Some(v) = self.content {
            row.content = v;
        }
        if self.image_path.is_some() {
            row.image = self.image_path;
        }
        if let Some(v) = self.featured {
            row.featured = v;
        }
        if let Some(status) = self.status {
            row.transition(status, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn draft() -> News {
        let now = Utc::now();
        News {
            id: 1,
            uuid: "u".into(),
            sample_id: "NEWS-1".into(),
            title: "t".into(),
            category: NewsCategory::Event,
            excerpt: "e".into(),
            content: "c".into(),
            image: None,
            status: PublishStatus::Draft,
            published_at: None,
            featured: false,
            view: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn first_publication_is_stamped_once() {
        let mut news = draft();
        let first = Utc::now();
        news.transition(PublishStatus::Published, first);
        assert_eq!(news.published_at, Some(first));

        news.transition(PublishStatus::Published, first + Duration::hours(1));
        assert_eq!(news.published_at, Some(first));

        news.transition(PublishStatus::Draft, first + Duration::hours(2));
        assert_eq!(news.published_at, None);
    }

    #[test]
    fn category_accepts_spaced_spelling() {
        assert_eq!(NewsCategory::from_filter("Press Release"), Some(NewsCategory::PressRelease));
    }
}
