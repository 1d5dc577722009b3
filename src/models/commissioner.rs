use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use utoipa::ToSchema;
use validator::Validate;

use crate::config::AppConfig;
use crate::csv::{opt, CsvRecord};
use crate::ident::{Identifiers, SequenceKind, Sequenced};
use crate::utils::{non_empty, normalize_email, utc_now};

text_enum! {
    pub enum CommissionerStatus {
        Active = "active",
        Inactive = "inactive",
    }
}

impl Default for CommissionerStatus {
    fn default() -> Self {
        CommissionerStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Commissioner {
    #[serde(skip)]
    pub id: i64,
    pub uuid: String,
    #[serde(rename = "sampleID")]
    pub sample_id: String,
    pub full_name: String,
    pub title: String,
    pub email: String,
    pub phone: Option<String>,
    pub biography: Option<String>,
    pub qualifications: Option<String>,
    pub experience: Option<String>,
    pub profile_photo: Option<String>,
    pub appointed_date: NaiveDate,
    pub term_end_date: NaiveDate,
    pub status: CommissionerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for Commissioner {
    fn entity_type() -> &'static str {
        "commissioner"
    }

    fn subject_id(&self) -> String {
        self.uuid.clone()
    }
}

impl CsvRecord for Commissioner {
    fn headers() -> &'static [&'static str] {
        &[
            "Sample ID",
            "Full Name",
            "Title",
            "Email",
            "Phone",
            "Appointed Date",
            "Term End Date",
            "Status",
        ]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.sample_id.clone(),
            self.full_name.clone(),
            self.title.clone(),
            self.email.clone(),
            opt(&self.phone),
            self.appointed_date.to_string(),
            self.term_end_date.to_string(),
            self.status.to_string(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommissionerView {
    #[serde(flatten)]
    pub commissioner: Commissioner,
    pub profile_photo_url: Option<String>,
}

impl CommissionerView {
    pub fn new(commissioner: Commissioner, config: &AppConfig) -> Self {
        let profile_photo_url = commissioner.profile_photo.as_deref().map(|p| config.media_url(p));
        Self {
            commissioner,
            profile_photo_url,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CommissionerPayload {
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,
    #[schema(example = "Chief Commissioner")]
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    pub phone: Option<String>,
    pub biography: Option<String>,
    pub qualifications: Option<String>,
    pub experience: Option<String>,
    /// Media uuid of the portrait.
    pub profile_photo: Option<String>,
    pub appointed_date: NaiveDate,
    pub term_end_date: NaiveDate,
    pub status: Option<CommissionerStatus>,
    #[serde(skip)]
    pub photo_path: Option<String>,
}

#[async_trait]
impl Sequenced for CommissionerPayload {
    const KIND: SequenceKind = SequenceKind::Commissioner;

    async fn insert(&self, conn: &mut SqliteConnection, ids: &Identifiers) -> Result<i64, sqlx::Error> {
        let now = utc_now();
        let result = sqlx::query(
            r#"
            INSERT INTO commissioners (
                uuid, sample_id, full_name, title, email, phone, biography, qualifications, experience,
                profile_photo, appointed_date, term_end_date, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&ids.uuid)
        .bind(&ids.sample_id)
        .bind(self.full_name.trim())
        .bind(self.title.trim())
        .bind(normalize_email(&self.email))
        .bind(non_empty(self.phone.clone()))
        .bind(&self.biography)
        .bind(&self.qualifications)
        .bind(&self.experience)
        .bind(&self.photo_path)
        .bind(self.appointed_date)
        .bind(self.term_end_date)
        .bind(self.status.unwrap_or_default())
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }
}

#[derive(Debug, Default, Clone, Deserialize, Validate, ToSchema)]
pub struct CommissionerUpdate {
    #[validate(length(min = 1, message = "Full name cannot be empty"))]
    pub full_name: Option<String>,
    pub title: Option<String>,
    #[validate(email(message = "A valid email is required"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub biography: Option<String>,
    pub qualifications: Option<String>,
    pub experience: Option<String>,
    pub profile_photo: Option<String>,
    pub appointed_date: Option<NaiveDate>,
    pub term_end_date: Option<NaiveDate>,
    pub status: Option<CommissionerStatus>,
    #[serde(skip)]
    pub photo_path: Option<String>,
}

impl CommissionerUpdate {
    pub fn apply(self, row: &mut Commissioner) {
        if let Some(v) = self.full_name {
            row.full_name = v.trim().to_string();
        }
        if let Some(v) = self.title {
            row.title = v.trim().to_string();
        }
        if let Some(v) = self.email {
            row.email = normalize_email(&v);
        }
        if self.phone.is_some() {
            row.phone = non_empty(self.phone);
        }
        if self.biography.is_some() {
            row.biography = self.biography;
        }
        if self.qualifications.is_some() {
            row.qualifications = self.qualifications;
        }
        if self.experience.is_some() {
            row.experience = self.experience;
        }
        if self.photo_path.is_some() {
            row.profile_photo = self.photo_path;
        }
        if let Some(v) = self.appointed_date {
            row.appointed_date = v;
        }
        if let Some(v) = self.term_end_date {
            row.term_end_date = v;
        }
        if let Some(v) = self.status {
            row.status = v;
        }
    }
}
