use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use utoipa::ToSchema;
use validator::Validate;

use crate::csv::CsvRecord;
use crate::ident::{Identifiers, SequenceKind, Sequenced};
use crate::utils::utc_now;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Faq {
    #[serde(skip)]
    pub id: i64,
    pub uuid: String,
    #[serde(rename = "sampleID")]
    pub sample_id: String,
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for Faq {
    fn entity_type() -> &'static str {
        "faq"
    }

    fn subject_id(&self) -> String {
        self.uuid.clone()
    }
}

impl CsvRecord for Faq {
    fn headers() -> &'static [&'static str] {
        &["Sample ID", "Question", "Answer", "Created At"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.sample_id.clone(),
            self.question.clone(),
            self.answer.clone(),
            self.created_at.to_rfc3339(),
        ]
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct FaqPayload {
    #[schema(example = "How do I file a request?")]
    #[validate(custom(function = "crate::extract::not_blank", message = "Question is required"))]
    pub question: String,
    #[validate(custom(function = "crate::extract::not_blank", message = "Answer is required"))]
    pub answer: String,
}

#[async_trait]
impl Sequenced for FaqPayload {
    const KIND: SequenceKind = SequenceKind::Faq;

    async fn insert(&self, conn: &mut SqliteConnection, ids: &Identifiers) -> Result<i64, sqlx::Error> {
        let now = utc_now();
        let result = sqlx::query(
            "INSERT INTO faqs (uuid, sample_id, question, answer, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&ids.uuid)
        .bind(&ids.sample_id)
        .bind(self.question.trim())
        .bind(self.answer.trim())
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }
}

#[derive(Debug, Default, Clone, Deserialize, Validate, ToSchema)]
pub struct FaqUpdate {
    #[validate(custom(function = "crate::extract::not_blank", message = "Question cannot be empty"))]
    pub question: Option<String>,
    #[validate(custom(function = "crate::extract::not_blank", message = "Answer cannot be empty"))]
    pub answer: Option<String>,
}

impl FaqUpdate {
    pub fn apply(self, row: &mut Faq) {
        if let Some(v) = self.question {
            row.question = v.trim().to_string();
        }
        if let Some(v) = self.answer {
            row.answer = v.trim().to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_only_question_is_rejected() {
        let payload = FaqPayload {
            question: "   ".into(),
            answer: "Visit the office".into(),
        };
        let errors = payload.validate().expect_err("blank question");
        assert!(errors.field_errors().contains_key("question"));
    }
}
