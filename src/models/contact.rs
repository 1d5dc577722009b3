use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ContactMessage {
    #[serde(skip)]
    pub id: i64,
    pub uuid: String,
    pub full_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub subject: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for ContactMessage {
    fn entity_type() -> &'static str {
        "contact_message"
    }

    fn subject_id(&self) -> String {
        self.uuid.clone()
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ContactPayload {
    #[validate(custom(function = "crate::extract::not_blank", message = "Full name is required"))]
    pub full_name: String,
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[serde(alias = "phone")]
    pub phone_number: Option<String>,
    pub subject: Option<String>,
    #[validate(custom(function = "crate::extract::not_blank", message = "Message is required"))]
    pub message: String,
}
