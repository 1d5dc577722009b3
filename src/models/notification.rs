use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

text_enum! {
    pub enum NotificationType {
        Info = "info",
        Success = "success",
        Warning = "warning",
        Error = "error",
    }
}

impl Default for NotificationType {
    fn default() -> Self {
        NotificationType::Info
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    #[serde(skip)]
    pub id: i64,
    pub uuid: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: NotificationType,
    pub is_global: bool,
    #[serde(skip)]
    pub user_id: Option<i64>,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for Notification {
    fn entity_type() -> &'static str {
        "notification"
    }

    fn subject_id(&self) -> String {
        self.uuid.clone()
    }
}

/// A notification row joined with the caller's read receipt.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationWithRead {
    #[sqlx(flatten)]
    pub notification: Notification,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NotificationView {
    pub uuid: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub is_global: bool,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Value>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<NotificationWithRead> for NotificationView {
    fn from(row: NotificationWithRead) -> Self {
        let n = row.notification;
        Self {
            uuid: n.uuid,
            title: n.title,
            message: n.message,
            kind: n.kind,
            is_global: n.is_global,
            metadata: n
                .metadata
                .as_deref()
                .map(|m| serde_json::from_str(m).unwrap_or_else(|_| Value::String(m.to_string()))),
            is_read: row.read_at.is_some(),
            read_at: row.read_at,
            created_at: n.created_at,
        }
    }
}

impl From<Notification> for NotificationView {
    fn from(n: Notification) -> Self {
        NotificationWithRead {
            notification: n,
            read_at: None,
        }
        .into()
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationQuery {
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub include_read: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NotificationPayload {
    #[validate(custom(function = "crate::extract::not_blank", message = "Title is required"))]
    pub title: String,
    #[validate(custom(function = "crate::extract::not_blank", message = "Message is required"))]
    pub message: String,
    #[serde(rename = "type")]
    pub kind: Option<NotificationType>,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct MarkMultipleRequest {
    #[validate(length(min = 1, message = "At least one notification id is required"))]
    pub notification_ids: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkMultipleResponse {
    pub success: u32,
    pub failed: u32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnreadCountResponse {
    pub count: i64,
}
