use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Setting {
    #[serde(skip)]
    pub id: i64,
    pub uuid: String,
    pub key: String,
    pub value: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for Setting {
    fn entity_type() -> &'static str {
        "setting"
    }

    fn subject_id(&self) -> String {
        self.uuid.clone()
    }
}

/// Setting as returned to clients, with the value decoded as JSON when it parses.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SettingView {
    pub uuid: String,
    pub key: String,
    #[schema(value_type = Object)]
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Setting> for SettingView {
    fn from(s: Setting) -> Self {
        Self {
            uuid: s.uuid,
            key: s.key,
            value: decode_value(s.value.as_deref()),
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

/// Stored text -> JSON; text that is not valid JSON comes back as a string.
pub fn decode_value(raw: Option<&str>) -> Value {
    match raw {
        None => Value::Null,
        Some(text) => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())),
    }
}

/// JSON -> stored text; strings are kept verbatim.
pub fn encode_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SettingPayload {
    #[schema(example = "site_title")]
    #[validate(custom(function = "crate::extract::not_blank", message = "Key is required"))]
    pub key: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SettingUpdate {
    #[validate(custom(function = "crate::extract::not_blank", message = "Key cannot be empty"))]
    pub key: Option<String>,
    #[schema(value_type = Object)]
    pub value: Option<Value>,
}
