use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Declares a stored-as-text enum.
///
/// Serialises with the given literal, stores the same literal in SQLite and
/// deserialises leniently (case, spaces, hyphens and underscores ignored), so
/// `"In Review"`, `"in_review"` and `"inreview"` all read as the same variant.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident = $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, sqlx::Type, utoipa::ToSchema)]
        pub enum $name {
            $(
                #[serde(rename = $value)]
                #[sqlx(rename = $value)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $value,)+
                }
            }

            pub fn from_filter(raw: &str) -> Option<Self> {
                let wanted = $crate::models::compact_key(raw);
                Self::ALL
                    .iter()
                    .copied()
                    .find(|variant| $crate::models::compact_key(variant.as_str()) == wanted)
            }

            /// List-filter normaliser: unknown values yield `None` and the filter is skipped.
            pub fn filter_value(raw: &str) -> Option<$crate::query::FilterValue> {
                Self::from_filter(raw).map(|variant| $crate::query::FilterValue::Text(variant.as_str().to_string()))
            }

            fn expected() -> String {
                Self::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", ")
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::from_filter(&raw).ok_or_else(|| {
                    serde::de::Error::custom(format!("unknown value `{raw}`, expected one of: {}", Self::expected()))
                })
            }
        }
    };
}

pub mod commissioner;
pub mod complaint;
pub mod contact;
pub mod dashboard;
pub mod faq;
pub mod media;
pub mod news;
pub mod notification;
pub mod rbac;
pub mod request;
pub mod resource;
pub mod setting;
pub mod user;

/// `filter_key` without separators, used to compare enum spellings.
pub(crate) fn compact_key(raw: &str) -> String {
    crate::query::filter_key(raw).replace('_', "")
}

text_enum! {
    /// Publication state shared by news and resources.
    pub enum PublishStatus {
        Draft = "draft",
        Published = "published",
    }
}

impl Default for PublishStatus {
    fn default() -> Self {
        PublishStatus::Draft
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// `Page<T>` as documented in OpenAPI; utoipa cannot derive generic schemas here.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PageDoc {
    pub meta: crate::query::PageMeta,
    pub data: Vec<serde_json::Value>,
    pub stats: Option<std::collections::BTreeMap<String, i64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_enum_parsing() {
        assert_eq!(PublishStatus::from_filter(" Published "), Some(PublishStatus::Published));
        assert_eq!(PublishStatus::from_filter("archived"), None);
        let parsed: PublishStatus = serde_json::from_str("\"DRAFT\"").expect("parse");
        assert_eq!(parsed, PublishStatus::Draft);
        assert!(serde_json::from_str::<PublishStatus>("\"gone\"").is_err());
    }

    #[test]
    fn serialises_stored_literal() {
        assert_eq!(serde_json::to_string(&PublishStatus::Published).expect("json"), "\"published\"");
        assert_eq!(PublishStatus::Draft.to_string(), "draft");
    }
}
