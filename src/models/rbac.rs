use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Role {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub scope: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for Role {
    fn entity_type() -> &'static str {
        "role"
    }

    fn subject_id(&self) -> String {
        self.id.to_string()
    }

    fn severity(&self) -> crate::events::Severity {
        crate::events::Severity::Critical
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Permission {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub scope: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for Permission {
    fn entity_type() -> &'static str {
        "permission"
    }

    fn subject_id(&self) -> String {
        self.id.to_string()
    }

    fn severity(&self) -> crate::events::Severity {
        crate::events::Severity::Critical
    }
}

/// Compact permission shape embedded in user payloads.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PermissionSummary {
    pub id: i64,
    pub slug: String,
    pub title: String,
}

impl From<Permission> for PermissionSummary {
    fn from(p: Permission) -> Self {
        Self {
            id: p.id,
            slug: p.slug,
            title: p.title,
        }
    }
}

// =============================================================================
// REQUEST DTOs
// =============================================================================

/// Title is optional at the type level so a missing title is reported as a field error.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AclEntryCreateRequest {
    #[schema(example = "Admin Team")]
    pub title: Option<String>,
    #[schema(example = "default")]
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AclEntryUpdateRequest {
    pub title: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RolePermissionRequest {
    pub role_id: i64,
    pub permission_id: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserRoleRequest {
    /// User uuid.
    pub user_id: String,
    pub role_id: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserPermissionRequest {
    /// User uuid.
    pub user_id: String,
    pub permission_id: i64,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PermissionCheckQuery {
    pub permission: String,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RoleCheckQuery {
    pub role: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionCheckResponse {
    pub has_permission: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleCheckResponse {
    pub has_role: bool,
}
