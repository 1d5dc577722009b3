use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::errors::{AppError, AppResult};
use crate::models::rbac::PermissionSummary;
use crate::utils::split_name;

text_enum! {
    pub enum Gender {
        Male = "male",
        Female = "female",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<NaiveDate>,
    pub image_url: Option<String>,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for User {
    fn entity_type() -> &'static str {
        "user"
    }

    fn subject_id(&self) -> String {
        self.id.to_string()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: i64,
    pub uuid: String,
    pub full_name: Option<String>,
    pub email: String,
    pub password: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<NaiveDate>,
    pub image_url: Option<String>,
    pub otp: Option<String>,
    pub otp_expiry: Option<DateTime<Utc>>,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub reset_password_otp: Option<String>,
    pub reset_password_otp_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbUser {
    pub fn is_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(value: DbUser) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.uuid)
            .map_err(|err| AppError::internal(format!("invalid user uuid {}: {err}", value.uuid)))?;
        let (first_name, last_name) = split_name(value.full_name.as_deref());

        Ok(User {
            id,
            full_name: value.full_name,
            first_name,
            last_name,
            email: value.email,
            is_admin: value.is_admin,
            is_active: value.is_active,
            gender: value.gender,
            date_of_birth: value.date_of_birth,
            image_url: value.image_url,
            email_verified_at: value.email_verified_at,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

pub async fn find_by_uuid(pool: &SqlitePool, uuid: &str) -> AppResult<DbUser> {
    sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE uuid = ?")
        .bind(uuid)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::entity_not_found("User"))
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<DbUser> {
    sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::entity_not_found("User"))
}

/// Looks up by the already-normalized email.
pub async fn find_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<DbUser>> {
    Ok(sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?)
}

/// A user together with the role slugs and effective permissions it holds.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserWithAccess {
    #[serde(flatten)]
    pub user: User,
    pub roles: Vec<String>,
    pub permissions: Vec<PermissionSummary>,
}

// =============================================================================
// AUTH DTOs
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[schema(example = "Ada Lovelace")]
    pub full_name: Option<String>,
    #[schema(example = "ada@example.com")]
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "ada@example.com")]
    #[serde(alias = "user_id")]
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserWithAccess,
    pub access_token: String,
    pub token_type: String,
}

impl AuthResponse {
    pub fn bearer(user: UserWithAccess, access_token: String) -> Self {
        Self {
            user,
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EmailRequest {
    #[schema(example = "ada@example.com")]
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct OtpRequest {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[schema(example = "042917")]
    #[validate(length(min = 1, message = "OTP is required"))]
    pub otp: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "OTP is required"))]
    pub otp: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub confirm_password: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AvailabilityQuery {
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AvailabilityResponse {
    pub available: bool,
}

// =============================================================================
// ADMINISTRATION DTOs
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UserCreateRequest {
    #[schema(example = "Grace Hopper")]
    pub full_name: Option<String>,
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub role_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UserUpdateRequest {
    pub full_name: Option<String>,
    #[validate(email(message = "A valid email is required"))]
    pub email: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,
    pub is_active: Option<bool>,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<NaiveDate>,
    pub image_url: Option<String>,
    /// Replaces the role set with this single role.
    pub role_id: Option<i64>,
}

/// Self-service profile edit. `full_name` wins over `first_name` + `last_name`.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct ProfileUpdateRequest {
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<NaiveDate>,
}

impl ProfileUpdateRequest {
    pub fn resolved_name(&self) -> Option<String> {
        if let Some(full) = crate::utils::non_empty(self.full_name.clone()) {
            return Some(full);
        }
        let first = crate::utils::non_empty(self.first_name.clone());
        let last = crate::utils::non_empty(self.last_name.clone());
        match (first, last) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first),
            (None, Some(last)) => Some(last),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub confirm_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_name_prefers_full_name() {
        let req = ProfileUpdateRequest {
            full_name: Some(" Ada King ".into()),
            first_name: Some("Ignored".into()),
            ..Default::default()
        };
        assert_eq!(req.resolved_name().as_deref(), Some("Ada King"));

        let req = ProfileUpdateRequest {
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            ..Default::default()
        };
        assert_eq!(req.resolved_name().as_deref(), Some("Ada Lovelace"));
    }

    #[test]
    fn reset_password_must_match() {
        let req = ResetPasswordRequest {
            email: "ada@example.com".into(),
            otp: "123456".into(),
            password: "password123".into(),
            confirm_password: "password124".into(),
        };
        let errors = req.validate().expect_err("mismatch");
        assert!(errors.field_errors().contains_key("confirm_password"));
    }

    #[test]
    fn db_user_splits_name() {
        let now = Utc::now();
        let row = DbUser {
            id: 1,
            uuid: Uuid::new_v4().to_string(),
            full_name: Some("Ada Augusta King".into()),
            email: "ada@example.com".into(),
            password: String::new(),
            is_admin: false,
            is_active: true,
            gender: None,
            date_of_birth: None,
            image_url: None,
            otp: None,
            otp_expiry: None,
            email_verified_at: None,
            reset_password_otp: None,
            reset_password_otp_expiry: None,
            created_at: now,
            updated_at: now,
        };
        let user = User::try_from(row).expect("convert");
        assert_eq!(user.first_name, "Ada");
        assert_eq!(user.last_name, "Augusta King");
    }
}
