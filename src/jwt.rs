use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
    pub exp_hours: i64,
}

impl JwtConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        let exp_hours = std::env::var("JWT_EXP_HOURS")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(24))
            .map_err(|_| AppError::configuration("JWT_EXP_HOURS must be a valid integer"))?;

        Ok(Self {
            secret: Arc::new(secret.into_bytes()),
            exp_hours,
        })
    }

    pub fn encode(&self, user_uuid: Uuid) -> Result<String, AppError> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.exp_hours);

        let claims = Claims {
            sub: user_uuid,
            jti: Uuid::new_v4(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|err| AppError::token(err.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|err| AppError::token(err.to_string()))
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    /// User uuid.
    pub sub: Uuid,
    /// Token id, recorded on logout.
    pub jti: Uuid,
    pub exp: usize,
    pub iat: usize,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp as i64, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// The authenticated caller, resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub uuid: Uuid,
    pub is_admin: bool,
    pub claims: Claims,
}

#[derive(FromRow)]
struct TokenOwner {
    id: i64,
    is_active: bool,
    is_admin: bool,
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Decodes the bearer token and checks that it was not revoked and that its owner is still active.
pub async fn authenticate(pool: &SqlitePool, jwt: &JwtConfig, headers: &HeaderMap) -> AppResult<AuthUser> {
    let token = bearer_token(headers).ok_or_else(|| AppError::unauthorized("Authorization header missing"))?;
    let claims = jwt.decode(token)?;

    let revoked: Option<i64> = sqlx::query_scalar("SELECT 1 FROM revoked_tokens WHERE jti = ?")
        .bind(claims.jti.to_string())
        .fetch_optional(pool)
        .await?;
    if revoked.is_some() {
        return Err(AppError::unauthorized("Token has been revoked"));
    }

    let owner = sqlx::query_as::<_, TokenOwner>("SELECT id, is_active, is_admin FROM users WHERE uuid = ?")
        .bind(claims.sub.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::unauthorized("User no longer exists"))?;

    if !owner.is_active {
        return Err(AppError::unauthorized("Your account has been deactivated"));
    }

    Ok(AuthUser {
        user_id: owner.id,
        uuid: claims.sub,
        is_admin: owner.is_admin,
        claims,
    })
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let user = authenticate(&state.pool, &state.jwt, &parts.headers).await?;
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config() -> JwtConfig {
        JwtConfig {
            secret: Arc::new(b"unit-test-secret".to_vec()),
            exp_hours: 1,
        }
    }

    #[test]
    fn round_trips_subject_and_unique_jti() {
        let cfg = config();
        let subject = Uuid::new_v4();
        let first = cfg.decode(&cfg.encode(subject).expect("encode")).expect("decode");
        let second = cfg.decode(&cfg.encode(subject).expect("encode")).expect("decode");
        assert_eq!(first.sub, subject);
        assert_ne!(first.jti, second.jti);
    }

    #[test]
    fn rejects_foreign_signature() {
        let token = config().encode(Uuid::new_v4()).expect("encode");
        let other = JwtConfig {
            secret: Arc::new(b"another-secret".to_vec()),
            exp_hours: 1,
        };
        assert!(other.decode(&token).is_err());
    }

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Token abc"));
        assert!(bearer_token(&headers).is_none());
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
    }
}
