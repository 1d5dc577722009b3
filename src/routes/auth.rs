use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::effects::Mailer;
use crate::errors::{is_unique_violation, AppError, AppResult};
use crate::events::log_activity;
use crate::extract::ValidatedJson;
use crate::jwt::AuthUser;
use crate::models::user::{
    self, AuthResponse, AvailabilityQuery, AvailabilityResponse, DbUser, EmailRequest, LoginRequest, OtpRequest,
    ResetPasswordRequest, SignupRequest, User, UserWithAccess,
};
use crate::models::MessageResponse;
use crate::routes::users::with_access;
use crate::utils::{generate_otp, hash_password, non_empty, normalize_email, utc_now, verify_password};

const INVALID_OTP: &str = "Invalid or expired OTP";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/authenticated", get(authenticated))
        .route("/resend-otp", post(resend_otp))
        .route("/verify-otp", post(verify_otp))
        .route("/send-reset-password-otp", post(send_reset_password_otp))
        .route("/verify-reset-password-otp", post(verify_reset_password_otp))
        .route("/reset-password", post(reset_password))
        .route("/username/is-available", get(is_available))
}

#[utoipa::path(
    post,
    path = "/api/auth/signup",
    tag = "Auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 409, description = "Email already in use"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<SignupRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let email = normalize_email(&payload.email);
    ensure_email_available(&state.pool, &email).await?;

    let password = hash_password(&payload.password)?;
    let full_name = non_empty(payload.full_name);
    let otp = generate_otp();
    let now = utc_now();
    let uuid = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO users (uuid, full_name, email, password, otp, otp_expiry, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(uuid.to_string())
    .bind(&full_name)
    .bind(&email)
    .bind(password)
    .bind(&otp)
    .bind(otp_expiry(&state, now))
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await
    .map_err(email_conflict)?;

    state.effects.send_mail(Mailer::verification_message(
        &email,
        full_name.as_deref(),
        &otp,
        state.config.otp_ttl_minutes,
    ));

    let db_user = user::find_by_uuid(&state.pool, &uuid.to_string()).await?;
    let account = with_access(&state, db_user).await?;
    let token = state.jwt.encode(uuid)?;

    tracing::info!(user_id = %uuid, "user signed up");
    log_activity(&state.event_bus, "created", Some(uuid), &account.user);

    Ok((StatusCode::CREATED, Json(AuthResponse::bearer(account, token))))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account deactivated"),
        (status = 404, description = "User does not exist")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = normalize_email(&payload.email);
    let db_user = user::find_by_email(&state.pool, &email)
        .await?
        .ok_or_else(|| AppError::not_found("User does not exist"))?;

    if !db_user.is_active {
        return Err(AppError::forbidden(
            "Your account has been deactivated. Please contact support.",
        ));
    }

    if !verify_password(&payload.password, &db_user.password)? {
        return Err(AppError::unauthorized("Invalid credentials"));
    }

    if !db_user.is_verified() {
        issue_verification_otp(&state, &db_user).await?;
    }

    let account = with_access(&state, db_user).await?;
    let token = state.jwt.encode(account.user.id)?;

    tracing::info!(user_id = %account.user.id, "user logged in");
    log_activity(&state.event_bus, "login", Some(account.user.id), &account.user);

    Ok(Json(AuthResponse::bearer(account, token)))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Auth",
    responses(
        (status = 200, description = "Token revoked", body = MessageResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearerAuth" = []))
)]
pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<MessageResponse>> {
    sqlx::query("INSERT OR IGNORE INTO revoked_tokens (jti, user_id, expires_at, revoked_at) VALUES (?, ?, ?, ?)")
        .bind(auth.claims.jti.to_string())
        .bind(auth.user_id)
        .bind(auth.claims.expires_at())
        .bind(utc_now())
        .execute(&state.pool)
        .await?;

    tracing::info!(user_id = %auth.uuid, "user logged out");
    Ok(Json(MessageResponse::new("Logged out successfully")))
}

#[utoipa::path(
    get,
    path = "/api/auth/authenticated",
    tag = "Auth",
    responses((status = 200, description = "Current user with roles and permissions", body = UserWithAccess)),
    security(("bearerAuth" = []))
)]
pub async fn authenticated(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<UserWithAccess>> {
    let db_user = user::find_by_id(&state.pool, auth.user_id).await?;
    Ok(Json(with_access(&state, db_user).await?))
}

#[utoipa::path(
    post,
    path = "/api/auth/resend-otp",
    tag = "Auth",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "A new code was sent", body = MessageResponse),
        (status = 404, description = "User not found"),
        (status = 409, description = "Email already verified")
    )
)]
pub async fn resend_otp(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<EmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    let db_user = existing_user(&state.pool, &payload.email).await?;
    if db_user.is_verified() {
        return Err(AppError::conflict("Email already verified"));
    }

    issue_verification_otp(&state, &db_user).await?;
    Ok(Json(MessageResponse::new("Verification code sent")))
}

#[utoipa::path(
    post,
    path = "/api/auth/verify-otp",
    tag = "Auth",
    request_body = OtpRequest,
    responses(
        (status = 200, description = "Email verified", body = User),
        (status = 404, description = "User not found"),
        (status = 406, description = "Invalid or expired OTP"),
        (status = 409, description = "Email already verified")
    )
)]
pub async fn verify_otp(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<OtpRequest>,
) -> AppResult<Json<User>> {
    let db_user = existing_user(&state.pool, &payload.email).await?;
    if db_user.is_verified() {
        return Err(AppError::conflict("Email already verified"));
    }

    let now = utc_now();
    if !otp_matches(db_user.otp.as_deref(), db_user.otp_expiry, &payload.otp, now) {
        return Err(AppError::not_acceptable(INVALID_OTP));
    }

    sqlx::query("UPDATE users SET email_verified_at = ?, otp = NULL, otp_expiry = NULL, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(now)
        .bind(db_user.id)
        .execute(&state.pool)
        .await?;

    let verified: User = user::find_by_id(&state.pool, db_user.id).await?.try_into()?;
    log_activity(&state.event_bus, "verified", Some(verified.id), &verified);
    Ok(Json(verified))
}

#[utoipa::path(
    post,
    path = "/api/auth/send-reset-password-otp",
    tag = "Auth",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Reset code sent", body = MessageResponse),
        (status = 404, description = "User not found")
    )
)]
pub async fn send_reset_password_otp(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<EmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    let db_user = existing_user(&state.pool, &payload.email).await?;
    let otp = generate_otp();
    let now = utc_now();

    sqlx::query("UPDATE users SET reset_password_otp = ?, reset_password_otp_expiry = ?, updated_at = ? WHERE id = ?")
        .bind(&otp)
        .bind(otp_expiry(&state, now))
        .bind(now)
        .bind(db_user.id)
        .execute(&state.pool)
        .await?;

    state.effects.send_mail(Mailer::password_reset_message(
        &db_user.email,
        db_user.full_name.as_deref(),
        &otp,
        state.config.otp_ttl_minutes,
    ));

    Ok(Json(MessageResponse::new("Password reset code sent")))
}

#[utoipa::path(
    post,
    path = "/api/auth/verify-reset-password-otp",
    tag = "Auth",
    request_body = OtpRequest,
    responses(
        (status = 200, description = "Code is valid", body = MessageResponse),
        (status = 404, description = "User not found"),
        (status = 406, description = "Invalid or expired OTP")
    )
)]
pub async fn verify_reset_password_otp(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<OtpRequest>,
) -> AppResult<Json<MessageResponse>> {
    let db_user = existing_user(&state.pool, &payload.email).await?;
    ensure_reset_otp(&db_user, &payload.otp)?;
    Ok(Json(MessageResponse::new("OTP verified")))
}

#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    tag = "Auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 404, description = "User not found"),
        (status = 406, description = "Invalid or expired OTP"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let db_user = existing_user(&state.pool, &payload.email).await?;
    ensure_reset_otp(&db_user, &payload.otp)?;

    let password = hash_password(&payload.password)?;
    sqlx::query(
        "UPDATE users SET password = ?, reset_password_otp = NULL, reset_password_otp_expiry = NULL, updated_at = ? WHERE id = ?",
    )
    .bind(password)
    .bind(utc_now())
    .bind(db_user.id)
    .execute(&state.pool)
    .await?;

    tracing::info!(user_id = %db_user.uuid, "password reset");
    Ok(Json(MessageResponse::new("Password has been reset")))
}

#[utoipa::path(
    get,
    path = "/api/auth/username/is-available",
    tag = "Auth",
    params(AvailabilityQuery),
    responses((status = 200, description = "Whether the email is free", body = AvailabilityResponse))
)]
pub async fn is_available(
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> AppResult<Json<AvailabilityResponse>> {
    let taken = user::find_by_email(&state.pool, &normalize_email(&query.email)).await?;
    Ok(Json(AvailabilityResponse {
        available: taken.is_none(),
    }))
}

pub(crate) async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    if user::find_by_email(pool, email).await?.is_some() {
        return Err(AppError::conflict("This email is already in use"));
    }
    Ok(())
}

/// Maps a lost race on `users.email` to the same 409 as the pre-check.
pub(crate) fn email_conflict(err: sqlx::Error) -> AppError {
    if is_unique_violation(&err, Some("users.email")) {
        AppError::conflict("This email is already in use")
    } else {
        err.into()
    }
}

async fn existing_user(pool: &SqlitePool, email: &str) -> AppResult<DbUser> {
    user::find_by_email(pool, &normalize_email(email))
        .await?
        .ok_or_else(|| AppError::entity_not_found("User"))
}

async fn issue_verification_otp(state: &AppState, db_user: &DbUser) -> AppResult<()> {
    let otp = generate_otp();
    let now = utc_now();

    sqlx::query("UPDATE users SET otp = ?, otp_expiry = ?, updated_at = ? WHERE id = ?")
        .bind(&otp)
        .bind(otp_expiry(state, now))
        .bind(now)
        .bind(db_user.id)
        .execute(&state.pool)
        .await?;

    state.effects.send_mail(Mailer::verification_message(
        &db_user.email,
        db_user.full_name.as_deref(),
        &otp,
        state.config.otp_ttl_minutes,
    ));
    Ok(())
}

fn ensure_reset_otp(db_user: &DbUser, otp: &str) -> AppResult<()> {
    if otp_matches(
        db_user.reset_password_otp.as_deref(),
        db_user.reset_password_otp_expiry,
        otp,
        utc_now(),
    ) {
        Ok(())
    } else {
        Err(AppError::not_acceptable(INVALID_OTP))
    }
}

fn otp_expiry(state: &AppState, now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::minutes(state.config.otp_ttl_minutes)
}

/// Stored code equals the presented one and has not expired.
fn otp_matches(stored: Option<&str>, expiry: Option<DateTime<Utc>>, presented: &str, now: DateTime<Utc>) -> bool {
    match (stored, expiry) {
        (Some(stored), Some(expiry)) => stored == presented.trim() && expiry > now,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_must_match_and_be_fresh() {
        let now = Utc::now();
        let later = now + Duration::minutes(5);
        assert!(otp_matches(Some("123456"), Some(later), " 123456 ", now));
        assert!(!otp_matches(Some("123456"), Some(later), "654321", now));
        assert!(!otp_matches(Some("123456"), Some(now - Duration::seconds(1)), "123456", now));
        assert!(!otp_matches(None, Some(later), "123456", now));
    }
}
