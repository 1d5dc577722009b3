use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::AccessRule;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, log_activity_with_context, RequestContext};
use crate::extract::ValidatedJson;
use crate::jwt::AuthUser;
use crate::models::rbac::PermissionSummary;
use crate::models::user::{
    self, ChangePasswordRequest, DbUser, ProfileUpdateRequest, User, UserCreateRequest, UserUpdateRequest,
    UserWithAccess,
};
use crate::models::{MessageResponse, PageDoc};
use crate::query::{FilterValue, ListParams, ListSpec, Page, Stats};
use crate::routes::auth::{email_conflict, ensure_email_available};
use crate::utils::{hash_password, non_empty, normalize_email, utc_now, verify_password};

pub fn routes(state: &AppState) -> Router<AppState> {
    let admin = state.guard(
        AccessRule::admin(),
        Router::new()
            .route("/", get(list_users).post(create_user))
            .route("/stats", get(user_stats))
            .route("/:uuid", get(get_user).put(update_user).delete(delete_user)),
    );

    Router::new()
        .route("/me", put(update_profile))
        .route("/change-password", post(change_password))
        .merge(admin)
}

/// Attaches role slugs and effective permissions.
pub(crate) async fn with_access(state: &AppState, db_user: DbUser) -> AppResult<UserWithAccess> {
    let acl = state.acl();
    let roles = acl.role_slugs(db_user.id).await?;
    let permissions = acl
        .effective_permissions(db_user.id)
        .await?
        .into_iter()
        .map(PermissionSummary::from)
        .collect();

    Ok(UserWithAccess {
        user: db_user.try_into()?,
        roles,
        permissions,
    })
}

fn user_status(raw: &str) -> Option<FilterValue> {
    match crate::query::filter_key(raw).as_str() {
        "active" => Some(FilterValue::Int(1)),
        "inactive" => Some(FilterValue::Int(0)),
        _ => None,
    }
}

/// Shared by `/users` and `/admins`; the role filter only applies to a known slug.
pub(crate) async fn user_list_spec(state: &AppState, params: &ListParams, admins_only: bool) -> AppResult<ListSpec> {
    let mut spec = ListSpec::new("users")
        .search(&["full_name", "email"])
        .filter("status", "is_active", user_status)
        .sortable(&["full_name", "email", "created_at", "updated_at"]);

    if admins_only {
        spec = spec.scope_eq("is_admin", FilterValue::Int(1));
    }

    if let Some(slug) = params.get("role") {
        match state.acl().role_by_slug(slug).await {
            Ok(role) => {
                spec = spec.scope_sql(
                    "id IN (SELECT user_id FROM user_roles WHERE role_id = ?)",
                    FilterValue::Int(role.id),
                );
            }
            Err(AppError::NotFound(_)) => {
                tracing::debug!(role = slug, "ignoring unknown role filter");
            }
            Err(err) => return Err(err),
        }
    }

    Ok(spec)
}

#[derive(FromRow)]
struct UserCounts {
    total: i64,
    active: i64,
    inactive: i64,
    admins: i64,
}

pub(crate) async fn count_users(pool: &SqlitePool, admins_only: bool) -> AppResult<Stats> {
    let scope = if admins_only { " WHERE is_admin = 1" } else { "" };
    let counts = sqlx::query_as::<_, UserCounts>(&format!(
        "SELECT COUNT(*) AS total, \
         COALESCE(SUM(is_active = 1), 0) AS active, \
         COALESCE(SUM(is_active = 0), 0) AS inactive, \
         COALESCE(SUM(is_admin = 1), 0) AS admins \
         FROM users{scope}"
    ))
    .fetch_one(pool)
    .await?;

    Ok(Stats::from([
        ("total".to_string(), counts.total),
        ("active".to_string(), counts.active),
        ("inactive".to_string(), counts.inactive),
        ("admins".to_string(), counts.admins),
    ]))
}

pub(crate) async fn list_accounts(
    state: &AppState,
    params: &ListParams,
    admins_only: bool,
) -> AppResult<Page<UserWithAccess>> {
    let spec = user_list_spec(state, params, admins_only).await?;
    let page = spec.fetch_page::<DbUser>(&state.pool, params).await?;
    let stats = count_users(&state.pool, admins_only).await?;

    let mut data = Vec::with_capacity(page.data.len());
    for db_user in page.data {
        data.push(with_access(state, db_user).await?);
    }

    Ok(Page {
        meta: page.meta,
        data,
        stats: Some(stats),
    })
}

/// Inserts an active, verified account and grants `role_id` when present.
pub(crate) async fn insert_account(state: &AppState, payload: UserCreateRequest, is_admin: bool) -> AppResult<DbUser> {
    let email = normalize_email(&payload.email);
    ensure_email_available(&state.pool, &email).await?;

    let acl = state.acl();
    let role = match payload.role_id {
        Some(role_id) => Some(acl.role(role_id).await?),
        None => None,
    };

    let password = hash_password(&payload.password)?;
    let now = utc_now();
    let uuid = Uuid::new_v4().to_string();

    let result = sqlx::query(
        "INSERT INTO users (uuid, full_name, email, password, is_admin, is_active, email_verified_at, created_at, updated_at) VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?)",
    )
    .bind(&uuid)
    .bind(non_empty(payload.full_name))
    .bind(&email)
    .bind(password)
    .bind(is_admin)
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await
    .map_err(email_conflict)?;

    let user_id = result.last_insert_rowid();
    if let Some(role) = role {
        acl.assign_role(user_id, &role.slug).await?;
    }

    user::find_by_id(&state.pool, user_id).await
}

/// Applies an administrative update, including the single-role replacement.
pub(crate) async fn apply_account_update(
    state: &AppState,
    mut db_user: DbUser,
    payload: UserUpdateRequest,
) -> AppResult<DbUser> {
    let acl = state.acl();

    if let Some(email) = payload.email.as_deref().map(normalize_email) {
        if email != db_user.email {
            ensure_email_available(&state.pool, &email).await?;
            db_user.email = email;
        }
    }
    if payload.full_name.is_some() {
        db_user.full_name = non_empty(payload.full_name);
    }
    if let Some(password) = payload.password.as_deref() {
        db_user.password = hash_password(password)?;
    }
    if let Some(is_active) = payload.is_active {
        db_user.is_active = is_active;
    }
    if payload.gender.is_some() {
        db_user.gender = payload.gender;
    }
    if payload.date_of_birth.is_some() {
        db_user.date_of_birth = payload.date_of_birth;
    }
    if payload.image_url.is_some() {
        db_user.image_url = non_empty(payload.image_url);
    }

    let role = match payload.role_id {
        Some(role_id) => Some(acl.role(role_id).await?),
        None => None,
    };

    save_profile(&state.pool, &db_user).await?;

    if let Some(role) = role {
        acl.sync_roles(db_user.id, &[role.slug.as_str()]).await?;
    }

    user::find_by_id(&state.pool, db_user.id).await
}

async fn save_profile(pool: &SqlitePool, db_user: &DbUser) -> AppResult<()> {
    sqlx::query(
        "UPDATE users SET full_name = ?, email = ?, password = ?, is_active = ?, gender = ?, date_of_birth = ?, image_url = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&db_user.full_name)
    .bind(&db_user.email)
    .bind(&db_user.password)
    .bind(db_user.is_active)
    .bind(db_user.gender)
    .bind(db_user.date_of_birth)
    .bind(&db_user.image_url)
    .bind(utc_now())
    .bind(db_user.id)
    .execute(pool)
    .await
    .map_err(email_conflict)?;
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    params(ListParams),
    responses((status = 200, description = "Paginated users with stats", body = PageDoc)),
    security(("bearerAuth" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<UserWithAccess>>> {
    Ok(Json(list_accounts(&state, &params, false).await?))
}

#[utoipa::path(
    post,
    path = "/api/users",
    tag = "Users",
    request_body = UserCreateRequest,
    responses(
        (status = 201, description = "User created", body = UserWithAccess),
        (status = 404, description = "Role not found"),
        (status = 409, description = "Email already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(payload): ValidatedJson<UserCreateRequest>,
) -> AppResult<(StatusCode, Json<UserWithAccess>)> {
    let db_user = insert_account(&state, payload, false).await?;
    let account = with_access(&state, db_user).await?;

    log_activity(&state.event_bus, "created", Some(auth.uuid), &account.user);
    Ok((StatusCode::CREATED, Json(account)))
}

#[utoipa::path(
    get,
    path = "/api/users/stats",
    tag = "Users",
    responses((status = 200, description = "Total, active, inactive and admin counts")),
    security(("bearerAuth" = []))
)]
pub async fn user_stats(State(state): State<AppState>) -> AppResult<Json<Stats>> {
    Ok(Json(count_users(&state.pool, false).await?))
}

#[utoipa::path(
    get,
    path = "/api/users/{uuid}",
    tag = "Users",
    params(("uuid" = String, Path, description = "User uuid")),
    responses(
        (status = 200, description = "User detail", body = UserWithAccess),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_user(State(state): State<AppState>, Path(uuid): Path<String>) -> AppResult<Json<UserWithAccess>> {
    let db_user = user::find_by_uuid(&state.pool, &uuid).await?;
    Ok(Json(with_access(&state, db_user).await?))
}

#[utoipa::path(
    put,
    path = "/api/users/{uuid}",
    tag = "Users",
    params(("uuid" = String, Path, description = "User uuid")),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "User updated", body = UserWithAccess),
        (status = 404, description = "User or role not found"),
        (status = 409, description = "Email already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(uuid): Path<String>,
    ValidatedJson(payload): ValidatedJson<UserUpdateRequest>,
) -> AppResult<Json<UserWithAccess>> {
    let db_user = user::find_by_uuid(&state.pool, &uuid).await?;
    let old: User = db_user.clone().try_into()?;

    let updated = apply_account_update(&state, db_user, payload).await?;
    let account = with_access(&state, updated).await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.uuid),
        &account.user,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );
    Ok(Json(account))
}

#[utoipa::path(
    delete,
    path = "/api/users/{uuid}",
    tag = "Users",
    params(("uuid" = String, Path, description = "User uuid")),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(uuid): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let db_user = user::find_by_uuid(&state.pool, &uuid).await?;
    super::delete_by_id(&state.pool, "users", db_user.id).await?;

    let removed: User = db_user.try_into()?;
    tracing::info!(user_id = %removed.id, "user deleted");
    log_activity(&state.event_bus, "deleted", Some(auth.uuid), &removed);
    Ok(Json(MessageResponse::new("User deleted successfully")))
}

#[utoipa::path(
    put,
    path = "/api/users/me",
    tag = "Users",
    request_body = ProfileUpdateRequest,
    responses((status = 200, description = "Profile updated", body = UserWithAccess)),
    security(("bearerAuth" = []))
)]
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(payload): ValidatedJson<ProfileUpdateRequest>,
) -> AppResult<Json<UserWithAccess>> {
    let mut db_user = user::find_by_id(&state.pool, auth.user_id).await?;
    let old: User = db_user.clone().try_into()?;

    if let Some(name) = payload.resolved_name() {
        db_user.full_name = Some(name);
    }
    if payload.gender.is_some() {
        db_user.gender = payload.gender;
    }
    if payload.date_of_birth.is_some() {
        db_user.date_of_birth = payload.date_of_birth;
    }

    save_profile(&state.pool, &db_user).await?;
    let account = with_access(&state, user::find_by_id(&state.pool, auth.user_id).await?).await?;

    log_activity_with_context(&state.event_bus, "updated", Some(auth.uuid), &account.user, Some(&old), None);
    Ok(Json(account))
}

#[utoipa::path(
    post,
    path = "/api/users/change-password",
    tag = "Users",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 422, description = "Incorrect password or validation failure")
    ),
    security(("bearerAuth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(payload): ValidatedJson<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let db_user = user::find_by_id(&state.pool, auth.user_id).await?;
    if !verify_password(&payload.current_password, &db_user.password)? {
        return Err(AppError::invalid_field("current_password", "Incorrect password"));
    }

    sqlx::query("UPDATE users SET password = ?, updated_at = ? WHERE id = ?")
        .bind(hash_password(&payload.password)?)
        .bind(utc_now())
        .bind(db_user.id)
        .execute(&state.pool)
        .await?;

    tracing::info!(user_id = %auth.uuid, "password changed");
    Ok(Json(MessageResponse::new("Password changed successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_filter_maps_to_flag() {
        assert_eq!(user_status("Active"), Some(FilterValue::Int(1)));
        assert_eq!(user_status("inactive"), Some(FilterValue::Int(0)));
        assert_eq!(user_status("banned"), None);
    }
}
