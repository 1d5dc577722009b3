use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use sqlx::SqlitePool;

use crate::app::AppState;
use crate::authz::AccessRule;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, log_activity_with_context, RequestContext};
use crate::extract::ValidatedJson;
use crate::jwt::AuthUser;
use crate::models::user::{self, DbUser, User, UserCreateRequest, UserUpdateRequest, UserWithAccess};
use crate::models::{MessageResponse, PageDoc};
use crate::query::{ListParams, Page};
use crate::routes::users::{apply_account_update, insert_account, list_accounts, with_access};

pub fn routes(state: &AppState) -> Router<AppState> {
    state.guard(
        AccessRule::admin(),
        Router::new()
            .route("/", get(list_admins).post(create_admin))
            .route("/:uuid", get(get_admin).put(update_admin).delete(delete_admin)),
    )
}

/// Only admin-flagged accounts resolve here.
async fn find_admin(pool: &SqlitePool, uuid: &str) -> AppResult<DbUser> {
    match user::find_by_uuid(pool, uuid).await {
        Ok(db_user) if db_user.is_admin => Ok(db_user),
        Ok(_) | Err(AppError::NotFound(_)) => Err(AppError::entity_not_found("Admin")),
        Err(err) => Err(err),
    }
}

#[utoipa::path(
    get,
    path = "/api/admins",
    tag = "Admins",
    params(ListParams),
    responses((status = 200, description = "Paginated admins with stats", body = PageDoc)),
    security(("bearerAuth" = []))
)]
pub async fn list_admins(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<UserWithAccess>>> {
    Ok(Json(list_accounts(&state, &params, true).await?))
}

#[utoipa::path(
    post,
    path = "/api/admins",
    tag = "Admins",
    request_body = UserCreateRequest,
    responses(
        (status = 201, description = "Admin created", body = UserWithAccess),
        (status = 409, description = "Email already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_admin(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(payload): ValidatedJson<UserCreateRequest>,
) -> AppResult<(StatusCode, Json<UserWithAccess>)> {
    let db_user = insert_account(&state, payload, true).await?;
    let account = with_access(&state, db_user).await?;

    tracing::info!(user_id = %account.user.id, "admin created");
    log_activity(&state.event_bus, "created", Some(auth.uuid), &account.user);
    Ok((StatusCode::CREATED, Json(account)))
}

#[utoipa::path(
    get,
    path = "/api/admins/{uuid}",
    tag = "Admins",
    params(("uuid" = String, Path, description = "Admin uuid")),
    responses(
        (status = 200, description = "Admin detail", body = UserWithAccess),
        (status = 404, description = "Admin not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_admin(State(state): State<AppState>, Path(uuid): Path<String>) -> AppResult<Json<UserWithAccess>> {
    let db_user = find_admin(&state.pool, &uuid).await?;
    Ok(Json(with_access(&state, db_user).await?))
}

#[utoipa::path(
    put,
    path = "/api/admins/{uuid}",
    tag = "Admins",
    params(("uuid" = String, Path, description = "Admin uuid")),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "Admin updated", body = UserWithAccess),
        (status = 404, description = "Admin not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_admin(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(uuid): Path<String>,
    ValidatedJson(payload): ValidatedJson<UserUpdateRequest>,
) -> AppResult<Json<UserWithAccess>> {
    let db_user = find_admin(&state.pool, &uuid).await?;
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
    path = "/api/admins/{uuid}",
    tag = "Admins",
    params(("uuid" = String, Path, description = "Admin uuid")),
    responses(
        (status = 200, description = "Admin deleted", body = MessageResponse),
        (status = 404, description = "Admin not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_admin(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(uuid): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let db_user = find_admin(&state.pool, &uuid).await?;
    if db_user.id == auth.user_id {
        return Err(AppError::conflict("You cannot delete your own account"));
    }
    super::delete_by_id(&state.pool, "users", db_user.id).await?;

    let removed: User = db_user.try_into()?;
    log_activity(&state.event_bus, "deleted", Some(auth.uuid), &removed);
    Ok(Json(MessageResponse::new("Admin deleted successfully")))
}
