//! HTTP surface over the role-permission store. Every route requires `super-admin`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::acl::Subject;
use crate::app::AppState;
use crate::authz::{roles, AccessRule};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, Loggable, Severity};
use crate::jwt::AuthUser;
use crate::models::rbac::{
    AclEntryCreateRequest, AclEntryUpdateRequest, Permission, PermissionCheckQuery, PermissionCheckResponse, Role,
    RoleCheckQuery, RoleCheckResponse, RolePermissionRequest, UserPermissionRequest, UserRoleRequest,
};
use crate::models::user;
use crate::models::{MessageResponse, PageDoc};
use crate::query::{ListParams, ListSpec, Page};

fn super_admin() -> AccessRule {
    AccessRule::roles([roles::SUPER_ADMIN])
}

pub fn role_routes(state: &AppState) -> Router<AppState> {
    state.guard(
        super_admin(),
        Router::new()
            .route("/", get(list_roles).post(create_role))
            .route("/assign-permission", post(assign_permission_to_role))
            .route("/remove-permission", post(remove_permission_from_role))
            .route("/:id", get(get_role).put(update_role).delete(delete_role))
            .route("/:id/permissions", get(role_permissions)),
    )
}

pub fn permission_routes(state: &AppState) -> Router<AppState> {
    state.guard(
        super_admin(),
        Router::new()
            .route("/", get(list_permissions).post(create_permission))
            .route(
                "/:id",
                get(get_permission).put(update_permission).delete(delete_permission),
            ),
    )
}

/// Mounted under `/users` next to the account routes.
pub fn user_routes(state: &AppState) -> Router<AppState> {
    state.guard(
        super_admin(),
        Router::new()
            .route("/assign-role", post(assign_role))
            .route("/remove-role", post(remove_role))
            .route("/assign-permission", post(assign_permission))
            .route("/remove-permission", post(remove_permission))
            .route("/:uuid/roles", get(user_roles))
            .route("/:uuid/permissions", get(user_permissions))
            .route("/:uuid/check-permission", get(check_permission))
            .route("/:uuid/check-role", get(check_role)),
    )
}

/// A grant or revoke between a subject and a role or permission.
#[derive(Debug, Serialize)]
struct GrantChange {
    subject: String,
    target: String,
}

impl GrantChange {
    fn new(subject: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            target: target.into(),
        }
    }
}

impl Loggable for GrantChange {
    fn entity_type() -> &'static str {
        "acl_grant"
    }

    fn subject_id(&self) -> String {
        self.subject.clone()
    }

    fn severity_for_action(&self, _action: &str) -> Severity {
        Severity::Critical
    }
}

fn catalog_spec(table: &'static str) -> ListSpec {
    ListSpec::new(table)
        .search(&["title", "slug", "scope"])
        .sortable(&["title", "slug", "scope", "created_at", "updated_at"])
}

// -----------------------------------------------------------------------------
// Roles
// -----------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/roles",
    tag = "Roles",
    params(ListParams),
    responses((status = 200, description = "Paginated roles", body = PageDoc)),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(State(state): State<AppState>, Query(params): Query<ListParams>) -> AppResult<Json<Page<Role>>> {
    Ok(Json(catalog_spec("roles").fetch_page::<Role>(&state.pool, &params).await?))
}

#[utoipa::path(
    post,
    path = "/api/roles",
    tag = "Roles",
    request_body = AclEntryCreateRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 409, description = "Duplicate title in scope"),
        (status = 422, description = "Title missing")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<AclEntryCreateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    let title = payload.title.unwrap_or_default();
    let role = state.acl().create_role(&title, payload.scope.as_deref()).await?;

    tracing::info!(role = %role.slug, "role created");
    log_activity(&state.event_bus, "created", Some(auth.uuid), &role);
    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    get,
    path = "/api/roles/{id}",
    tag = "Roles",
    params(("id" = i64, Path, description = "Role id")),
    responses((status = 200, description = "Role", body = Role), (status = 404, description = "Role not found")),
    security(("bearerAuth" = []))
)]
pub async fn get_role(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<Role>> {
    Ok(Json(state.acl().role(id).await?))
}

#[utoipa::path(
    put,
    path = "/api/roles/{id}",
    tag = "Roles",
    params(("id" = i64, Path, description = "Role id")),
    request_body = AclEntryUpdateRequest,
    responses((status = 200, description = "Role updated", body = Role), (status = 404, description = "Role not found")),
    security(("bearerAuth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<AclEntryUpdateRequest>,
) -> AppResult<Json<Role>> {
    let role = state
        .acl()
        .update_role(id, payload.title.as_deref(), payload.scope.as_deref())
        .await?;
    log_activity(&state.event_bus, "updated", Some(auth.uuid), &role);
    Ok(Json(role))
}

#[utoipa::path(
    delete,
    path = "/api/roles/{id}",
    tag = "Roles",
    params(("id" = i64, Path, description = "Role id")),
    responses((status = 200, description = "Role deleted", body = MessageResponse)),
    security(("bearerAuth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    let role = state.acl().delete_role(id).await?;
    tracing::info!(role = %role.slug, "role deleted");
    log_activity(&state.event_bus, "deleted", Some(auth.uuid), &role);
    Ok(Json(MessageResponse::new("Role deleted successfully")))
}

#[utoipa::path(
    get,
    path = "/api/roles/{id}/permissions",
    tag = "Roles",
    params(("id" = i64, Path, description = "Role id")),
    responses((status = 200, description = "Permissions granted to the role", body = [Permission])),
    security(("bearerAuth" = []))
)]
pub async fn role_permissions(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<Vec<Permission>>> {
    let acl = state.acl();
    let role = acl.role(id).await?;
    Ok(Json(acl.role_permissions(role.id).await?))
}

#[utoipa::path(
    post,
    path = "/api/roles/assign-permission",
    tag = "Roles",
    request_body = RolePermissionRequest,
    responses(
        (status = 200, description = "Permission granted to role", body = MessageResponse),
        (status = 404, description = "Role or permission not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_permission_to_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<RolePermissionRequest>,
) -> AppResult<Json<MessageResponse>> {
    let acl = state.acl();
    let role = acl.role(payload.role_id).await?;
    let permission = acl.permission(payload.permission_id).await?;

    if acl.allow(Subject::Role(role.id), &permission.slug).await? {
        log_activity(
            &state.event_bus,
            "assigned",
            Some(auth.uuid),
            &GrantChange::new(format!("role:{}", role.slug), permission.slug),
        );
    }
    Ok(Json(MessageResponse::new("Permission assigned to role")))
}

#[utoipa::path(
    post,
    path = "/api/roles/remove-permission",
    tag = "Roles",
    request_body = RolePermissionRequest,
    responses(
        (status = 200, description = "Permission revoked from role", body = MessageResponse),
        (status = 404, description = "Role or permission not found"),
        (status = 409, description = "Permission is not assigned to role")
    ),
    security(("bearerAuth" = []))
)]
pub async fn remove_permission_from_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<RolePermissionRequest>,
) -> AppResult<Json<MessageResponse>> {
    let acl = state.acl();
    let role = acl.role(payload.role_id).await?;
    let permission = acl.permission(payload.permission_id).await?;

    if !acl.revoke_permission(Subject::Role(role.id), &permission.slug).await? {
        return Err(AppError::conflict("Permission is not assigned to role"));
    }

    log_activity(
        &state.event_bus,
        "revoked",
        Some(auth.uuid),
        &GrantChange::new(format!("role:{}", role.slug), permission.slug),
    );
    Ok(Json(MessageResponse::new("Permission removed from role")))
}

// -----------------------------------------------------------------------------
// Permissions
// -----------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/permissions",
    tag = "Permissions",
    params(ListParams),
    responses((status = 200, description = "Paginated permissions", body = PageDoc)),
    security(("bearerAuth" = []))
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<Permission>>> {
    Ok(Json(
        catalog_spec("permissions")
            .fetch_page::<Permission>(&state.pool, &params)
            .await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/permissions",
    tag = "Permissions",
    request_body = AclEntryCreateRequest,
    responses(
        (status = 201, description = "Permission created", body = Permission),
        (status = 409, description = "Duplicate title in scope"),
        (status = 422, description = "Title missing")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<AclEntryCreateRequest>,
) -> AppResult<(StatusCode, Json<Permission>)> {
    let title = payload.title.unwrap_or_default();
    let permission = state
        .acl()
        .create_permission(&title, payload.scope.as_deref())
        .await?;

    log_activity(&state.event_bus, "created", Some(auth.uuid), &permission);
    Ok((StatusCode::CREATED, Json(permission)))
}

#[utoipa::path(
    get,
    path = "/api/permissions/{id}",
    tag = "Permissions",
    params(("id" = i64, Path, description = "Permission id")),
    responses(
        (status = 200, description = "Permission", body = Permission),
        (status = 404, description = "Permission not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_permission(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<Permission>> {
    Ok(Json(state.acl().permission(id).await?))
}

#[utoipa::path(
    put,
    path = "/api/permissions/{id}",
    tag = "Permissions",
    params(("id" = i64, Path, description = "Permission id")),
    request_body = AclEntryUpdateRequest,
    responses((status = 200, description = "Permission updated", body = Permission)),
    security(("bearerAuth" = []))
)]
pub async fn update_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<AclEntryUpdateRequest>,
) -> AppResult<Json<Permission>> {
    let permission = state
        .acl()
        .update_permission(id, payload.title.as_deref(), payload.scope.as_deref())
        .await?;
    log_activity(&state.event_bus, "updated", Some(auth.uuid), &permission);
    Ok(Json(permission))
}

#[utoipa::path(
    delete,
    path = "/api/permissions/{id}",
    tag = "Permissions",
    params(("id" = i64, Path, description = "Permission id")),
    responses((status = 200, description = "Permission deleted", body = MessageResponse)),
    security(("bearerAuth" = []))
)]
pub async fn delete_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    let permission = state.acl().delete_permission(id).await?;
    log_activity(&state.event_bus, "deleted", Some(auth.uuid), &permission);
    Ok(Json(MessageResponse::new("Permission deleted successfully")))
}

// -----------------------------------------------------------------------------
// User grants
// -----------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/users/assign-role",
    tag = "Users",
    request_body = UserRoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = MessageResponse),
        (status = 404, description = "User or role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UserRoleRequest>,
) -> AppResult<Json<MessageResponse>> {
    let acl = state.acl();
    let target = user::find_by_uuid(&state.pool, &payload.user_id).await?;
    let role = acl.role(payload.role_id).await?;

    if acl.assign_role(target.id, &role.slug).await? {
        tracing::info!(user_id = %target.uuid, role = %role.slug, "role assigned");
        log_activity(
            &state.event_bus,
            "assigned",
            Some(auth.uuid),
            &GrantChange::new(format!("user:{}", target.uuid), role.slug),
        );
    }
    Ok(Json(MessageResponse::new("Role assigned successfully")))
}

#[utoipa::path(
    post,
    path = "/api/users/remove-role",
    tag = "Users",
    request_body = UserRoleRequest,
    responses(
        (status = 200, description = "Role removed", body = MessageResponse),
        (status = 404, description = "User or role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn remove_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UserRoleRequest>,
) -> AppResult<Json<MessageResponse>> {
    let acl = state.acl();
    let target = user::find_by_uuid(&state.pool, &payload.user_id).await?;
    let role = acl.role(payload.role_id).await?;

    if acl.revoke_role(target.id, &role.slug).await? {
        log_activity(
            &state.event_bus,
            "revoked",
            Some(auth.uuid),
            &GrantChange::new(format!("user:{}", target.uuid), role.slug),
        );
    }
    Ok(Json(MessageResponse::new("Role removed successfully")))
}

#[utoipa::path(
    post,
    path = "/api/users/assign-permission",
    tag = "Users",
    request_body = UserPermissionRequest,
    responses(
        (status = 200, description = "Permission granted", body = MessageResponse),
        (status = 404, description = "User or permission not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UserPermissionRequest>,
) -> AppResult<Json<MessageResponse>> {
    let acl = state.acl();
    let target = user::find_by_uuid(&state.pool, &payload.user_id).await?;
    let permission = acl.permission(payload.permission_id).await?;

    if acl.allow(Subject::User(target.id), &permission.slug).await? {
        log_activity(
            &state.event_bus,
            "assigned",
            Some(auth.uuid),
            &GrantChange::new(format!("user:{}", target.uuid), permission.slug),
        );
    }
    Ok(Json(MessageResponse::new("Permission assigned successfully")))
}

#[utoipa::path(
    post,
    path = "/api/users/remove-permission",
    tag = "Users",
    request_body = UserPermissionRequest,
    responses(
        (status = 200, description = "Permission removed", body = MessageResponse),
        (status = 404, description = "User or permission not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn remove_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UserPermissionRequest>,
) -> AppResult<Json<MessageResponse>> {
    let acl = state.acl();
    let target = user::find_by_uuid(&state.pool, &payload.user_id).await?;
    let permission = acl.permission(payload.permission_id).await?;

    if acl.revoke_permission(Subject::User(target.id), &permission.slug).await? {
        log_activity(
            &state.event_bus,
            "revoked",
            Some(auth.uuid),
            &GrantChange::new(format!("user:{}", target.uuid), permission.slug),
        );
    }
    Ok(Json(MessageResponse::new("Permission removed successfully")))
}

#[utoipa::path(
    get,
    path = "/api/users/{uuid}/roles",
    tag = "Users",
    params(("uuid" = String, Path, description = "User uuid")),
    responses((status = 200, description = "Roles held by the user", body = [Role])),
    security(("bearerAuth" = []))
)]
pub async fn user_roles(State(state): State<AppState>, Path(uuid): Path<String>) -> AppResult<Json<Vec<Role>>> {
    let target = user::find_by_uuid(&state.pool, &uuid).await?;
    Ok(Json(state.acl().roles_of(target.id).await?))
}

#[utoipa::path(
    get,
    path = "/api/users/{uuid}/permissions",
    tag = "Users",
    params(("uuid" = String, Path, description = "User uuid")),
    responses((status = 200, description = "Direct and role-derived permissions", body = [Permission])),
    security(("bearerAuth" = []))
)]
pub async fn user_permissions(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> AppResult<Json<Vec<Permission>>> {
    let target = user::find_by_uuid(&state.pool, &uuid).await?;
    Ok(Json(state.acl().effective_permissions(target.id).await?))
}

#[utoipa::path(
    get,
    path = "/api/users/{uuid}/check-permission",
    tag = "Users",
    params(("uuid" = String, Path, description = "User uuid"), PermissionCheckQuery),
    responses((status = 200, description = "Whether the user holds the permission", body = PermissionCheckResponse)),
    security(("bearerAuth" = []))
)]
pub async fn check_permission(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Query(query): Query<PermissionCheckQuery>,
) -> AppResult<Json<PermissionCheckResponse>> {
    let target = user::find_by_uuid(&state.pool, &uuid).await?;
    let has_permission = state.acl().has_permission(target.id, query.permission.trim()).await?;
    Ok(Json(PermissionCheckResponse { has_permission }))
}

#[utoipa::path(
    get,
    path = "/api/users/{uuid}/check-role",
    tag = "Users",
    params(("uuid" = String, Path, description = "User uuid"), RoleCheckQuery),
    responses((status = 200, description = "Whether the user holds the role", body = RoleCheckResponse)),
    security(("bearerAuth" = []))
)]
pub async fn check_role(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Query(query): Query<RoleCheckQuery>,
) -> AppResult<Json<RoleCheckResponse>> {
    let target = user::find_by_uuid(&state.pool, &uuid).await?;
    let has_role = state.acl().has_role(target.id, query.role.trim()).await?;
    Ok(Json(RoleCheckResponse { has_role }))
}
