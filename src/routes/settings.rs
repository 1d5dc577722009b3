use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{roles, AccessRule, Action, ResourceKind};
use crate::errors::{is_unique_violation, AppError, AppResult};
use crate::events::log_activity;
use crate::extract::ValidatedJson;
use crate::jwt::AuthUser;
use crate::models::setting::{decode_value, encode_value, Setting, SettingPayload, SettingUpdate, SettingView};
use crate::models::{MessageResponse, PageDoc};
use crate::query::{ListParams, ListSpec, Page};
use crate::utils::utc_now;

const TABLE: &str = "settings";
const ENTITY: &str = "Setting";

fn settings_rule(action: Action) -> AccessRule {
    AccessRule::roles([roles::SUPER_ADMIN, roles::ADMIN]).with_capability(action, ResourceKind::Settings)
}

pub fn routes(state: &AppState) -> Router<AppState> {
    let read = state.guard(
        settings_rule(Action::View),
        Router::new()
            .route("/", get(list_settings))
            .route("/key/:key", get(get_setting_by_key))
            .route("/:uuid", get(get_setting)),
    );
    let write = state.guard(
        settings_rule(Action::Edit),
        Router::new()
            .route("/", axum::routing::post(upsert_setting))
            .route("/:uuid", axum::routing::put(update_setting).delete(delete_setting)),
    );

    Router::new()
        .route("/json", get(settings_json))
        .merge(read)
        .merge(write)
}

async fn fetch_setting(pool: &SqlitePool, uuid: &str) -> AppResult<Setting> {
    super::find_by_uuid(pool, TABLE, ENTITY, uuid).await
}

async fn find_by_key(pool: &SqlitePool, key: &str) -> AppResult<Option<Setting>> {
    Ok(sqlx::query_as::<_, Setting>("SELECT * FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?)
}

#[utoipa::path(
    get,
    path = "/api/settings/json",
    tag = "Settings",
    responses((status = 200, description = "Every setting as a key to value map"))
)]
pub async fn settings_json(State(state): State<AppState>) -> AppResult<Json<BTreeMap<String, Value>>> {
    let rows = sqlx::query_as::<_, Setting>("SELECT * FROM settings ORDER BY key")
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(
        rows.into_iter()
            .map(|s| {
                let value = decode_value(s.value.as_deref());
                (s.key, value)
            })
            .collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/api/settings",
    tag = "Settings",
    params(ListParams),
    responses((status = 200, description = "Paginated settings", body = PageDoc)),
    security(("bearerAuth" = []))
)]
pub async fn list_settings(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<SettingView>>> {
    let page = ListSpec::new(TABLE)
        .search(&["key", "value"])
        .sortable(&["key", "created_at", "updated_at"])
        .fetch_page::<Setting>(&state.pool, &params)
        .await?;
    Ok(Json(page.map(SettingView::from)))
}

#[utoipa::path(
    get,
    path = "/api/settings/{uuid}",
    tag = "Settings",
    params(("uuid" = String, Path, description = "Setting uuid")),
    responses((status = 200, description = "Setting", body = SettingView), (status = 404, description = "Setting not found")),
    security(("bearerAuth" = []))
)]
pub async fn get_setting(State(state): State<AppState>, Path(uuid): Path<String>) -> AppResult<Json<SettingView>> {
    Ok(Json(fetch_setting(&state.pool, &uuid).await?.into()))
}

#[utoipa::path(
    get,
    path = "/api/settings/key/{key}",
    tag = "Settings",
    params(("key" = String, Path, description = "Setting key")),
    responses((status = 200, description = "Setting", body = SettingView), (status = 404, description = "Setting not found")),
    security(("bearerAuth" = []))
)]
pub async fn get_setting_by_key(State(state): State<AppState>, Path(key): Path<String>) -> AppResult<Json<SettingView>> {
    find_by_key(&state.pool, key.trim())
        .await?
        .map(|s| Json(s.into()))
        .ok_or_else(|| AppError::entity_not_found(ENTITY))
}

#[utoipa::path(
    post,
    path = "/api/settings",
    tag = "Settings",
    request_body = SettingPayload,
    responses(
        (status = 201, description = "Setting created", body = SettingView),
        (status = 200, description = "Existing key updated", body = SettingView)
    ),
    security(("bearerAuth" = []))
)]
pub async fn upsert_setting(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(payload): ValidatedJson<SettingPayload>,
) -> AppResult<(StatusCode, Json<SettingView>)> {
    let key = payload.key.trim();
    let existed = find_by_key(&state.pool, key).await?.is_some();
    let now = utc_now();

    sqlx::query(
        r#"
        INSERT INTO settings (uuid, key, value, created_at, updated_at) VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(key)
    .bind(encode_value(&payload.value))
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let setting = find_by_key(&state.pool, key)
        .await?
        .ok_or_else(|| AppError::internal("setting vanished after upsert"))?;

    log_activity(
        &state.event_bus,
        if existed { "updated" } else { "created" },
        Some(auth.uuid),
        &setting,
    );
    let status = if existed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(setting.into())))
}

#[utoipa::path(
    put,
    path = "/api/settings/{uuid}",
    tag = "Settings",
    params(("uuid" = String, Path, description = "Setting uuid")),
    request_body = SettingUpdate,
    responses(
        (status = 200, description = "Setting updated", body = SettingView),
        (status = 404, description = "Setting not found"),
        (status = 409, description = "Key already used")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_setting(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(uuid): Path<String>,
    ValidatedJson(payload): ValidatedJson<SettingUpdate>,
) -> AppResult<Json<SettingView>> {
    let mut setting = fetch_setting(&state.pool, &uuid).await?;

    if let Some(key) = payload.key.as_deref() {
        setting.key = key.trim().to_string();
    }
    if let Some(value) = payload.value.as_ref() {
        setting.value = encode_value(value);
    }
    setting.updated_at = utc_now();

    sqlx::query("UPDATE settings SET key = ?, value = ?, updated_at = ? WHERE id = ?")
        .bind(&setting.key)
        .bind(&setting.value)
        .bind(setting.updated_at)
        .bind(setting.id)
        .execute(&state.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err, Some("settings.key")) {
                AppError::conflict(format!("Setting with key \"{}\" already exists", setting.key))
            } else {
                err.into()
            }
        })?;

    log_activity(&state.event_bus, "updated", Some(auth.uuid), &setting);
    Ok(Json(setting.into()))
}

#[utoipa::path(
    delete,
    path = "/api/settings/{uuid}",
    tag = "Settings",
    params(("uuid" = String, Path, description = "Setting uuid")),
    responses((status = 200, description = "Setting deleted", body = MessageResponse), (status = 404, description = "Setting not found")),
    security(("bearerAuth" = []))
)]
pub async fn delete_setting(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(uuid): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let setting = fetch_setting(&state.pool, &uuid).await?;
    super::delete_by_id(&state.pool, TABLE, setting.id).await?;

    log_activity(&state.event_bus, "deleted", Some(auth.uuid), &setting);
    Ok(Json(MessageResponse::new("Setting deleted successfully")))
}
