use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use sqlx::SqlitePool;

use crate::app::AppState;
use crate::authz::{AccessRule, Action, ResourceKind};
use crate::csv;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, log_activity_with_context, RequestContext};
use crate::extract::ValidatedJson;
use crate::ident::{self, SequenceKind};
use crate::jwt::AuthUser;
use crate::models::request::StatusUpdate;
use crate::models::resource::{
    DownloadResponse, Resource, ResourceCategory, ResourcePayload, ResourceType, ResourceUpdate, ResourceView,
};
use crate::models::{media, MessageResponse, PageDoc, PublishStatus};
use crate::query::{count_by, FilterValue, ListParams, ListSpec, Page};
use crate::utils::utc_now;

const TABLE: &str = "resources";
const ENTITY: &str = "Resource";

pub fn routes(state: &AppState) -> Router<AppState> {
    let admin_with = |action| AccessRule::admin().with_capability(action, ResourceKind::Resource);

    let read = state.guard(
        AccessRule::admin(),
        Router::new()
            .route("/", get(list_resources))
            .route("/export/csv", get(export_resources))
            .route("/:uuid", get(get_resource)),
    );
    let create = state.guard(admin_with(Action::Create), Router::new().route("/", post(create_resource)));
    let edit = state.guard(
        admin_with(Action::Edit),
        Router::new()
            .route("/:uuid", put(update_resource))
            .route("/:uuid/status", patch(update_resource_status)),
    );
    let delete = state.guard(
        admin_with(Action::Delete),
        Router::new().route("/:uuid", axum::routing::delete(delete_resource)),
    );

    Router::new()
        .route("/public", get(list_published_resources))
        .route("/:uuid/download", get(download_resource))
        .merge(read)
        .merge(create)
        .merge(edit)
        .merge(delete)
}

fn list_spec() -> ListSpec {
    ListSpec::new(TABLE)
        .search(&["title", "description"])
        .sequence(SequenceKind::Resource)
        .filter("status", "status", PublishStatus::filter_value)
        .filter("category", "category", ResourceCategory::filter_value)
        .filter("type", "type", ResourceType::filter_value)
        .sortable(&["title", "category", "status", "type", "download", "size", "created_at", "updated_at"])
}

async fn fetch_resource(pool: &SqlitePool, uuid: &str) -> AppResult<Resource> {
    super::find_by_uuid(pool, TABLE, ENTITY, uuid).await
}

#[utoipa::path(
    get,
    path = "/api/resources/public",
    tag = "Resources",
    params(ListParams),
    responses((status = 200, description = "Published resources", body = PageDoc))
)]
pub async fn list_published_resources(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<ResourceView>>> {
    let page = list_spec()
        .scope_eq("status", FilterValue::Text(PublishStatus::Published.as_str().to_string()))
        .fetch_page::<Resource>(&state.pool, &params)
        .await?;
    Ok(Json(page.map(|r| ResourceView::new(r, &state.config))))
}

#[utoipa::path(
    get,
    path = "/api/resources/{uuid}/download",
    tag = "Resources",
    params(("uuid" = String, Path, description = "Resource uuid")),
    responses(
        (status = 200, description = "File URL; the download counter is incremented", body = DownloadResponse),
        (status = 404, description = "Resource not found")
    )
)]
pub async fn download_resource(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> AppResult<Json<DownloadResponse>> {
    let resource = fetch_resource(&state.pool, &uuid).await?;
    if resource.status != PublishStatus::Published {
        return Err(AppError::entity_not_found(ENTITY));
    }

    sqlx::query("UPDATE resources SET download = download + 1 WHERE id = ?")
        .bind(resource.id)
        .execute(&state.pool)
        .await?;

    Ok(Json(DownloadResponse {
        url: state.config.media_url(&resource.file),
        download: resource.download + 1,
    }))
}

#[utoipa::path(
    get,
    path = "/api/resources",
    tag = "Resources",
    params(ListParams),
    responses((status = 200, description = "All resources with status and download counts", body = PageDoc)),
    security(("bearerAuth" = []))
)]
pub async fn list_resources(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<ResourceView>>> {
    let page = list_spec().fetch_page::<Resource>(&state.pool, &params).await?;

    let mut stats = count_by(&state.pool, TABLE, "status", &[("draft", "draft"), ("published", "published")]).await?;
    let downloads: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(download), 0) FROM resources")
        .fetch_one(&state.pool)
        .await?;
    stats.insert("total_downloads".to_string(), downloads);

    Ok(Json(page.with_stats(stats).map(|r| ResourceView::new(r, &state.config))))
}

#[utoipa::path(
    get,
    path = "/api/resources/export/csv",
    tag = "Resources",
    params(ListParams),
    responses((status = 200, description = "CSV export", content_type = "text/csv")),
    security(("bearerAuth" = []))
)]
pub async fn export_resources(State(state): State<AppState>, Query(params): Query<ListParams>) -> AppResult<Response> {
    let rows = list_spec().fetch_all::<Resource>(&state.pool, &params).await?;
    Ok(csv::attachment(TABLE, &rows))
}

#[utoipa::path(
    get,
    path = "/api/resources/{uuid}",
    tag = "Resources",
    params(("uuid" = String, Path, description = "Resource uuid")),
    responses((status = 200, description = "Resource", body = ResourceView), (status = 404, description = "Resource not found")),
    security(("bearerAuth" = []))
)]
pub async fn get_resource(State(state): State<AppState>, Path(uuid): Path<String>) -> AppResult<Json<ResourceView>> {
    Ok(Json(ResourceView::new(fetch_resource(&state.pool, &uuid).await?, &state.config)))
}

#[utoipa::path(
    post,
    path = "/api/resources",
    tag = "Resources",
    request_body = ResourcePayload,
    responses(
        (status = 201, description = "Resource created", body = ResourceView),
        (status = 403, description = "Admin flag and create-resource required"),
        (status = 404, description = "Media not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_resource(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(mut payload): ValidatedJson<ResourcePayload>,
) -> AppResult<(StatusCode, Json<ResourceView>)> {
    payload.media = Some(media::find_by_uuid(&state.pool, payload.file.trim()).await?);

    let (id, ids) = ident::create(&state.pool, &payload).await?;
    let resource: Resource = super::find_by_id(&state.pool, TABLE, ENTITY, id).await?;

    tracing::info!(sample_id = %ids.sample_id, "resource created");
    log_activity(&state.event_bus, "created", Some(auth.uuid), &resource);
    Ok((StatusCode::CREATED, Json(ResourceView::new(resource, &state.config))))
}

#[utoipa::path(
    put,
    path = "/api/resources/{uuid}",
    tag = "Resources",
    params(("uuid" = String, Path, description = "Resource uuid")),
    request_body = ResourceUpdate,
    responses(
        (status = 200, description = "Resource updated", body = ResourceView),
        (status = 403, description = "Admin flag and edit-resource required"),
        (status = 404, description = "Resource or media not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_resource(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(uuid): Path<String>,
    ValidatedJson(mut payload): ValidatedJson<ResourceUpdate>,
) -> AppResult<Json<ResourceView>> {
    let mut resource = fetch_resource(&state.pool, &uuid).await?;
    let old = resource.clone();

    if let Some(file) = payload.file.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
        payload.media = Some(media::find_by_uuid(&state.pool, file).await?);
    }
    let replaced = payload.apply(&mut resource);
    resource.updated_at = utc_now();

    sqlx::query(
        r#"
        UPDATE resources SET
            title = ?, description = ?, category = ?, status = ?, type = ?, file = ?, url = ?, mime = ?,
            size = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&resource.title)
    .bind(&resource.description)
    .bind(resource.category)
    .bind(resource.status)
    .bind(resource.kind)
    .bind(&resource.file)
    .bind(&resource.url)
    .bind(&resource.mime)
    .bind(resource.size)
    .bind(resource.updated_at)
    .bind(resource.id)
    .execute(&state.pool)
    .await?;

    if let Some(path) = replaced {
        super::media::release_file(&state, &path).await?;
    }

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.uuid),
        &resource,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );
    Ok(Json(ResourceView::new(resource, &state.config)))
}

#[utoipa::path(
    patch,
    path = "/api/resources/{uuid}/status",
    tag = "Resources",
    params(("uuid" = String, Path, description = "Resource uuid")),
    request_body = StatusUpdate,
    responses(
        (status = 200, description = "Status changed", body = ResourceView),
        (status = 422, description = "Unknown status")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_resource_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(uuid): Path<String>,
    Json(payload): Json<StatusUpdate>,
) -> AppResult<Json<ResourceView>> {
    let status = PublishStatus::from_filter(&payload.status)
        .ok_or_else(|| AppError::invalid_field("status", "Status must be one of: draft, published"))?;

    let mut resource = fetch_resource(&state.pool, &uuid).await?;
    let old = resource.clone();
    resource.status = status;
    resource.updated_at = utc_now();

    sqlx::query("UPDATE resources SET status = ?, updated_at = ? WHERE id = ?")
        .bind(resource.status)
        .bind(resource.updated_at)
        .bind(resource.id)
        .execute(&state.pool)
        .await?;

    log_activity_with_context(&state.event_bus, "status_changed", Some(auth.uuid), &resource, Some(&old), None);
    Ok(Json(ResourceView::new(resource, &state.config)))
}

#[utoipa::path(
    delete,
    path = "/api/resources/{uuid}",
    tag = "Resources",
    params(("uuid" = String, Path, description = "Resource uuid")),
    responses(
        (status = 200, description = "Resource deleted", body = MessageResponse),
        (status = 403, description = "Admin flag and delete-resource required")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_resource(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(uuid): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let resource = fetch_resource(&state.pool, &uuid).await?;
    super::delete_by_id(&state.pool, TABLE, resource.id).await?;
    super::media::release_file(&state, &resource.file).await?;

    log_activity(&state.event_bus, "deleted", Some(auth.uuid), &resource);
    Ok(Json(MessageResponse::new("Resource deleted successfully")))
}
