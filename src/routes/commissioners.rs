use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use sqlx::SqlitePool;

use crate::app::AppState;
use crate::authz::AccessRule;
use crate::csv;
use crate::errors::{is_unique_violation, AppError, AppResult};
use crate::events::{log_activity, log_activity_with_context, RequestContext};
use crate::extract::ValidatedJson;
use crate::ident::{self, SequenceKind};
use crate::jwt::AuthUser;
use crate::models::commissioner::{
    Commissioner, CommissionerPayload, CommissionerStatus, CommissionerUpdate, CommissionerView,
};
use crate::models::{media, MessageResponse, PageDoc};
use crate::query::{count_by, FilterValue, ListParams, ListSpec, Page};
use crate::utils::{normalize_email, utc_now};

const TABLE: &str = "commissioners";
const ENTITY: &str = "Commissioner";
const EMAIL_TAKEN: &str = "A commissioner with this email already exists";

pub fn routes(state: &AppState) -> Router<AppState> {
    let admin = state.guard(
        AccessRule::admin(),
        Router::new()
            .route("/", axum::routing::post(create_commissioner))
            .route("/admin", get(list_all_commissioners))
            .route("/export/csv", get(export_commissioners))
            .route("/:uuid", axum::routing::put(update_commissioner).delete(delete_commissioner)),
    );

    Router::new()
        .route("/", get(list_commissioners))
        .route("/:uuid", get(get_commissioner))
        .merge(admin)
}

fn list_spec() -> ListSpec {
    ListSpec::new(TABLE)
        .search(&["full_name", "title", "email"])
        .sequence(SequenceKind::Commissioner)
        .filter("status", "status", CommissionerStatus::filter_value)
        .sortable(&["full_name", "title", "appointed_date", "term_end_date", "created_at", "updated_at"])
}

async fn fetch_commissioner(pool: &SqlitePool, uuid: &str) -> AppResult<Commissioner> {
    super::find_by_uuid(pool, TABLE, ENTITY, uuid).await
}

async fn ensure_email_free(pool: &SqlitePool, email: &str, except_id: Option<i64>) -> AppResult<()> {
    let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM commissioners WHERE email = ? AND id != ?")
        .bind(email)
        .bind(except_id.unwrap_or(0))
        .fetch_optional(pool)
        .await?;
    match taken {
        Some(_) => Err(AppError::conflict(EMAIL_TAKEN)),
        None => Ok(()),
    }
}

fn email_conflict(err: AppError) -> AppError {
    match err {
        AppError::Database(ref db) if is_unique_violation(db, Some("commissioners.email")) => {
            AppError::conflict(EMAIL_TAKEN)
        }
        other => other,
    }
}

#[utoipa::path(
    get,
    path = "/api/commissioners",
    tag = "Commissioners",
    params(ListParams),
    responses((status = 200, description = "Active commissioners", body = PageDoc))
)]
pub async fn list_commissioners(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<CommissionerView>>> {
    let spec = list_spec().scope_eq("status", FilterValue::Text(CommissionerStatus::Active.as_str().to_string()));
    let page = spec.fetch_page::<Commissioner>(&state.pool, &params).await?;
    Ok(Json(page.map(|c| CommissionerView::new(c, &state.config))))
}

#[utoipa::path(
    get,
    path = "/api/commissioners/admin",
    tag = "Commissioners",
    params(ListParams),
    responses((status = 200, description = "All commissioners with status counts", body = PageDoc)),
    security(("bearerAuth" = []))
)]
pub async fn list_all_commissioners(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<CommissionerView>>> {
    let page = list_spec().fetch_page::<Commissioner>(&state.pool, &params).await?;
    let stats = count_by(&state.pool, TABLE, "status", &[("active", "active"), ("inactive", "inactive")]).await?;
    Ok(Json(
        page.with_stats(stats)
            .map(|c| CommissionerView::new(c, &state.config)),
    ))
}

#[utoipa::path(
    get,
    path = "/api/commissioners/export/csv",
    tag = "Commissioners",
    params(ListParams),
    responses((status = 200, description = "CSV export", content_type = "text/csv")),
    security(("bearerAuth" = []))
)]
pub async fn export_commissioners(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Response> {
    let rows = list_spec().fetch_all::<Commissioner>(&state.pool, &params).await?;
    Ok(csv::attachment(TABLE, &rows))
}

#[utoipa::path(
    get,
    path = "/api/commissioners/{uuid}",
    tag = "Commissioners",
    params(("uuid" = String, Path, description = "Commissioner uuid")),
    responses(
        (status = 200, description = "Commissioner profile", body = CommissionerView),
        (status = 404, description = "Commissioner not found")
    )
)]
pub async fn get_commissioner(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> AppResult<Json<CommissionerView>> {
    let commissioner = fetch_commissioner(&state.pool, &uuid).await?;
    Ok(Json(CommissionerView::new(commissioner, &state.config)))
}

#[utoipa::path(
    post,
    path = "/api/commissioners",
    tag = "Commissioners",
    request_body = CommissionerPayload,
    responses(
        (status = 201, description = "Commissioner created", body = CommissionerView),
        (status = 404, description = "Media not found"),
        (status = 409, description = "Email already used by another commissioner")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_commissioner(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(mut payload): ValidatedJson<CommissionerPayload>,
) -> AppResult<(StatusCode, Json<CommissionerView>)> {
    ensure_email_free(&state.pool, &normalize_email(&payload.email), None).await?;
    payload.photo_path = media::resolve_path(&state.pool, payload.profile_photo.as_deref()).await?;

    let (id, ids) = ident::create(&state.pool, &payload).await.map_err(email_conflict)?;
    let commissioner: Commissioner = super::find_by_id(&state.pool, TABLE, ENTITY, id).await?;

    tracing::info!(sample_id = %ids.sample_id, "commissioner created");
    log_activity(&state.event_bus, "created", Some(auth.uuid), &commissioner);
    Ok((StatusCode::CREATED, Json(CommissionerView::new(commissioner, &state.config))))
}

#[utoipa::path(
    put,
    path = "/api/commissioners/{uuid}",
    tag = "Commissioners",
    params(("uuid" = String, Path, description = "Commissioner uuid")),
    request_body = CommissionerUpdate,
    responses(
        (status = 200, description = "Commissioner updated", body = CommissionerView),
        (status = 404, description = "Commissioner not found"),
        (status = 409, description = "Email already used by another commissioner")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_commissioner(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(uuid): Path<String>,
    ValidatedJson(mut payload): ValidatedJson<CommissionerUpdate>,
) -> AppResult<Json<CommissionerView>> {
    let mut commissioner = fetch_commissioner(&state.pool, &uuid).await?;
    let old = commissioner.clone();

    if let Some(email) = payload.email.as_deref() {
        ensure_email_free(&state.pool, &normalize_email(email), Some(commissioner.id)).await?;
    }
    payload.photo_path = media::resolve_path(&state.pool, payload.profile_photo.as_deref()).await?;

    payload.apply(&mut commissioner);
    commissioner.updated_at = utc_now();

    sqlx::query(
        r#"
        UPDATE commissioners SET
            full_name = ?, title = ?, email = ?, phone = ?, biography = ?, qualifications = ?, experience = ?,
            profile_photo = ?, appointed_date = ?, term_end_date = ?, status = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&commissioner.full_name)
    .bind(&commissioner.title)
    .bind(&commissioner.email)
    .bind(&commissioner.phone)
    .bind(&commissioner.biography)
    .bind(&commissioner.qualifications)
    .bind(&commissioner.experience)
    .bind(&commissioner.profile_photo)
    .bind(commissioner.appointed_date)
    .bind(commissioner.term_end_date)
    .bind(commissioner.status)
    .bind(commissioner.updated_at)
    .bind(commissioner.id)
    .execute(&state.pool)
    .await
    .map_err(|err| email_conflict(err.into()))?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.uuid),
        &commissioner,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );
    Ok(Json(CommissionerView::new(commissioner, &state.config)))
}

#[utoipa::path(
    delete,
    path = "/api/commissioners/{uuid}",
    tag = "Commissioners",
    params(("uuid" = String, Path, description = "Commissioner uuid")),
    responses(
        (status = 200, description = "Commissioner deleted", body = MessageResponse),
        (status = 404, description = "Commissioner not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_commissioner(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(uuid): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let commissioner = fetch_commissioner(&state.pool, &uuid).await?;
    super::delete_by_id(&state.pool, TABLE, commissioner.id).await?;

    log_activity(&state.event_bus, "deleted", Some(auth.uuid), &commissioner);
    Ok(Json(MessageResponse::new("Commissioner deleted successfully")))
}
