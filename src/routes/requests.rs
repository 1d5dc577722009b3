use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use sqlx::SqlitePool;

use crate::app::AppState;
use crate::authz::AccessRule;
use crate::csv;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, log_activity_with_context, RequestContext};
use crate::extract::ValidatedJson;
use crate::ident::{self, SequenceKind};
use crate::jwt::AuthUser;
use crate::models::request::{
    ApplicantType, InfoRequest, InfoRequestPayload, InfoRequestUpdate, RequestStatus, StatusUpdate,
};
use crate::models::{MessageResponse, PageDoc};
use crate::query::{count_by, ListParams, ListSpec, Page};

const TABLE: &str = "requests";
const ENTITY: &str = "Request";

pub fn routes(state: &AppState) -> Router<AppState> {
    let admin = state.guard(
        AccessRule::admin(),
        Router::new()
            .route("/", get(list_requests))
            .route("/export/csv", get(export_requests))
            .route("/:uuid", get(get_request).put(update_request).delete(delete_request))
            .route("/:uuid/status", patch(update_request_status)),
    );

    Router::new().route("/", post(create_request)).merge(admin)
}

fn list_spec() -> ListSpec {
    ListSpec::new(TABLE)
        .search(&["name_of_applicant", "email", "address"])
        .sequence(SequenceKind::Request)
        .filter("status", "status", RequestStatus::filter_value)
        .filter("type", "type_of_applicant", ApplicantType::filter_value)
        .sortable(&[
            "name_of_applicant",
            "email",
            "date_of_submission",
            "status",
            "created_at",
            "updated_at",
        ])
}

async fn fetch_request(pool: &SqlitePool, uuid: &str) -> AppResult<InfoRequest> {
    super::find_by_uuid(pool, TABLE, ENTITY, uuid).await
}

async fn save_request(pool: &SqlitePool, row: &InfoRequest) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE requests SET
            name_of_applicant = ?, date_of_birth = ?, address = ?, telephone_number = ?, email = ?,
            type_of_applicant = ?, description_of_information = ?, manner_of_access = ?, is_life_liberty = ?,
            life_liberty_details = ?, form_of_access = ?, date_of_submission = ?, witness_signature = ?,
            witness_statement = ?, institution_stamp = ?, receipt_officer_name = ?, date_of_receipt = ?,
            status = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&row.name_of_applicant)
    .bind(row.date_of_birth)
    .bind(&row.address)
    .bind(&row.telephone_number)
    .bind(&row.email)
    .bind(row.type_of_applicant)
    .bind(&row.description_of_information)
    .bind(row.manner_of_access)
    .bind(row.is_life_liberty)
    .bind(&row.life_liberty_details)
    .bind(row.form_of_access)
    .bind(row.date_of_submission)
    .bind(&row.witness_signature)
    .bind(&row.witness_statement)
    .bind(&row.institution_stamp)
    .bind(&row.receipt_officer_name)
    .bind(row.date_of_receipt)
    .bind(row.status)
    .bind(row.updated_at)
    .bind(row.id)
    .execute(pool)
    .await?;
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/requests",
    tag = "Requests",
    request_body = InfoRequestPayload,
    responses(
        (status = 201, description = "Request submitted", body = InfoRequest),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_request(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<InfoRequestPayload>,
) -> AppResult<(StatusCode, Json<InfoRequest>)> {
    let (id, ids) = ident::create(&state.pool, &payload).await?;
    let request: InfoRequest = super::find_by_id(&state.pool, TABLE, ENTITY, id).await?;

    tracing::info!(sample_id = %ids.sample_id, "information request submitted");
    log_activity(&state.event_bus, "created", None, &request);
    Ok((StatusCode::CREATED, Json(request)))
}

#[utoipa::path(
    get,
    path = "/api/requests",
    tag = "Requests",
    params(ListParams),
    responses((status = 200, description = "Paginated requests with status counts", body = PageDoc)),
    security(("bearerAuth" = []))
)]
pub async fn list_requests(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<InfoRequest>>> {
    let page = list_spec().fetch_page::<InfoRequest>(&state.pool, &params).await?;
    let stats = count_by(
        &state.pool,
        TABLE,
        "status",
        &[("pending", "pending"), ("inreview", "inreview"), ("completed", "completed")],
    )
    .await?;
    Ok(Json(page.with_stats(stats)))
}

#[utoipa::path(
    get,
    path = "/api/requests/export/csv",
    tag = "Requests",
    params(ListParams),
    responses((status = 200, description = "CSV export", content_type = "text/csv")),
    security(("bearerAuth" = []))
)]
pub async fn export_requests(State(state): State<AppState>, Query(params): Query<ListParams>) -> AppResult<Response> {
    let rows = list_spec().fetch_all::<InfoRequest>(&state.pool, &params).await?;
    Ok(csv::attachment(TABLE, &rows))
}

#[utoipa::path(
    get,
    path = "/api/requests/{uuid}",
    tag = "Requests",
    params(("uuid" = String, Path, description = "Request uuid")),
    responses(
        (status = 200, description = "Request detail", body = InfoRequest),
        (status = 404, description = "Request not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_request(State(state): State<AppState>, Path(uuid): Path<String>) -> AppResult<Json<InfoRequest>> {
    Ok(Json(fetch_request(&state.pool, &uuid).await?))
}

#[utoipa::path(
    put,
    path = "/api/requests/{uuid}",
    tag = "Requests",
    params(("uuid" = String, Path, description = "Request uuid")),
    request_body = InfoRequestUpdate,
    responses(
        (status = 200, description = "Request updated", body = InfoRequest),
        (status = 404, description = "Request not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_request(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(uuid): Path<String>,
    ValidatedJson(payload): ValidatedJson<InfoRequestUpdate>,
) -> AppResult<Json<InfoRequest>> {
    let mut request = fetch_request(&state.pool, &uuid).await?;
    let old = request.clone();

    payload.apply(&mut request);
    request.updated_at = crate::utils::utc_now();
    save_request(&state.pool, &request).await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.uuid),
        &request,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );
    Ok(Json(request))
}

#[utoipa::path(
    patch,
    path = "/api/requests/{uuid}/status",
    tag = "Requests",
    params(("uuid" = String, Path, description = "Request uuid")),
    request_body = StatusUpdate,
    responses(
        (status = 200, description = "Status changed", body = InfoRequest),
        (status = 404, description = "Request not found"),
        (status = 422, description = "Unknown status")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_request_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(uuid): Path<String>,
    Json(payload): Json<StatusUpdate>,
) -> AppResult<Json<InfoRequest>> {
    let status = RequestStatus::from_filter(&payload.status).ok_or_else(|| {
        AppError::invalid_field("status", "Status must be one of: pending, inreview, completed")
    })?;

    let mut request = fetch_request(&state.pool, &uuid).await?;
    let old = request.clone();
    request.status = status;
    request.updated_at = crate::utils::utc_now();

    sqlx::query("UPDATE requests SET status = ?, updated_at = ? WHERE id = ?")
        .bind(request.status)
        .bind(request.updated_at)
        .bind(request.id)
        .execute(&state.pool)
        .await?;

    tracing::info!(sample_id = %request.sample_id, status = %status, "request status changed");
    log_activity_with_context(&state.event_bus, "status_changed", Some(auth.uuid), &request, Some(&old), None);
    Ok(Json(request))
}

#[utoipa::path(
    delete,
    path = "/api/requests/{uuid}",
    tag = "Requests",
    params(("uuid" = String, Path, description = "Request uuid")),
    responses(
        (status = 200, description = "Request deleted", body = MessageResponse),
        (status = 404, description = "Request not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(uuid): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let request = fetch_request(&state.pool, &uuid).await?;
    super::delete_by_id(&state.pool, TABLE, request.id).await?;

    log_activity(&state.event_bus, "deleted", Some(auth.uuid), &request);
    Ok(Json(MessageResponse::new("Request deleted successfully")))
}
