use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use sqlx::SqlitePool;

use crate::app::AppState;
use crate::authz::AccessRule;
use crate::csv;
use crate::errors::AppResult;
use crate::events::{log_activity, log_activity_with_context, RequestContext};
use crate::extract::ValidatedJson;
use crate::ident::{self, SequenceKind};
use crate::jwt::AuthUser;
use crate::models::complaint::{Complaint, ComplaintPayload, ComplaintPriority, ComplaintStatus, ComplaintType, ComplaintUpdate};
use crate::models::{MessageResponse, PageDoc};
use crate::query::{count_by, ListParams, ListSpec, Page};
use crate::utils::utc_now;

const TABLE: &str = "complaints";
const ENTITY: &str = "Complaint";

pub fn routes(state: &AppState) -> Router<AppState> {
    let admin = state.guard(
        AccessRule::admin(),
        Router::new()
            .route("/", get(list_complaints))
            .route("/export/csv", get(export_complaints))
            .route(
                "/:uuid",
                get(get_complaint).put(update_complaint).delete(delete_complaint),
            ),
    );

    Router::new().route("/", post(create_complaint)).merge(admin)
}

fn list_spec() -> ListSpec {
    ListSpec::new(TABLE)
        .search(&["full_name", "email", "address", "national_id", "passport_number", "type"])
        .sequence(SequenceKind::Complaint)
        .filter("status", "status", ComplaintStatus::filter_value)
        .filter("priority", "priority", ComplaintPriority::filter_value)
        .filter("type", "type", ComplaintType::filter_value)
        .sortable(&[
            "full_name",
            "email",
            "date_of_incident",
            "priority",
            "status",
            "created_at",
            "updated_at",
        ])
}

async fn fetch_complaint(pool: &SqlitePool, uuid: &str) -> AppResult<Complaint> {
    super::find_by_uuid(pool, TABLE, ENTITY, uuid).await
}

#[utoipa::path(
    post,
    path = "/api/complaints",
    tag = "Complaints",
    request_body = ComplaintPayload,
    responses(
        (status = 201, description = "Complaint filed; priority defaults to Low and status to Open", body = Complaint),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_complaint(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ComplaintPayload>,
) -> AppResult<(StatusCode, Json<Complaint>)> {
    let (id, ids) = ident::create(&state.pool, &payload).await?;
    let complaint: Complaint = super::find_by_id(&state.pool, TABLE, ENTITY, id).await?;

    tracing::info!(sample_id = %ids.sample_id, "complaint filed");
    log_activity(&state.event_bus, "created", None, &complaint);
    Ok((StatusCode::CREATED, Json(complaint)))
}

#[utoipa::path(
    get,
    path = "/api/complaints",
    tag = "Complaints",
    params(ListParams),
    responses((status = 200, description = "Paginated complaints with status counts", body = PageDoc)),
    security(("bearerAuth" = []))
)]
pub async fn list_complaints(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<Complaint>>> {
    let page = list_spec().fetch_page::<Complaint>(&state.pool, &params).await?;
    let stats = count_by(
        &state.pool,
        TABLE,
        "status",
        &[("open", "Open"), ("investigating", "Investigating"), ("resolved", "Resolved")],
    )
    .await?;
    Ok(Json(page.with_stats(stats)))
}

#[utoipa::path(
    get,
    path = "/api/complaints/export/csv",
    tag = "Complaints",
    params(ListParams),
    responses((status = 200, description = "CSV export", content_type = "text/csv")),
    security(("bearerAuth" = []))
)]
pub async fn export_complaints(State(state): State<AppState>, Query(params): Query<ListParams>) -> AppResult<Response> {
    let rows = list_spec().fetch_all::<Complaint>(&state.pool, &params).await?;
    Ok(csv::attachment(TABLE, &rows))
}

#[utoipa::path(
    get,
    path = "/api/complaints/{uuid}",
    tag = "Complaints",
    params(("uuid" = String, Path, description = "Complaint uuid")),
    responses(
        (status = 200, description = "Complaint detail", body = Complaint),
        (status = 404, description = "Complaint not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_complaint(State(state): State<AppState>, Path(uuid): Path<String>) -> AppResult<Json<Complaint>> {
    Ok(Json(fetch_complaint(&state.pool, &uuid).await?))
}

#[utoipa::path(
    put,
    path = "/api/complaints/{uuid}",
    tag = "Complaints",
    params(("uuid" = String, Path, description = "Complaint uuid")),
    request_body = ComplaintUpdate,
    responses(
        (status = 200, description = "Complaint updated", body = Complaint),
        (status = 404, description = "Complaint not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_complaint(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(uuid): Path<String>,
    ValidatedJson(payload): ValidatedJson<ComplaintUpdate>,
) -> AppResult<Json<Complaint>> {
    let mut complaint = fetch_complaint(&state.pool, &uuid).await?;
    let old = complaint.clone();

    payload.apply(&mut complaint);
    complaint.updated_at = utc_now();

    sqlx::query(
        r#"
        UPDATE complaints SET
            type = ?, date_of_incident = ?, description = ?, remedy_sought = ?, full_name = ?, email = ?,
            phone = ?, address = ?, national_id = ?, passport_number = ?, priority = ?, status = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(complaint.kind)
    .bind(complaint.date_of_incident)
    .bind(&complaint.description)
    .bind(&complaint.remedy_sought)
    .bind(&complaint.full_name)
    .bind(&complaint.email)
    .bind(&complaint.phone)
    .bind(&complaint.address)
    .bind(&complaint.national_id)
    .bind(&complaint.passport_number)
    .bind(complaint.priority)
    .bind(complaint.status)
    .bind(complaint.updated_at)
    .bind(complaint.id)
    .execute(&state.pool)
    .await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.uuid),
        &complaint,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );
    Ok(Json(complaint))
}

#[utoipa::path(
    delete,
    path = "/api/complaints/{uuid}",
    tag = "Complaints",
    params(("uuid" = String, Path, description = "Complaint uuid")),
    responses(
        (status = 200, description = "Complaint deleted", body = MessageResponse),
        (status = 404, description = "Complaint not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_complaint(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(uuid): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let complaint = fetch_complaint(&state.pool, &uuid).await?;
    super::delete_by_id(&state.pool, TABLE, complaint.id).await?;

    log_activity(&state.event_bus, "deleted", Some(auth.uuid), &complaint);
    Ok(Json(MessageResponse::new("Complaint deleted successfully")))
}
