use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};

use crate::app::AppState;
use crate::authz::AccessRule;
use crate::csv;
use crate::errors::AppResult;
use crate::events::log_activity;
use crate::extract::ValidatedJson;
use crate::ident::{self, SequenceKind};
use crate::jwt::AuthUser;
use crate::models::faq::{Faq, FaqPayload, FaqUpdate};
use crate::models::{MessageResponse, PageDoc};
use crate::query::{ListParams, ListSpec, Page};
use crate::utils::utc_now;

const TABLE: &str = "faqs";
const ENTITY: &str = "FAQ";

pub fn routes(state: &AppState) -> Router<AppState> {
    let admin = state.guard(
        AccessRule::admin(),
        Router::new()
            .route("/", get(list_faqs).post(create_faq))
            .route("/export/csv", get(export_faqs))
            .route("/:uuid", get(get_faq).put(update_faq).delete(delete_faq)),
    );

    Router::new()
        .route("/public", get(list_public_faqs))
        .route("/public/:uuid", get(get_faq))
        .merge(admin)
}

fn list_spec() -> ListSpec {
    ListSpec::new(TABLE)
        .search(&["question", "answer"])
        .sequence(SequenceKind::Faq)
        .sortable(&["question", "created_at", "updated_at"])
}

#[utoipa::path(
    get,
    path = "/api/faqs/public",
    tag = "FAQs",
    params(ListParams),
    responses((status = 200, description = "FAQs for the public site", body = PageDoc))
)]
pub async fn list_public_faqs(State(state): State<AppState>, Query(params): Query<ListParams>) -> AppResult<Json<Page<Faq>>> {
    Ok(Json(list_spec().fetch_page::<Faq>(&state.pool, &params).await?))
}

#[utoipa::path(
    get,
    path = "/api/faqs",
    tag = "FAQs",
    params(ListParams),
    responses((status = 200, description = "Paginated FAQs", body = PageDoc)),
    security(("bearerAuth" = []))
)]
pub async fn list_faqs(State(state): State<AppState>, Query(params): Query<ListParams>) -> AppResult<Json<Page<Faq>>> {
    let page = list_spec().fetch_page::<Faq>(&state.pool, &params).await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM faqs").fetch_one(&state.pool).await?;
    Ok(Json(page.with_stats([("total".to_string(), total)].into())))
}

#[utoipa::path(
    get,
    path = "/api/faqs/export/csv",
    tag = "FAQs",
    params(ListParams),
    responses((status = 200, description = "CSV export", content_type = "text/csv")),
    security(("bearerAuth" = []))
)]
pub async fn export_faqs(State(state): State<AppState>, Query(params): Query<ListParams>) -> AppResult<Response> {
    let rows = list_spec().fetch_all::<Faq>(&state.pool, &params).await?;
    Ok(csv::attachment(TABLE, &rows))
}

#[utoipa::path(
    get,
    path = "/api/faqs/{uuid}",
    tag = "FAQs",
    params(("uuid" = String, Path, description = "FAQ uuid")),
    responses((status = 200, description = "FAQ", body = Faq), (status = 404, description = "FAQ not found"))
)]
pub async fn get_faq(State(state): State<AppState>, Path(uuid): Path<String>) -> AppResult<Json<Faq>> {
    Ok(Json(super::find_by_uuid(&state.pool, TABLE, ENTITY, &uuid).await?))
}

#[utoipa::path(
    post,
    path = "/api/faqs",
    tag = "FAQs",
    request_body = FaqPayload,
    responses((status = 201, description = "FAQ created", body = Faq), (status = 422, description = "Blank question or answer")),
    security(("bearerAuth" = []))
)]
pub async fn create_faq(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(payload): ValidatedJson<FaqPayload>,
) -> AppResult<(StatusCode, Json<Faq>)> {
    let (id, ids) = ident::create(&state.pool, &payload).await?;
    let faq: Faq = super::find_by_id(&state.pool, TABLE, ENTITY, id).await?;

    tracing::info!(sample_id = %ids.sample_id, "faq created");
    log_activity(&state.event_bus, "created", Some(auth.uuid), &faq);
    Ok((StatusCode::CREATED, Json(faq)))
}

#[utoipa::path(
    put,
    path = "/api/faqs/{uuid}",
    tag = "FAQs",
    params(("uuid" = String, Path, description = "FAQ uuid")),
    request_body = FaqUpdate,
    responses((status = 200, description = "FAQ updated", body = Faq), (status = 404, description = "FAQ not found")),
    security(("bearerAuth" = []))
)]
pub async fn update_faq(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(uuid): Path<String>,
    ValidatedJson(payload): ValidatedJson<FaqUpdate>,
) -> AppResult<Json<Faq>> {
    let mut faq: Faq = super::find_by_uuid(&state.pool, TABLE, ENTITY, &uuid).await?;
    payload.apply(&mut faq);
    faq.updated_at = utc_now();

    sqlx::query("UPDATE faqs SET question = ?, answer = ?, updated_at = ? WHERE id = ?")
        .bind(&faq.question)
        .bind(&faq.answer)
        .bind(faq.updated_at)
        .bind(faq.id)
        .execute(&state.pool)
        .await?;

    log_activity(&state.event_bus, "updated", Some(auth.uuid), &faq);
    Ok(Json(faq))
}

#[utoipa::path(
    delete,
    path = "/api/faqs/{uuid}",
    tag = "FAQs",
    params(("uuid" = String, Path, description = "FAQ uuid")),
    responses((status = 200, description = "FAQ deleted", body = MessageResponse), (status = 404, description = "FAQ not found")),
    security(("bearerAuth" = []))
)]
pub async fn delete_faq(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(uuid): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let faq: Faq = super::find_by_uuid(&state.pool, TABLE, ENTITY, &uuid).await?;
    super::delete_by_id(&state.pool, TABLE, faq.id).await?;

    log_activity(&state.event_bus, "deleted", Some(auth.uuid), &faq);
    Ok(Json(MessageResponse::new("FAQ deleted successfully")))
}
