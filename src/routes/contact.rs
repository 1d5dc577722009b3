use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{roles, AccessRule};
use crate::errors::AppResult;
use crate::events::log_activity;
use crate::extract::ValidatedJson;
use crate::jwt::AuthUser;
use crate::models::contact::{ContactMessage, ContactPayload};
use crate::models::{MessageResponse, PageDoc};
use crate::query::{ListParams, ListSpec, Page};
use crate::utils::{non_empty, normalize_email, utc_now};

const TABLE: &str = "contact_messages";
const ENTITY: &str = "Contact message";

pub fn routes(state: &AppState) -> Router<AppState> {
    let admin = state.guard(
        AccessRule::roles([roles::SUPER_ADMIN]),
        Router::new()
            .route("/", get(list_contact_messages))
            .route("/:uuid", get(get_contact_message).delete(delete_contact_message)),
    );

    Router::new().route("/", post(submit_contact_message)).merge(admin)
}

#[utoipa::path(
    post,
    path = "/api/contact-us",
    tag = "Contact",
    request_body = ContactPayload,
    responses(
        (status = 201, description = "Message received", body = ContactMessage),
        (status = 422, description = "Missing name, email or message")
    )
)]
pub async fn submit_contact_message(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ContactPayload>,
) -> AppResult<(StatusCode, Json<ContactMessage>)> {
    let now = utc_now();
    let message = sqlx::query_as::<_, ContactMessage>(
        r#"
        INSERT INTO contact_messages (uuid, full_name, email, phone_number, subject, message, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(payload.full_name.trim())
    .bind(normalize_email(&payload.email))
    .bind(non_empty(payload.phone_number))
    .bind(non_empty(payload.subject))
    .bind(payload.message.trim())
    .bind(now)
    .bind(now)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(uuid = %message.uuid, "contact message received");
    log_activity(&state.event_bus, "created", None, &message);
    Ok((StatusCode::CREATED, Json(message)))
}

#[utoipa::path(
    get,
    path = "/api/contact-us",
    tag = "Contact",
    params(ListParams),
    responses((status = 200, description = "Paginated contact messages", body = PageDoc)),
    security(("bearerAuth" = []))
)]
pub async fn list_contact_messages(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<ContactMessage>>> {
    let page = ListSpec::new(TABLE)
        .search(&["full_name", "email", "subject", "message"])
        .sortable(&["full_name", "email", "subject", "created_at"])
        .fetch_page::<ContactMessage>(&state.pool, &params)
        .await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/api/contact-us/{uuid}",
    tag = "Contact",
    params(("uuid" = String, Path, description = "Contact message uuid")),
    responses(
        (status = 200, description = "Contact message", body = ContactMessage),
        (status = 404, description = "Contact message not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_contact_message(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> AppResult<Json<ContactMessage>> {
    Ok(Json(super::find_by_uuid(&state.pool, TABLE, ENTITY, &uuid).await?))
}

#[utoipa::path(
    delete,
    path = "/api/contact-us/{uuid}",
    tag = "Contact",
    params(("uuid" = String, Path, description = "Contact message uuid")),
    responses(
        (status = 200, description = "Contact message deleted", body = MessageResponse),
        (status = 404, description = "Contact message not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_contact_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(uuid): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let message: ContactMessage = super::find_by_uuid(&state.pool, TABLE, ENTITY, &uuid).await?;
    super::delete_by_id(&state.pool, TABLE, message.id).await?;

    log_activity(&state.event_bus, "deleted", Some(auth.uuid), &message);
    Ok(Json(MessageResponse::new("Contact message deleted successfully")))
}
