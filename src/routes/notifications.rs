use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{roles, AccessRule};
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::extract::ValidatedJson;
use crate::jwt::AuthUser;
use crate::models::notification::{
    MarkMultipleRequest, MarkMultipleResponse, Notification, NotificationPayload, NotificationQuery,
    NotificationView, NotificationWithRead, UnreadCountResponse,
};
use crate::models::user;
use crate::models::{MessageResponse, PageDoc};
use crate::query::{boolean_filter, FilterValue, Page, Pagination};
use crate::utils::utc_now;

pub const NOTIFICATION_PAGE_SIZE: u32 = 20;
const NOT_VISIBLE: &str = "Notification not found or access denied";

pub fn routes(state: &AppState) -> Router<AppState> {
    let publish = state.guard(
        AccessRule::roles([roles::SUPER_ADMIN, roles::ADMIN]),
        Router::new()
            .route("/global", post(create_global_notification))
            .route("/user/:uuid", post(create_user_notification)),
    );

    Router::new()
        .route("/", get(list_notifications))
        .route("/unread-count", get(unread_count))
        .route("/mark-multiple-read", post(mark_multiple_read))
        .route("/mark-all-read", post(mark_all_read))
        .route("/:uuid/read", post(mark_read))
        .merge(publish)
}

/// Global notifications plus the ones addressed to the user.
const VISIBLE: &str = "(n.is_global = 1 OR n.user_id = ?)";

fn wants_read(raw: Option<&str>) -> bool {
    matches!(raw.and_then(boolean_filter), Some(FilterValue::Int(1)))
}

async fn find_visible(pool: &SqlitePool, user_id: i64, uuid: &str) -> AppResult<NotificationWithRead> {
    sqlx::query_as::<_, NotificationWithRead>(&format!(
        r#"
        SELECT n.*, r.read_at
        FROM notifications n
        LEFT JOIN notification_reads r ON r.notification_id = n.id AND r.user_id = ?
        WHERE n.uuid = ? AND {VISIBLE}
        "#
    ))
    .bind(user_id)
    .bind(uuid)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found(NOT_VISIBLE))
}

/// Records a read receipt. Returns false when one already existed.
async fn record_read(pool: &SqlitePool, notification_id: i64, user_id: i64) -> AppResult<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO notification_reads (notification_id, user_id, read_at) VALUES (?, ?, ?)",
    )
    .bind(notification_id)
    .bind(user_id)
    .bind(utc_now())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert_notification(
    pool: &SqlitePool,
    payload: &NotificationPayload,
    user_id: Option<i64>,
) -> AppResult<Notification> {
    let now = utc_now();
    let metadata = payload.metadata.as_ref().map(|m| m.to_string());

    Ok(sqlx::query_as::<_, Notification>(
        r#"
        INSERT INTO notifications (uuid, title, message, type, is_global, user_id, metadata, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(payload.title.trim())
    .bind(payload.message.trim())
    .bind(payload.kind.unwrap_or_default())
    .bind(user_id.is_none())
    .bind(user_id)
    .bind(metadata)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?)
}

#[utoipa::path(
    get,
    path = "/api/notifications",
    tag = "Notifications",
    params(NotificationQuery),
    responses((status = 200, description = "Notifications visible to the caller, newest first", body = PageDoc)),
    security(("bearerAuth" = []))
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<NotificationQuery>,
) -> AppResult<Json<Page<NotificationView>>> {
    let pagination = Pagination::parse(query.page.as_deref(), query.page_size.as_deref(), NOTIFICATION_PAGE_SIZE);
    let unread_only = if wants_read(query.include_read.as_deref()) {
        ""
    } else {
        " AND r.id IS NULL"
    };
    let from = format!(
        r#"
        FROM notifications n
        LEFT JOIN notification_reads r ON r.notification_id = n.id AND r.user_id = ?
        WHERE {VISIBLE}{unread_only}
        "#
    );

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {from}"))
        .bind(auth.user_id)
        .bind(auth.user_id)
        .fetch_one(&state.pool)
        .await?;

    let rows = sqlx::query_as::<_, NotificationWithRead>(&format!(
        "SELECT n.*, r.read_at {from} ORDER BY n.created_at DESC, n.id DESC LIMIT ? OFFSET ?"
    ))
    .bind(auth.user_id)
    .bind(auth.user_id)
    .bind(i64::from(pagination.per_page))
    .bind(pagination.offset())
    .fetch_all(&state.pool)
    .await?;

    let data = rows.into_iter().map(NotificationView::from).collect();
    Ok(Json(Page::new(data, total, pagination)))
}

#[utoipa::path(
    get,
    path = "/api/notifications/unread-count",
    tag = "Notifications",
    responses((status = 200, description = "Unread notifications visible to the caller", body = UnreadCountResponse)),
    security(("bearerAuth" = []))
)]
pub async fn unread_count(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<UnreadCountResponse>> {
    let count: i64 = sqlx::query_scalar(&format!(
        r#"
        SELECT COUNT(*)
        FROM notifications n
        LEFT JOIN notification_reads r ON r.notification_id = n.id AND r.user_id = ?
        WHERE {VISIBLE} AND r.id IS NULL
        "#
    ))
    .bind(auth.user_id)
    .bind(auth.user_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(UnreadCountResponse { count }))
}

#[utoipa::path(
    post,
    path = "/api/notifications/{uuid}/read",
    tag = "Notifications",
    params(("uuid" = String, Path, description = "Notification uuid")),
    responses(
        (status = 200, description = "Marked as read, or already read", body = MessageResponse),
        (status = 404, description = "Notification not found or access denied")
    ),
    security(("bearerAuth" = []))
)]
pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(uuid): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let row = find_visible(&state.pool, auth.user_id, &uuid).await?;
    if row.read_at.is_some() || !record_read(&state.pool, row.notification.id, auth.user_id).await? {
        return Ok(Json(MessageResponse::new("Already marked as read")));
    }
    Ok(Json(MessageResponse::new("Notification marked as read")))
}

#[utoipa::path(
    post,
    path = "/api/notifications/mark-multiple-read",
    tag = "Notifications",
    request_body = MarkMultipleRequest,
    responses((status = 200, description = "Per-id outcome counts", body = MarkMultipleResponse)),
    security(("bearerAuth" = []))
)]
pub async fn mark_multiple_read(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(payload): ValidatedJson<MarkMultipleRequest>,
) -> AppResult<Json<MarkMultipleResponse>> {
    let mut outcome = MarkMultipleResponse { success: 0, failed: 0 };

    for uuid in &payload.notification_ids {
        match find_visible(&state.pool, auth.user_id, uuid.trim()).await {
            Ok(row) => {
                record_read(&state.pool, row.notification.id, auth.user_id).await?;
                outcome.success += 1;
            }
            Err(AppError::NotFound(_)) => outcome.failed += 1,
            Err(err) => return Err(err),
        }
    }

    Ok(Json(outcome))
}

#[utoipa::path(
    post,
    path = "/api/notifications/mark-all-read",
    tag = "Notifications",
    responses((status = 200, description = "Every visible notification marked as read", body = MessageResponse)),
    security(("bearerAuth" = []))
)]
pub async fn mark_all_read(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<MessageResponse>> {
    let marked = sqlx::query(&format!(
        r#"
        INSERT OR IGNORE INTO notification_reads (notification_id, user_id, read_at)
        SELECT n.id, ?, ? FROM notifications n WHERE {VISIBLE}
        "#
    ))
    .bind(auth.user_id)
    .bind(utc_now())
    .bind(auth.user_id)
    .execute(&state.pool)
    .await?
    .rows_affected();

    tracing::debug!(user_id = auth.user_id, marked, "marked all notifications as read");
    Ok(Json(MessageResponse::new("All notifications marked as read")))
}

#[utoipa::path(
    post,
    path = "/api/notifications/global",
    tag = "Notifications",
    request_body = NotificationPayload,
    responses((status = 201, description = "Global notification created", body = NotificationView)),
    security(("bearerAuth" = []))
)]
pub async fn create_global_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(payload): ValidatedJson<NotificationPayload>,
) -> AppResult<(StatusCode, Json<NotificationView>)> {
    let notification = insert_notification(&state.pool, &payload, None).await?;

    log_activity(&state.event_bus, "created", Some(auth.uuid), &notification);
    Ok((StatusCode::CREATED, Json(notification.into())))
}

#[utoipa::path(
    post,
    path = "/api/notifications/user/{uuid}",
    tag = "Notifications",
    params(("uuid" = String, Path, description = "Recipient user uuid")),
    request_body = NotificationPayload,
    responses(
        (status = 201, description = "Notification created for the user", body = NotificationView),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_user_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(uuid): Path<String>,
    ValidatedJson(payload): ValidatedJson<NotificationPayload>,
) -> AppResult<(StatusCode, Json<NotificationView>)> {
    let recipient = user::find_by_uuid(&state.pool, &uuid).await?;
    let notification = insert_notification(&state.pool, &payload, Some(recipient.id)).await?;

    log_activity(&state.event_bus, "created", Some(auth.uuid), &notification);
    Ok((StatusCode::CREATED, Json(notification.into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_items_are_hidden_unless_requested() {
        assert!(!wants_read(None));
        assert!(!wants_read(Some("false")));
        assert!(!wants_read(Some("maybe")));
        assert!(wants_read(Some("true")));
        assert!(wants_read(Some("1")));
    }
}
