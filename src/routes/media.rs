use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{AccessRule, Action, ResourceKind};
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::models::media::{self, Media, MediaView};
use crate::models::MessageResponse;
use crate::storage;
use crate::utils::utc_now;

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
const UPLOAD_FIELD: &str = "files";

pub fn routes(state: &AppState) -> Router<AppState> {
    let upload = state.guard(
        AccessRule::admin(),
        Router::new()
            .route("/", post(upload_media))
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
    );
    let remove = state.guard(
        AccessRule::admin().with_capability(Action::Delete, ResourceKind::Resource),
        Router::new().route("/:uuid", delete(delete_media)),
    );
    upload.merge(remove)
}

/// Deletes the media row and file at `path` once no content row points at it.
///
/// Called after the referencing row was updated or deleted. File errors leave
/// an orphan on disk and are only logged.
pub(crate) async fn release_file(state: &AppState, path: &str) -> AppResult<()> {
    let remaining = media::reference_count(&state.pool, path).await?;
    if remaining > 0 {
        tracing::debug!(path, remaining, "media still referenced, keeping file");
        return Ok(());
    }

    sqlx::query("DELETE FROM media WHERE path = ?")
        .bind(path)
        .execute(&state.pool)
        .await?;
    if let Err(err) = state.storage.delete(path).await {
        tracing::warn!(error = %err, path, "failed to delete released media file");
    }
    Ok(())
}

struct Upload {
    name: String,
    mime: String,
    bytes: Vec<u8>,
}

async fn read_uploads(mut multipart: Multipart) -> AppResult<Vec<Upload>> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart body: {err}")))?
    {
        let field_name = field.name().unwrap_or_default();
        if field_name != UPLOAD_FIELD && field_name != "files[]" {
            continue;
        }

        let name = field.file_name().unwrap_or("upload").to_string();
        let mime = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::bad_request(format!("failed to read upload {name}: {err}")))?;

        uploads.push(Upload {
            name,
            mime,
            bytes: bytes.to_vec(),
        });
    }

    if uploads.is_empty() {
        return Err(AppError::invalid_field(UPLOAD_FIELD, "At least one file is required"));
    }
    Ok(uploads)
}

#[utoipa::path(
    post,
    path = "/api/media",
    tag = "Media",
    request_body(content_type = "multipart/form-data", description = "One or more `files` parts"),
    responses(
        (status = 201, description = "Stored media", body = [MediaView]),
        (status = 403, description = "Admin flag required"),
        (status = 422, description = "No file parts in the request")
    ),
    security(("bearerAuth" = []))
)]
pub async fn upload_media(
    State(state): State<AppState>,
    auth: AuthUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<Vec<MediaView>>)> {
    let uploads = read_uploads(multipart).await?;
    let mut stored = Vec::with_capacity(uploads.len());

    for upload in uploads {
        let now = utc_now();
        let key = storage::media_key(&upload.name, now);
        state.storage.put(&key, &upload.bytes).await?;

        let inserted = sqlx::query_as::<_, Media>(
            r#"
            INSERT INTO media (uuid, name, path, mime, size, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&upload.name)
        .bind(&key)
        .bind(&upload.mime)
        .bind(upload.bytes.len() as i64)
        .bind(now)
        .bind(now)
        .fetch_one(&state.pool)
        .await;

        let media = match inserted {
            Ok(media) => media,
            Err(err) => {
                if let Err(cleanup) = state.storage.delete(&key).await {
                    tracing::warn!(error = %cleanup, path = %key, "failed to remove orphaned upload");
                }
                return Err(err.into());
            }
        };

        tracing::info!(uuid = %media.uuid, path = %media.path, size = media.size, "media stored");
        log_activity(&state.event_bus, "uploaded", Some(auth.uuid), &media);
        stored.push(MediaView::new(media, &state.config));
    }

    Ok((StatusCode::CREATED, Json(stored)))
}

#[utoipa::path(
    delete,
    path = "/api/media/{uuid}",
    tag = "Media",
    params(("uuid" = String, Path, description = "Media uuid")),
    responses(
        (status = 200, description = "Media deleted", body = MessageResponse),
        (status = 403, description = "Admin flag and delete-resource required"),
        (status = 404, description = "Media not found"),
        (status = 409, description = "Media is still used by content")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_media(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(uuid): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let media = media::find_by_uuid(&state.pool, &uuid).await?;
    if media::reference_count(&state.pool, &media.path).await? > 0 {
        return Err(AppError::conflict("Media is still used by published or draft content"));
    }

    if let Err(err) = state.storage.delete(&media.path).await {
        tracing::warn!(error = %err, path = %media.path, "failed to delete media file");
    }
    super::delete_by_id(&state.pool, "media", media.id).await?;

    log_activity(&state.event_bus, "deleted", Some(auth.uuid), &media);
    Ok(Json(MessageResponse::new("Media deleted successfully")))
}
