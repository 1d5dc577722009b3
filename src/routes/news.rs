use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use sqlx::SqlitePool;

use crate::app::AppState;
use crate::authz::{roles, AccessRule};
use crate::csv;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, log_activity_with_context, RequestContext};
use crate::extract::ValidatedJson;
use crate::ident::{self, SequenceKind};
use crate::jwt::AuthUser;
use crate::models::news::{News, NewsCategory, NewsPayload, NewsUpdate, NewsView};
use crate::models::{media, MessageResponse, PageDoc, PublishStatus};
use crate::query::{boolean_filter, count_by, FilterValue, ListParams, ListSpec, Page};
use crate::utils::utc_now;

const TABLE: &str = "news";
const ENTITY: &str = "News";
const FEATURED_LIMIT: i64 = 5;

pub fn routes(state: &AppState) -> Router<AppState> {
    let admin = state.guard(
        AccessRule::roles([roles::SUPER_ADMIN]),
        Router::new()
            .route("/", get(list_news).post(create_news))
            .route("/export/csv", get(export_news))
            .route("/:uuid", get(get_news).put(update_news).delete(delete_news)),
    );

    Router::new()
        .route("/public", get(list_published_news))
        .route("/public/:uuid", get(show_published_news))
        .route("/feature", get(featured_news))
        .merge(admin)
}

fn list_spec() -> ListSpec {
    ListSpec::new(TABLE)
        .search(&["title", "excerpt", "content"])
        .sequence(SequenceKind::News)
        .filter("status", "status", PublishStatus::filter_value)
        .filter("category", "category", NewsCategory::filter_value)
        .filter("featured", "featured", boolean_filter)
        .sortable(&["title", "category", "status", "published_at", "view", "created_at", "updated_at"])
}

fn published() -> FilterValue {
    FilterValue::Text(PublishStatus::Published.as_str().to_string())
}

async fn fetch_news(pool: &SqlitePool, uuid: &str) -> AppResult<News> {
    super::find_by_uuid(pool, TABLE, ENTITY, uuid).await
}

async fn save_news(pool: &SqlitePool, news: &News) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE news SET
            title = ?, category = ?, excerpt = ?, content = ?, image = ?, status = ?, published_at = ?,
            featured = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&news.title)
    .bind(news.category)
    .bind(&news.excerpt)
    .bind(&news.content)
    .bind(&news.image)
    .bind(news.status)
    .bind(news.published_at)
    .bind(news.featured)
    .bind(news.updated_at)
    .bind(news.id)
    .execute(pool)
    .await?;
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/news/public",
    tag = "News",
    params(ListParams),
    responses((status = 200, description = "Published news", body = PageDoc))
)]
pub async fn list_published_news(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<NewsView>>> {
    let page = list_spec()
        .scope_eq("status", published())
        .fetch_page::<News>(&state.pool, &params)
        .await?;
    Ok(Json(page.map(|n| NewsView::new(n, &state.config))))
}

#[utoipa::path(
    get,
    path = "/api/news/public/{uuid}",
    tag = "News",
    params(("uuid" = String, Path, description = "News uuid")),
    responses(
        (status = 200, description = "Published article; the view counter is incremented", body = NewsView),
        (status = 404, description = "News not found")
    )
)]
pub async fn show_published_news(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> AppResult<Json<NewsView>> {
    let mut news = fetch_news(&state.pool, &uuid).await?;
    if news.status != PublishStatus::Published {
        return Err(AppError::entity_not_found(ENTITY));
    }

    sqlx::query("UPDATE news SET view = view + 1 WHERE id = ?")
        .bind(news.id)
        .execute(&state.pool)
        .await?;
    news.view += 1;

    Ok(Json(NewsView::new(news, &state.config)))
}

#[utoipa::path(
    get,
    path = "/api/news/feature",
    tag = "News",
    responses((status = 200, description = "Up to five featured published articles", body = [NewsView]))
)]
pub async fn featured_news(State(state): State<AppState>) -> AppResult<Json<Vec<NewsView>>> {
    let rows = sqlx::query_as::<_, News>(
        "SELECT * FROM news WHERE featured = 1 AND status = ? ORDER BY published_at DESC, id DESC LIMIT ?",
    )
    .bind(PublishStatus::Published)
    .bind(FEATURED_LIMIT)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows.into_iter().map(|n| NewsView::new(n, &state.config)).collect()))
}

#[utoipa::path(
    get,
    path = "/api/news",
    tag = "News",
    params(ListParams),
    responses((status = 200, description = "All news with draft, published and featured counts", body = PageDoc)),
    security(("bearerAuth" = []))
)]
pub async fn list_news(State(state): State<AppState>, Query(params): Query<ListParams>) -> AppResult<Json<Page<NewsView>>> {
    let page = list_spec().fetch_page::<News>(&state.pool, &params).await?;

    let mut stats = count_by(&state.pool, TABLE, "status", &[("draft", "draft"), ("published", "published")]).await?;
    let featured: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM news WHERE featured = 1")
        .fetch_one(&state.pool)
        .await?;
    stats.insert("featured".to_string(), featured);

    Ok(Json(page.with_stats(stats).map(|n| NewsView::new(n, &state.config))))
}

#[utoipa::path(
    get,
    path = "/api/news/export/csv",
    tag = "News",
    params(ListParams),
    responses((status = 200, description = "CSV export", content_type = "text/csv")),
    security(("bearerAuth" = []))
)]
pub async fn export_news(State(state): State<AppState>, Query(params): Query<ListParams>) -> AppResult<Response> {
    let rows = list_spec().fetch_all::<News>(&state.pool, &params).await?;
    Ok(csv::attachment(TABLE, &rows))
}

#[utoipa::path(
    get,
    path = "/api/news/{uuid}",
    tag = "News",
    params(("uuid" = String, Path, description = "News uuid")),
    responses((status = 200, description = "Article in any status", body = NewsView), (status = 404, description = "News not found")),
    security(("bearerAuth" = []))
)]
pub async fn get_news(State(state): State<AppState>, Path(uuid): Path<String>) -> AppResult<Json<NewsView>> {
    Ok(Json(NewsView::new(fetch_news(&state.pool, &uuid).await?, &state.config)))
}

#[utoipa::path(
    post,
    path = "/api/news",
    tag = "News",
    request_body = NewsPayload,
    responses((status = 201, description = "Article created", body = NewsView)),
    security(("bearerAuth" = []))
)]
pub async fn create_news(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(mut payload): ValidatedJson<NewsPayload>,
) -> AppResult<(StatusCode, Json<NewsView>)> {
    payload.image_path = media::resolve_path(&state.pool, payload.image.as_deref()).await?;

    let (id, ids) = ident::create(&state.pool, &payload).await?;
    let news: News = super::find_by_id(&state.pool, TABLE, ENTITY, id).await?;

    tracing::info!(sample_id = %ids.sample_id, status = %news.status, "news created");
    log_activity(&state.event_bus, "created", Some(auth.uuid), &news);
    Ok((StatusCode::CREATED, Json(NewsView::new(news, &state.config))))
}

#[utoipa::path(
    put,
    path = "/api/news/{uuid}",
    tag = "News",
    params(("uuid" = String, Path, description = "News uuid")),
    request_body = NewsUpdate,
    responses((status = 200, description = "Article updated", body = NewsView), (status = 404, description = "News not found")),
    security(("bearerAuth" = []))
)]
pub async fn update_news(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(uuid): Path<String>,
    ValidatedJson(mut payload): ValidatedJson<NewsUpdate>,
) -> AppResult<Json<NewsView>> {
    let mut news = fetch_news(&state.pool, &uuid).await?;
    let old = news.clone();

    payload.image_path = media::resolve_path(&state.pool, payload.image.as_deref()).await?;
    let now = utc_now();
    payload.apply(&mut news, now);
    news.updated_at = now;
    save_news(&state.pool, &news).await?;

    let action = if old.status != news.status && news.status == PublishStatus::Published {
        "published"
    } else {
        "updated"
    };
    log_activity_with_context(
        &state.event_bus,
        action,
        Some(auth.uuid),
        &news,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );
    Ok(Json(NewsView::new(news, &state.config)))
}

#[utoipa::path(
    delete,
    path = "/api/news/{uuid}",
    tag = "News",
    params(("uuid" = String, Path, description = "News uuid")),
    responses((status = 200, description = "Article deleted", body = MessageResponse), (status = 404, description = "News not found")),
    security(("bearerAuth" = []))
)]
pub async fn delete_news(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(uuid): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let news = fetch_news(&state.pool, &uuid).await?;
    super::delete_by_id(&state.pool, TABLE, news.id).await?;

    log_activity(&state.event_bus, "deleted", Some(auth.uuid), &news);
    Ok(Json(MessageResponse::new("News deleted successfully")))
}
