use std::sync::Arc;

use axum::http::Method;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::acl::Acl;
use crate::authz::{enforce, gate, AccessRule};
use crate::config::AppConfig;
use crate::effects::{EffectWorker, Mailer, SideEffectQueue};
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{
    acl, admins, auth, commissioners, complaints, contact, dashboard, faqs, health, media, news, notifications,
    requests, resources, settings, users,
};
use crate::storage::{FileStore, LocalDisk};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub config: Arc<AppConfig>,
    pub event_bus: EventBus,
    pub effects: SideEffectQueue,
    pub storage: Arc<dyn FileStore>,
}

impl AppState {
    /// Starts the activity listener and the side-effect worker for `pool`.
    pub fn new(pool: SqlitePool, jwt: JwtConfig, config: AppConfig) -> Self {
        let (event_bus, event_rx) = init_event_bus();
        tokio::spawn(start_activity_listener(event_rx, pool.clone()));

        let mailer = Mailer::new(&config);
        let (effects, _worker) = SideEffectQueue::spawn(EffectWorker::new(pool.clone(), mailer));
        let storage: Arc<dyn FileStore> = Arc::new(LocalDisk::new(config.storage_root.clone()));

        Self {
            pool,
            jwt: Arc::new(jwt),
            config: Arc::new(config),
            event_bus,
            effects,
            storage,
        }
    }

    pub fn acl(&self) -> Acl {
        Acl::new(self.pool.clone())
    }

    /// Wraps every route of `router` in the capability gate for `rule`.
    pub fn guard(&self, rule: AccessRule, router: Router<AppState>) -> Router<AppState> {
        router.route_layer(middleware::from_fn_with_state(gate(self, rule), enforce))
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let config = AppConfig::from_env()?;
    Ok(build_router(AppState::new(pool, jwt_config, config)))
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_origin(Any)
        .allow_headers(Any);

    let storage_dir = ServeDir::new(state.config.storage_root.clone());

    let api = Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth::routes())
        .nest("/users", users::routes(&state).merge(acl::user_routes(&state)))
        .nest("/admins", admins::routes(&state))
        .nest("/roles", acl::role_routes(&state))
        .nest("/permissions", acl::permission_routes(&state))
        .nest("/requests", requests::routes(&state))
        .nest("/complaints", complaints::routes(&state))
        .nest("/commissioners", commissioners::routes(&state))
        .nest("/news", news::routes(&state))
        .nest("/resources", resources::routes(&state))
        .nest("/faqs", faqs::routes(&state))
        .nest("/settings", settings::routes(&state))
        .nest("/contact-us", contact::routes(&state))
        .nest("/notifications", notifications::routes(&state))
        .nest("/dashboard", dashboard::routes(&state))
        .nest("/media", media::routes(&state));

    Router::new()
        .nest("/api", api)
        .nest_service("/storage", storage_dir)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
