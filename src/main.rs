//! Rescue Coordination Backend
//!
//! REST backend for emergency rescue reports: case lifecycle, volunteer
//! matching and notifications, with SQLite persistence.

mod api;
mod auth;
mod config;
mod coordinator;
mod db;
mod errors;
mod geo;
mod geocode;
mod lifecycle;
mod matcher;
mod media;
mod models;
mod notify;
mod ratelimit;
mod storage;
mod tasks;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{Config, LogFormat};
use coordinator::CaseCoordinator;
use db::Repository;
use errors::AppError;
use geocode::{Geocoder, NominatimGeocoder};
use matcher::VolunteerMatcher;
use media::MediaService;
use notify::{InboxTransport, NotificationDispatcher};
use ratelimit::RateLimiter;
use storage::LocalMediaStore;
use tasks::BackgroundTasks;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
    pub coordinator: CaseCoordinator,
    pub matcher: VolunteerMatcher,
    pub media: MediaService,
    pub limiter: RateLimiter,
    pub upload_limiter: RateLimiter,
    pub geocoder: Arc<dyn Geocoder>,
    pub tasks: BackgroundTasks,
}

impl AppState {
    /// Wire the services around an open repository. Notifications go to the
    /// in-app inbox.
    pub fn new(config: Config, repo: Arc<Repository>) -> Result<Self, AppError> {
        let geocoder: Arc<dyn Geocoder> = Arc::new(NominatimGeocoder::new(&config.geocoder_url)?);
        Ok(Self::with_geocoder(config, repo, geocoder))
    }

    pub fn with_geocoder(
        config: Config,
        repo: Arc<Repository>,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        let tasks = BackgroundTasks::new();
        let matcher = VolunteerMatcher::new(repo.clone(), &config);
        let dispatcher = NotificationDispatcher::new(
            Arc::new(InboxTransport::new(repo.clone())),
            config.notify_batch_size,
        );
        let coordinator =
            CaseCoordinator::new(repo.clone(), matcher.clone(), dispatcher, tasks.clone());
        let store = LocalMediaStore::new(&config.media_dir, &config.media_base_url);
        let media = MediaService::new(repo.clone(), Arc::new(store), config.max_upload_bytes);
        let limiter = RateLimiter::new(config.accept_rate_limit, config.rate_limit_window);
        let upload_limiter = RateLimiter::new(config.upload_rate_limit, config.rate_limit_window);

        Self {
            repo,
            config: Arc::new(config),
            coordinator,
            matcher,
            media,
            limiter,
            upload_limiter,
            geocoder,
            tasks,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    tracing::info!("Starting Rescue Coordination Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (RESCUE_API_PSK). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    let bind_addr = config.bind_addr;
    let state = AppState::new(config, repo)?;
    let sweepers = [
        state.limiter.spawn_sweeper(),
        state.upload_limiter.spawn_sweeper(),
    ];
    let tasks = state.tasks.clone();

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for sweeper in sweepers {
        sweeper.abort();
    }
    tracing::info!(in_flight = tasks.in_flight(), "Waiting for background tasks");
    tasks.drain().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    let accept_limit =
        middleware::from_fn_with_state(state.limiter.clone(), ratelimit::rate_limit_layer);
    let upload_limit =
        middleware::from_fn_with_state(state.upload_limiter.clone(), ratelimit::rate_limit_layer);
    let upload_body_limit =
        DefaultBodyLimit::max(state.config.max_upload_bytes * api::MAX_FILES_PER_UPLOAD + 64 * 1024);
    let media_files = ServeDir::new(&state.config.media_dir);

    // API routes
    let api_routes = Router::new()
        // Users
        .route("/users", post(api::create_user))
        .route("/users/{id}", get(api::get_user).put(api::update_user))
        .route("/users/{id}/stats", get(api::user_stats))
        .route("/users/{id}/location", put(api::update_location))
        .route("/users/{id}/availability", put(api::update_availability))
        .route(
            "/users/{id}/preferences",
            get(api::get_preferences).put(api::update_preferences),
        )
        .route("/users/{id}/cases/reported", get(api::reported_cases))
        .route("/users/{id}/cases/accepted", get(api::accepted_cases))
        .route("/users/{id}/push-tokens", post(api::register_push_token))
        .route(
            "/users/{id}/push-tokens/{token}",
            delete(api::delete_push_token),
        )
        // Cases
        .route("/cases", post(api::create_case).get(api::list_cases))
        .route("/cases/nearby", get(api::nearby_cases))
        .route(
            "/cases/{id}",
            get(api::get_case)
                .put(api::update_case)
                .delete(api::delete_case),
        )
        // Volunteers
        .route(
            "/cases/{id}/accept",
            post(api::accept_case).layer(accept_limit),
        )
        .route("/cases/{id}/withdraw", post(api::withdraw))
        .route(
            "/cases/{id}/volunteer-status",
            put(api::update_volunteer_status),
        )
        .route("/cases/{id}/volunteers", get(api::list_volunteers))
        // Timeline
        .route(
            "/cases/{id}/updates",
            get(api::list_updates).post(api::post_update),
        )
        .route(
            "/cases/{id}/comments",
            get(api::list_comments).post(api::create_comment),
        )
        .route("/comments/{id}", delete(api::delete_comment))
        // Media
        .route(
            "/cases/{id}/media",
            get(api::list_media).merge(
                post(api::upload_media)
                    .layer::<_, std::convert::Infallible>(upload_limit)
                    .layer(upload_body_limit),
            ),
        )
        .route("/media/{id}", delete(api::delete_media))
        // Notifications
        .route("/notifications", get(api::list_notifications))
        .route("/notifications/read", post(api::mark_notifications_read))
        .route(
            "/notifications/{id}/read",
            post(api::mark_notification_read),
        )
        // Geocoding
        .route("/geocode/reverse", get(api::reverse_geocode))
        .route("/geocode/search", get(api::search_address))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        // Uploaded media is served without the PSK
        .nest_service("/media", media_files)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
