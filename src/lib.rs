pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use services::metafields::AdminApiStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub http: reqwest::Client,
    pub bars: Arc<AdminApiStore>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        let http = reqwest::Client::new();
        let bars = Arc::new(AdminApiStore::new(
            http.clone(),
            db.clone(),
            config.api_version.clone(),
        ));
        Self {
            db,
            config: Arc::new(config),
            http,
            bars,
        }
    }
}

/// The embedded admin is served from the platform admin and the shop's own
/// domain; local development origins are always allowed.
fn cors(app_url: String) -> CorsLayer {
    let origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let Ok(o) = origin.to_str() else {
            return false;
        };
        o.starts_with("http://localhost")
            || o.starts_with("http://127.0.0.1")
            || o == app_url
            || o == "https://admin.shopify.com"
            || (o.starts_with("https://") && o.ends_with(".myshopify.com"))
    });

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(origin)
}

pub fn router(state: AppState) -> Router {
    let cors = cors(state.config.app_url.clone());

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        // Announcement bars
        .route("/bars", get(routes::bars::list_bars).post(routes::bars::save_all))
        .route("/bars/draft", get(routes::bars::new_draft))
        .route("/bars/items", put(routes::bars::upsert_bar))
        .route("/bars/items/{id}", delete(routes::bars::delete_bar))
        .route("/bars/items/{index}/move", post(routes::bars::move_bar))
        // Platform webhooks
        .route("/webhooks", post(routes::webhooks::receive))
        .route("/webhooks/app/uninstalled", post(routes::webhooks::app_uninstalled))
        .route("/webhooks/app/scopes_update", post(routes::webhooks::app_scopes_update))
        .route(
            "/webhooks/customers/data_request",
            post(routes::webhooks::customers_data_request),
        )
        .route("/webhooks/customers/redact", post(routes::webhooks::customers_redact))
        .route("/webhooks/shop/redact", post(routes::webhooks::shop_redact))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .with_state(state)
}
