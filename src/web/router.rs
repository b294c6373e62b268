//! Router configuration.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::Config;

use super::handlers::{
    delete_all_messages, delete_message, disable_chaos, events, get_chaos, get_message,
    get_message_part, get_raw_message, list_messages, list_outgoing_servers, release_message,
    update_chaos, AppState,
};
use super::middleware::create_cors_layer;
use super::ui::create_ui_router;

/// Create the API router, mounted at `<web_path>/api`.
pub fn create_api_router(app_state: Arc<AppState>, web_path: &str) -> Router {
    let api_routes = Router::new()
        .route("/messages", get(list_messages).delete(delete_all_messages))
        .route("/messages/:id", get(get_message).delete(delete_message))
        .route("/messages/:id/raw", get(get_raw_message))
        .route("/messages/:id/parts/:index", get(get_message_part))
        .route("/messages/:id/release", post(release_message))
        .route("/outgoing-smtp", get(list_outgoing_servers))
        .route(
            "/chaos",
            get(get_chaos).put(update_chaos).delete(disable_chaos),
        )
        .route("/events", get(events));

    Router::new()
        .nest(&format!("{}/api", web_path), api_routes)
        .with_state(app_state)
}

/// Create the complete application: API, UI and health check.
pub fn create_router(app_state: Arc<AppState>, config: &Config) -> Router {
    let web_path = config.web_path();

    create_api_router(app_state, &web_path)
        .merge(create_ui_router(&web_path, config.web.static_path.as_deref()))
        .merge(create_health_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(&config.web.cors_origins)),
        )
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}
