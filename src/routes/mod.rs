use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{events, health_check, sync, tickets, validations};
use crate::state::AppState;

pub fn create_routes(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/tickets/:code", get(tickets::get_ticket))
        .route("/api/tickets/:code/cancel", post(tickets::cancel_ticket))
        .route("/api/validations", post(validations::create_validation))
        .route("/api/events/:event_id/prefetch", post(events::prefetch_event))
        .route(
            "/api/events/:event_id/attendance",
            get(events::event_attendance),
        )
        .route("/api/sync/status", get(sync::sync_status))
        .route("/api/sync", post(sync::run_sync))
        .route("/api/sync/entries/:id", get(sync::sync_entry))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(config.production))
        .layer(create_cors_layer(&config.cors_allowed_origins))
}
