pub mod health;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::pagination::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Live preview
        .route(
            "/api/v1/preview/sessions",
            post(handlers::handle_create_session),
        )
        .route(
            "/api/v1/preview/sessions/:id",
            get(handlers::handle_get_session).delete(handlers::handle_delete_session),
        )
        .route(
            "/api/v1/preview/sessions/:id/snapshot",
            get(handlers::handle_wait_snapshot),
        )
        .route(
            "/api/v1/preview/sessions/:id/document",
            put(handlers::handle_replace_document),
        )
        .route(
            "/api/v1/preview/sessions/:id/recompute",
            post(handlers::handle_request_recompute),
        )
        .route(
            "/api/v1/preview/sessions/:id/spacing",
            post(handlers::handle_adjust_spacing).delete(handlers::handle_reset_spacing),
        )
        .route(
            "/api/v1/preview/sessions/:id/spacing/:section_id",
            delete(handlers::handle_reset_section_spacing),
        )
        .route(
            "/api/v1/preview/sessions/:id/indicators",
            put(handlers::handle_toggle_indicators),
        )
        .route(
            "/api/v1/preview/sessions/:id/pages/:n",
            get(handlers::handle_go_to_page),
        )
        // Export
        .route(
            "/api/v1/export/partition",
            post(handlers::handle_export_partition),
        )
        .with_state(state)
}
