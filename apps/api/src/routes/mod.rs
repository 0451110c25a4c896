pub mod evaluations;
pub mod health;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::chat::handlers as chat_handlers;
use crate::sessions::handlers as session_handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Evaluation pipeline
        .route(
            "/api/v1/evaluations",
            post(evaluations::create_evaluation),
        )
        // Session management
        .route("/api/v1/sessions", get(session_handlers::list_sessions))
        .route(
            "/api/v1/sessions/search",
            get(session_handlers::search_sessions),
        )
        .route(
            "/api/v1/sessions/:session_id",
            get(session_handlers::get_session).delete(session_handlers::delete_session),
        )
        .route(
            "/api/v1/sessions/:session_id/title",
            patch(session_handlers::rename_session),
        )
        .route(
            "/api/v1/sessions/:session_id/analytics",
            get(session_handlers::session_analytics),
        )
        .route(
            "/api/v1/sessions/:session_id/export",
            get(session_handlers::export_session),
        )
        // Session chat
        .route(
            "/api/v1/sessions/:session_id/chat",
            get(chat_handlers::history)
                .post(chat_handlers::ask)
                .delete(chat_handlers::clear),
        )
        // Store-wide stats
        .route("/api/v1/stats", get(session_handlers::database_stats))
        .with_state(state)
}
