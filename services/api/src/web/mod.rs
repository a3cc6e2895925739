pub mod devices;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

#[cfg(test)]
pub(crate) mod test_support;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

// Re-export the handlers to make them easily accessible
// to the binary that will build the web server router.
pub use middleware::require_user;
pub use rest::{chat_handler, list_messages_handler, list_sessions_handler};
pub use state::AppState;
pub use ws_handler::ws_handler;

/// Builds the API router. Every route requires a user id.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/sessions", get(list_sessions_handler))
        .route("/sessions/{session_id}/messages", get(list_messages_handler))
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn(require_user))
        .with_state(app_state)
}
