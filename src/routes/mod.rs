pub mod health;
pub mod webhook;

use axum::extract::DefaultBodyLimit;
use axum::Router;

use crate::middleware::request_id;
use crate::state::AppState;

/// Maximum request body size: 64 KiB — chat updates are small.
const MAX_BODY_SIZE: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/webhook", webhook::router())
        .nest("/health", health::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}
