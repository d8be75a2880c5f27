pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::RenderOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RenderOrchestrator>,
}

pub fn build_router(state: AppState, max_request_bytes: usize) -> Router {
    Router::new()
        .route("/render", post(handlers::render_multipart))
        .route("/render-base64", post(handlers::render_base64))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}
