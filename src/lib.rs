//! HTTP relay that streams LLaVA image descriptions.
//!
//! `POST /describe` takes `{"image": "<base64>"}`, forwards it to a llama.cpp
//! `/completion` endpoint with streaming on, and sends the generated text
//! back as a `text/plain` stream while it is being produced.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod frames;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod relay;
pub mod state;

use state::AppState;

// creating the router with routes
pub fn app(state: Arc<AppState>) -> Router {
    metrics::init();

    Router::new()
        .route("/", get(handlers::index_handler))
        .route(
            "/describe",
            post(handlers::describe_handler).layer(DefaultBodyLimit::max(state.max_body_bytes)),
        )
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
