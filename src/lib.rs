//! Request-forwarding gateway that enforces a global and a per-client
//! hourly quota before calling a hosted text generation API.

pub mod config;
pub mod cors;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod state;
pub mod store;
pub mod upstream;
pub mod validate;
pub mod window;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;

use crate::handlers::{
    generate_handler, health_handler, method_not_allowed, metrics_handler, preflight_handler,
    quota_handler,
};
use crate::state::AppState;

// creating the router with routes
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route(
            "/api/generate",
            post(generate_handler)
                .options(preflight_handler)
                .fallback(method_not_allowed),
        )
        .route("/api/quota", get(quota_handler).options(preflight_handler))
        .layer(middleware::from_fn(cors::cors_headers));

    Router::new()
        .merge(api)
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
