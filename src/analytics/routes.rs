// src/analytics/routes.rs

use axum::{routing::get, Router};

use super::handlers;

/// Create the analytics router
pub fn analytics_routes() -> Router {
    Router::new().route("/api/analytics/summary", get(handlers::analytics_summary))
}
