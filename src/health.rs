// src/health.rs
//! Liveness endpoint for load balancers and container orchestration.

use axum::{extract::Extension, response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::common::AppState;

/// GET /api/health - API liveness plus a database reachability probe.
///
/// Always answers 200; a broken database shows up as `services.database`
/// = "error" rather than a failed request.
pub async fn health_check(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
) -> Json<serde_json::Value> {
    let state = state_lock.read().await;

    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "ok",
        Err(e) => {
            warn!(error = %e, "Health check: database probe failed");
            "error"
        }
    };

    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "services": {
            "api": "ok",
            "database": database,
        },
    }))
}

/// Create the health router
pub fn health_routes() -> Router {
    Router::new().route("/api/health", get(health_check))
}
