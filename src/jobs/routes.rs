// src/jobs/routes.rs

use axum::{
    routing::{get, post},
    Router,
};

use super::{callbacks, handlers};

/// Create the jobs router
pub fn jobs_routes() -> Router {
    Router::new()
        .route(
            "/api/jobs",
            post(handlers::create_job).get(handlers::get_user_jobs),
        )
        .route(
            "/api/jobs/:id",
            get(handlers::get_job).delete(handlers::delete_job),
        )
        .route("/api/jobs/:id/match", post(handlers::match_job))
        // ML callback (authenticated by shared callback token, not user JWT)
        .route(
            "/api/jobs/:id/match-result",
            post(callbacks::match_result_callback),
        )
}
