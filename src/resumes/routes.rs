// src/resumes/routes.rs

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use super::validators::MAX_FILE_SIZE;
use super::{callbacks, handlers};

/// Create the resumes router
pub fn resumes_routes() -> Router {
    Router::new()
        // Upload and listing
        .route(
            "/api/resumes/upload",
            post(handlers::upload_resume).layer(DefaultBodyLimit::max(MAX_FILE_SIZE + 1024)),
        )
        .route("/api/resumes", get(handlers::get_user_resumes))
        // Status polling read + deletion
        .route(
            "/api/resumes/:id",
            get(handlers::get_resume).delete(handlers::delete_resume),
        )
        .route("/api/resumes/:id/reanalyze", post(handlers::reanalyze_resume))
        // ML callback (authenticated by shared callback token, not user JWT)
        .route("/api/resumes/:id/analysis", post(callbacks::analysis_callback))
        // Synchronous ML passthroughs
        .route("/api/resumes/:id/keyword-scan", post(handlers::keyword_scan))
        .route(
            "/api/resumes/:id/interview-questions",
            get(handlers::interview_questions),
        )
}
