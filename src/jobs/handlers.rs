// src/jobs/handlers.rs

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::models::{CreateJobRequest, JobDescription, JobListRow, MatchRow};
use super::validators::CreateJobValidator;
use crate::auth::AuthedUser;
use crate::common::{generate_job_id, ApiError, AppState, Validator};
use crate::services::ml::MatchCandidateRow;
use crate::services::outbox;

/// POST /api/jobs - Create a job description
pub async fn create_job(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Json(payload): Json<CreateJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let state = state_lock.read().await;

    let validation = CreateJobValidator.validate(&payload);
    if !validation.is_valid {
        return Err(validation.into());
    }

    let job_id = generate_job_id();
    let now = chrono::Utc::now().to_rfc3339();

    let job = JobDescription {
        id: job_id.clone(),
        user_id: authed.id.clone(),
        title: payload.title.trim().to_string(),
        company: payload
            .company
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string),
        content: payload.content.trim().to_string(),
        created_at: Some(now.clone()),
    };

    sqlx::query(
        r#"
        INSERT INTO job_descriptions (id, user_id, title, company, content, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&job.id)
    .bind(&job.user_id)
    .bind(&job.title)
    .bind(&job.company)
    .bind(&job.content)
    .bind(&now)
    .execute(&state.db)
    .await
    .map_err(ApiError::DatabaseError)?;

    info!(user_id = %authed.id, job_id = %job_id, "Job description created");

    Ok((StatusCode::CREATED, Json(json!({ "job": job }))))
}

/// GET /api/jobs - List the current user's job descriptions with match counts
pub async fn get_user_jobs(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await;

    let jobs = sqlx::query_as::<_, JobListRow>(
        r#"
        SELECT jd.id, jd.title, jd.company, jd.content, jd.created_at,
               COUNT(jm.id) AS match_count,
               MAX(jm.created_at) AS last_matched_at
        FROM job_descriptions jd
        LEFT JOIN jd_matches jm ON jm.jd_id = jd.id
        WHERE jd.user_id = ?
        GROUP BY jd.id
        ORDER BY jd.created_at DESC
        "#,
    )
    .bind(&authed.id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::DatabaseError)?;

    Ok(Json(json!({ "jobs": jobs })))
}

/// GET /api/jobs/:id - Job description plus its ranked match results
pub async fn get_job(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await;

    let job = fetch_owned_job(&state, &id, &authed.id).await?;

    let matches = sqlx::query_as::<_, MatchRow>(
        r#"
        SELECT jm.id, jm.resume_id, jm.similarity_score, jm.hiring_probability,
               jm.matched_keywords, jm.skill_gaps, jm.rank, jm.created_at,
               r.original_name, r.file_type, r.uploaded_at,
               a.extracted_skills, a.ats_score, a.quality_score, a.strength
        FROM jd_matches jm
        JOIN resumes r ON r.id = jm.resume_id
        LEFT JOIN analyses a ON a.id = (
            SELECT id FROM analyses WHERE resume_id = jm.resume_id
            ORDER BY created_at DESC LIMIT 1
        )
        WHERE jm.jd_id = ?
        ORDER BY jm.hiring_probability DESC, jm.similarity_score DESC
        "#,
    )
    .bind(&id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::DatabaseError)?;

    let matches: Vec<serde_json::Value> = matches.iter().map(MatchRow::to_api_json).collect();

    Ok(Json(json!({ "job": job, "matches": matches })))
}

/// POST /api/jobs/:id/match - Queue a match run against all analyzed resumes
///
/// Eligible resumes are the caller's `done` resumes that have an analysis.
/// Zero eligible resumes is rejected up front; otherwise previous matches for
/// the job are cleared and a match trigger goes through the outbox.
pub async fn match_job(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await;

    let job = fetch_owned_job(&state, &id, &authed.id).await?;

    let candidates = sqlx::query_as::<_, MatchCandidateRow>(
        r#"
        SELECT r.id, r.original_name,
               a.extracted_skills, a.ats_score, a.quality_score, a.raw_result
        FROM resumes r
        JOIN analyses a ON a.id = (
            SELECT id FROM analyses WHERE resume_id = r.id
            ORDER BY created_at DESC LIMIT 1
        )
        WHERE r.user_id = ? AND r.status = 'done'
        "#,
    )
    .bind(&authed.id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::DatabaseError)?;

    if candidates.is_empty() {
        return Err(ApiError::BadRequest(
            "No analyzed resumes found. Upload and analyze resumes first.".to_string(),
        ));
    }

    // Stale rankings from the previous run would mix with the new results
    sqlx::query("DELETE FROM jd_matches WHERE jd_id = ?")
        .bind(&id)
        .execute(&state.db)
        .await
        .map_err(ApiError::DatabaseError)?;

    let trigger = state.ml.build_match_trigger(&id, &job.content, &candidates);
    outbox::enqueue_match(&state.db, &id, &trigger)
        .await
        .map_err(ApiError::DatabaseError)?;

    info!(
        job_id = %id,
        resume_count = candidates.len(),
        "Match run queued"
    );

    Ok(Json(json!({
        "message": format!(
            "Matching {} resume(s) against \"{}\". Results will appear shortly.",
            candidates.len(),
            job.title
        ),
        "resume_count": candidates.len(),
    })))
}

/// DELETE /api/jobs/:id - Delete a job description; matches cascade
pub async fn delete_job(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await;

    let result = sqlx::query("DELETE FROM job_descriptions WHERE id = ? AND user_id = ?")
        .bind(&id)
        .bind(&authed.id)
        .execute(&state.db)
        .await
        .map_err(ApiError::DatabaseError)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Job description not found".to_string()));
    }

    info!(user_id = %authed.id, job_id = %id, "Job description deleted");

    Ok(Json(json!({ "message": "Job description deleted" })))
}

// ============================================================================
// Shared lookups
// ============================================================================

async fn fetch_owned_job(
    state: &AppState,
    job_id: &str,
    user_id: &str,
) -> Result<JobDescription, ApiError> {
    let job = sqlx::query_as::<_, JobDescription>(
        "SELECT * FROM job_descriptions WHERE id = ? AND user_id = ?",
    )
    .bind(job_id)
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::DatabaseError)?;

    job.ok_or_else(|| ApiError::NotFound("Job description not found".to_string()))
}
