// src/jobs/callbacks.rs
//! Receiver for asynchronous ML match results.
//!
//! Rows upsert on (resume_id, jd_id), so a re-delivered callback refreshes
//! the same rows instead of duplicating them. An upstream error is logged and
//! acknowledged; the previous match set (already cleared by the trigger
//! endpoint) simply stays empty.

use axum::{
    extract::{Extension, Path},
    http::HeaderMap,
    response::Json,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::models::MatchCallback;
use crate::common::{generate_match_id, ApiError, AppState};
use crate::resumes::callbacks::verify_callback_token;

/// POST /api/jobs/:id/match-result - ML match result callback
pub async fn match_result_callback(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<MatchCallback>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await;

    verify_callback_token(&headers, state.ml.callback_token())?;

    let saved = apply_match_callback(&state.db, &id, &payload).await?;

    match saved {
        Some(count) => Ok(Json(json!({ "ok": true, "saved": count }))),
        None => Ok(Json(json!({ "ok": true }))),
    }
}

/// Persist a match callback for `job_id`; returns the number of rows saved,
/// or None when the delivery carried no results (upstream error or empty set).
///
/// A callback referencing an unknown job is a 404 (the job may have been
/// deleted after the trigger fired). A record referencing a resume deleted
/// mid-flight is skipped with a warning; the rest of the batch still persists.
pub async fn apply_match_callback(
    pool: &sqlx::SqlitePool,
    job_id: &str,
    payload: &MatchCallback,
) -> Result<Option<usize>, ApiError> {
    let exists: Option<(String,)> =
        sqlx::query_as("SELECT id FROM job_descriptions WHERE id = ?")
            .bind(job_id)
            .fetch_optional(pool)
            .await
            .map_err(ApiError::DatabaseError)?;

    if exists.is_none() {
        return Err(ApiError::NotFound("Job description not found".to_string()));
    }

    if let Some(error_message) = &payload.error {
        error!(job_id = %job_id, error = %error_message, "Match run failed upstream");
        return Ok(None);
    }

    if payload.matches.is_empty() {
        info!(job_id = %job_id, "Match callback carried no results");
        return Ok(None);
    }

    let now = chrono::Utc::now().to_rfc3339();
    let mut saved = 0usize;
    for record in &payload.matches {
        let resume_exists: Option<(String,)> =
            sqlx::query_as("SELECT id FROM resumes WHERE id = ?")
                .bind(&record.resume_id)
                .fetch_optional(pool)
                .await
                .map_err(ApiError::DatabaseError)?;

        if resume_exists.is_none() {
            warn!(
                job_id = %job_id,
                resume_id = %record.resume_id,
                "Match record references a deleted resume, skipping"
            );
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO jd_matches
                (id, resume_id, jd_id, similarity_score, hiring_probability,
                 matched_keywords, skill_gaps, rank, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (resume_id, jd_id) DO UPDATE SET
                similarity_score = excluded.similarity_score,
                hiring_probability = excluded.hiring_probability,
                matched_keywords = excluded.matched_keywords,
                skill_gaps = excluded.skill_gaps,
                rank = excluded.rank,
                created_at = excluded.created_at
            "#,
        )
        .bind(generate_match_id())
        .bind(&record.resume_id)
        .bind(job_id)
        .bind(record.similarity_score)
        .bind(record.hiring_probability)
        .bind(to_json_text(&record.matched_keywords))
        .bind(to_json_text(&record.skill_gaps))
        .bind(record.rank)
        .bind(&now)
        .execute(pool)
        .await
        .map_err(ApiError::DatabaseError)?;
        saved += 1;
    }

    info!(job_id = %job_id, saved = saved, "Match results persisted");

    Ok(Some(saved))
}

fn to_json_text(list: &[String]) -> String {
    serde_json::to_string(list).unwrap_or_else(|_| "[]".to_string())
}
