// src/resumes/callbacks.rs
//! Receiver for asynchronous ML analysis results.
//!
//! The ML service POSTs here when its pipeline finishes, using the callback
//! URL embedded in the trigger. Correlation state lives entirely in the
//! resumes table: the row id plus its attempt counter identify exactly one
//! trigger run, so duplicate or stale deliveries are acknowledged without
//! writing anything.

use axum::{
    extract::{Extension, Path, Query},
    http::HeaderMap,
    response::Json,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::models::{AnalysisCallback, AnalysisCallbackParams};
use crate::common::{generate_analysis_id, ApiError, AppState};

pub const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

/// What a callback delivery did
#[derive(Debug, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Result persisted; resume moved to a terminal state
    Applied,
    /// Delivery for a superseded attempt
    Stale,
    /// Resume already terminal for this attempt (duplicate delivery)
    Duplicate,
}

/// Reject callbacks that do not carry the shared secret.
///
/// The ML service echoes back the token it received in the trigger payload;
/// verification happens before any database write.
pub fn verify_callback_token(headers: &HeaderMap, expected: &str) -> Result<(), ApiError> {
    let presented = headers
        .get(CALLBACK_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(token) if token == expected => Ok(()),
        Some(_) => {
            warn!("Callback rejected: bad callback token");
            Err(ApiError::Unauthorized("invalid callback token".to_string()))
        }
        None => {
            warn!("Callback rejected: missing callback token header");
            Err(ApiError::Unauthorized("missing callback token".to_string()))
        }
    }
}

/// POST /api/resumes/:id/analysis - ML analysis result callback
pub async fn analysis_callback(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Path(id): Path<String>,
    Query(params): Query<AnalysisCallbackParams>,
    headers: HeaderMap,
    Json(payload): Json<AnalysisCallback>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await;

    verify_callback_token(&headers, state.ml.callback_token())?;

    let outcome = apply_analysis_callback(&state.db, &id, params.attempt, &payload).await?;

    match outcome {
        CallbackOutcome::Applied => Ok(Json(json!({ "ok": true }))),
        CallbackOutcome::Stale | CallbackOutcome::Duplicate => {
            info!(resume_id = %id, outcome = ?outcome, "Callback acknowledged without writes");
            Ok(Json(json!({ "ok": true, "ignored": true })))
        }
    }
}

/// Persist an analysis callback for `resume_id`.
///
/// A callback referencing an unknown resume is a 404 (the resume may have
/// been deleted after the trigger fired). A delivery whose attempt number
/// does not match the resume's current attempt, or that arrives after the
/// resume is already terminal, writes nothing.
pub async fn apply_analysis_callback(
    pool: &sqlx::SqlitePool,
    resume_id: &str,
    attempt: Option<i64>,
    payload: &AnalysisCallback,
) -> Result<CallbackOutcome, ApiError> {
    let resume: Option<(String, i64)> =
        sqlx::query_as("SELECT status, analysis_attempt FROM resumes WHERE id = ?")
            .bind(resume_id)
            .fetch_optional(pool)
            .await
            .map_err(ApiError::DatabaseError)?;

    let (status, current_attempt) = resume
        .ok_or_else(|| ApiError::NotFound("Resume not found".to_string()))?;

    if let Some(delivered_attempt) = attempt {
        if delivered_attempt != current_attempt {
            warn!(
                resume_id = %resume_id,
                delivered_attempt = delivered_attempt,
                current_attempt = current_attempt,
                "Stale analysis callback"
            );
            return Ok(CallbackOutcome::Stale);
        }
    }

    if status == "done" || status == "error" {
        warn!(resume_id = %resume_id, status = %status, "Duplicate analysis callback");
        return Ok(CallbackOutcome::Duplicate);
    }

    if let Some(error_message) = &payload.error {
        sqlx::query("UPDATE resumes SET status = 'error', error_message = ? WHERE id = ?")
            .bind(error_message)
            .bind(resume_id)
            .execute(pool)
            .await
            .map_err(ApiError::DatabaseError)?;

        info!(resume_id = %resume_id, "Analysis failed upstream, resume marked error");
        return Ok(CallbackOutcome::Applied);
    }

    // Success path: one new analysis row, then flip the resume terminal
    let analysis_id = generate_analysis_id();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO analyses
            (id, resume_id, attempt, ats_score, quality_score, strength,
             extracted_skills, grammar_issues, keyword_matches, raw_result,
             role_prediction, anomalies, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&analysis_id)
    .bind(resume_id)
    .bind(current_attempt)
    .bind(payload.ats_score)
    .bind(payload.quality_score)
    .bind(&payload.strength)
    .bind(to_json_text(&payload.extracted_skills))
    .bind(to_json_text(&payload.grammar_issues))
    .bind(payload.keyword_matches.as_ref().map(value_to_text))
    .bind(payload.raw_result.as_ref().map(value_to_text))
    .bind(payload.role_prediction.as_ref().map(value_to_text))
    .bind(to_json_text(&payload.anomalies))
    .bind(&now)
    .execute(pool)
    .await
    .map_err(ApiError::DatabaseError)?;

    sqlx::query("UPDATE resumes SET status = 'done', error_message = NULL WHERE id = ?")
        .bind(resume_id)
        .execute(pool)
        .await
        .map_err(ApiError::DatabaseError)?;

    info!(
        resume_id = %resume_id,
        analysis_id = %analysis_id,
        attempt = current_attempt,
        "Analysis result persisted, resume done"
    );

    Ok(CallbackOutcome::Applied)
}

fn to_json_text<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn value_to_text(value: &serde_json::Value) -> String {
    value.to_string()
}
