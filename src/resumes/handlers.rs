// src/resumes/handlers.rs

use axum::{
    extract::{Extension, Multipart, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::models::{
    Analysis, KeywordScanRequest, Resume, ResumeListParams, ResumeListRow, UploadedFile,
};
use super::validators::{KeywordScanValidator, UploadValidator};
use crate::auth::AuthedUser;
use crate::common::{
    generate_resume_id, parse_json_string_list, ApiError, AppState, Validator,
};
use crate::services::outbox;

const DOWNLOAD_URL_TTL_SECS: u64 = 3600;

/// POST /api/resumes/upload - Upload a resume and queue its analysis
///
/// The stored row starts `pending` with no analysis; the ML trigger goes
/// through the outbox so this request never waits on (or fails because of)
/// the ML service.
pub async fn upload_resume(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let state = state_lock.read().await;

    info!(user_id = %authed.id, "User uploading resume");

    // Extract file from multipart
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart payload".to_string()))?
    {
        if field.name() == Some("resume") {
            let filename = field.file_name().unwrap_or("resume.pdf").to_string();

            let data = field
                .bytes()
                .await
                .map_err(|_| ApiError::BadRequest("Invalid file".to_string()))?;

            let file = UploadedFile {
                filename,
                data: data.to_vec(),
            };

            let validation = UploadValidator.validate(&file);
            if !validation.is_valid {
                return Err(validation.into());
            }

            // Extension is present, the validator checked it
            let ext = file.extension().unwrap_or_else(|| "pdf".to_string());
            let file_type = if ext == "pdf" { "pdf" } else { "docx" };
            let content_type = if file_type == "pdf" {
                "application/pdf"
            } else {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            };

            let resume_id = generate_resume_id();
            let storage_key = format!("resumes/{}/{}.{}", authed.id, resume_id, ext);
            let file_size = file.data.len() as i64;

            // 1. Store the blob
            state
                .storage
                .upload(file.data, &storage_key, content_type)
                .await
                .map_err(|e| {
                    error!(error = %e, key = %storage_key, "Failed to store resume blob");
                    ApiError::InternalServer("Failed to save resume".to_string())
                })?;

            // 2. Insert resume row (status=pending, first analysis attempt)
            let now = chrono::Utc::now().to_rfc3339();
            sqlx::query(
                r#"
                INSERT INTO resumes
                    (id, user_id, original_name, storage_key, file_type, file_size, status, analysis_attempt, uploaded_at)
                VALUES (?, ?, ?, ?, ?, ?, 'pending', 1, ?)
                "#,
            )
            .bind(&resume_id)
            .bind(&authed.id)
            .bind(&file.filename)
            .bind(&storage_key)
            .bind(file_type)
            .bind(file_size)
            .bind(&now)
            .execute(&state.db)
            .await
            .map_err(ApiError::DatabaseError)?;

            // 3. Queue the ML analysis trigger (non-blocking)
            let trigger = state
                .ml
                .build_analyze_trigger(&resume_id, &storage_key, file_type, 1);
            outbox::enqueue_analyze(&state.db, &resume_id, &trigger)
                .await
                .map_err(ApiError::DatabaseError)?;

            info!(user_id = %authed.id, resume_id = %resume_id, "Resume uploaded, analysis queued");

            return Ok((
                StatusCode::CREATED,
                Json(json!({
                    "message": "Resume uploaded successfully. Analysis is in progress.",
                    "resume": {
                        "id": resume_id,
                        "original_name": file.filename,
                        "file_type": file_type,
                        "status": "pending",
                    }
                })),
            ));
        }
    }

    Err(ApiError::BadRequest("No resume file provided".to_string()))
}

/// GET /api/resumes - List the current user's resumes with latest analysis
pub async fn get_user_resumes(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Query(params): Query<ResumeListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await;

    // Whitelisted sort columns only; anything else falls back to upload date
    let order_by = match params.sort.as_deref() {
        Some("ats") => "a.ats_score DESC NULLS LAST",
        Some("quality") => "a.quality_score DESC NULLS LAST",
        _ => "r.uploaded_at DESC",
    };

    let status_filter = params
        .status
        .as_deref()
        .filter(|s| super::models::RESUME_STATUSES.contains(s));

    let sql = format!(
        r#"
        SELECT r.id, r.original_name, r.file_type, r.file_size, r.status,
               r.error_message, r.uploaded_at,
               a.ats_score, a.quality_score, a.strength, a.extracted_skills, a.role_prediction
        FROM resumes r
        LEFT JOIN analyses a ON a.id = (
            SELECT id FROM analyses WHERE resume_id = r.id
            ORDER BY created_at DESC LIMIT 1
        )
        WHERE r.user_id = ? {}
        ORDER BY {}
        "#,
        if status_filter.is_some() {
            "AND r.status = ?"
        } else {
            ""
        },
        order_by
    );

    let mut query = sqlx::query_as::<_, ResumeListRow>(&sql).bind(&authed.id);
    if let Some(status) = status_filter {
        query = query.bind(status.to_string());
    }

    let rows = query
        .fetch_all(&state.db)
        .await
        .map_err(ApiError::DatabaseError)?;

    let resumes: Vec<serde_json::Value> = rows.iter().map(ResumeListRow::to_api_json).collect();

    Ok(Json(json!({ "resumes": resumes })))
}

/// GET /api/resumes/:id - Single resume + full latest analysis
///
/// This is the status-polling read: clients poll it until `status` turns
/// `done` or `error`.
pub async fn get_resume(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await;

    let resume = fetch_owned_resume(&state, &id, &authed.id).await?;
    let analysis = latest_analysis(&state.db, &id).await?;

    // Time-limited download link; absence is not an error
    let download_url = match state
        .storage
        .presigned_download_url(&resume.storage_key, DOWNLOAD_URL_TTL_SECS)
        .await
    {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(error = %e, resume_id = %id, "Failed to presign download URL");
            None
        }
    };

    let mut resume_json = serde_json::to_value(&resume).unwrap_or_default();
    if let Some(obj) = resume_json.as_object_mut() {
        obj.insert("download_url".to_string(), json!(download_url));
    }

    Ok(Json(json!({
        "resume": resume_json,
        "analysis": analysis.map(|a| a.to_api_json()),
    })))
}

/// DELETE /api/resumes/:id - Delete a resume and its stored blob
pub async fn delete_resume(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await;

    let resume = fetch_owned_resume(&state, &id, &authed.id).await?;

    state.storage.delete(&resume.storage_key).await.map_err(|e| {
        error!(error = %e, key = %resume.storage_key, "Failed to delete resume blob");
        ApiError::InternalServer("Failed to delete resume file".to_string())
    })?;

    // Analyses and matches cascade
    sqlx::query("DELETE FROM resumes WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await
        .map_err(ApiError::DatabaseError)?;

    info!(user_id = %authed.id, resume_id = %id, "Resume deleted");

    Ok(Json(json!({ "message": "Resume deleted" })))
}

/// POST /api/resumes/:id/reanalyze - Queue a fresh analysis run
///
/// Bumps the attempt counter, so a late callback from a previous run is
/// rejected as stale.
pub async fn reanalyze_resume(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await;

    let resume = fetch_owned_resume(&state, &id, &authed.id).await?;
    let attempt = resume.analysis_attempt + 1;

    sqlx::query(
        r#"
        UPDATE resumes
        SET status = 'pending', error_message = NULL, analysis_attempt = ?
        WHERE id = ?
        "#,
    )
    .bind(attempt)
    .bind(&id)
    .execute(&state.db)
    .await
    .map_err(ApiError::DatabaseError)?;

    let trigger =
        state
            .ml
            .build_analyze_trigger(&id, &resume.storage_key, &resume.file_type, attempt);
    outbox::enqueue_analyze(&state.db, &id, &trigger)
        .await
        .map_err(ApiError::DatabaseError)?;

    info!(resume_id = %id, attempt = attempt, "Re-analysis queued");

    Ok(Json(json!({
        "message": "Re-analysis queued. Results will appear shortly.",
        "status": "pending",
        "attempt": attempt,
    })))
}

/// POST /api/resumes/:id/keyword-scan - Synchronous ML passthrough
pub async fn keyword_scan(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Path(id): Path<String>,
    Json(payload): Json<KeywordScanRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await;

    let validation = KeywordScanValidator.validate(&payload);
    if !validation.is_valid {
        return Err(validation.into());
    }

    fetch_owned_resume(&state, &id, &authed.id).await?;

    let analysis = latest_analysis(&state.db, &id).await?.ok_or_else(|| {
        ApiError::NotFound("Analysis not found. Upload and analyze the resume first.".to_string())
    })?;

    // The stored raw extraction payload carries the resume text
    let text = analysis
        .raw_result
        .as_deref()
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
        .and_then(|v| {
            v.get("text")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_default();

    if text.is_empty() {
        return Err(ApiError::UnprocessableEntity(
            "No extracted text found for this resume.".to_string(),
        ));
    }

    let result = state
        .ml
        .keyword_scan(&text, &payload.keywords)
        .await
        .map_err(|e| {
            error!(error = %e, resume_id = %id, "Keyword scan failed");
            ApiError::UpstreamError("ML service error".to_string())
        })?;

    Ok(Json(result))
}

/// GET /api/resumes/:id/interview-questions - Synchronous ML passthrough
pub async fn interview_questions(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await;

    fetch_owned_resume(&state, &id, &authed.id).await?;

    let analysis = latest_analysis(&state.db, &id).await?.ok_or_else(|| {
        ApiError::NotFound("Analysis not found. Upload and analyze the resume first.".to_string())
    })?;

    let skills = parse_json_string_list(analysis.extracted_skills.as_deref());
    let role = analysis
        .role_prediction
        .as_deref()
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
        .and_then(|v| {
            v.get("role")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_default();

    let result = state
        .ml
        .interview_questions(&skills, &role)
        .await
        .map_err(|e| {
            error!(error = %e, resume_id = %id, "Interview question generation failed");
            ApiError::UpstreamError("ML service error".to_string())
        })?;

    Ok(Json(result))
}

// ============================================================================
// Shared lookups
// ============================================================================

async fn fetch_owned_resume(
    state: &AppState,
    resume_id: &str,
    user_id: &str,
) -> Result<Resume, ApiError> {
    let resume = sqlx::query_as::<_, Resume>(
        "SELECT * FROM resumes WHERE id = ? AND user_id = ?",
    )
    .bind(resume_id)
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::DatabaseError)?;

    resume.ok_or_else(|| ApiError::NotFound("Resume not found".to_string()))
}

pub(crate) async fn latest_analysis(
    pool: &sqlx::SqlitePool,
    resume_id: &str,
) -> Result<Option<Analysis>, ApiError> {
    sqlx::query_as::<_, Analysis>(
        "SELECT * FROM analyses WHERE resume_id = ? ORDER BY created_at DESC LIMIT 1",
    )
    .bind(resume_id)
    .fetch_optional(pool)
    .await
    .map_err(ApiError::DatabaseError)
}
