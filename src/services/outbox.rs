// src/services/outbox.rs
//! DB-backed outbox for ML trigger dispatch.
//!
//! Upload and match endpoints never talk to the ML service directly; they
//! enqueue a trigger row and return. A background task drains due rows,
//! retries transient failures with doubling backoff, and gives up after a
//! bounded number of attempts. An exhausted analyze trigger marks its resume
//! `error` so the client is never left polling a permanently pending resume.

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::common::{generate_outbox_id, AppState};
use crate::services::ml::{AnalyzeTrigger, MLService, MatchTrigger};

/// How often the dispatcher looks for due entries
const POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Dispatch attempts before an entry is marked failed
pub const MAX_ATTEMPTS: i64 = 5;
/// First retry delay; doubles per attempt (5s, 10s, 20s, 40s, 80s)
const BASE_BACKOFF_SECS: i64 = 5;

const STRANDED_MESSAGE: &str = "analysis service unreachable";

#[derive(Debug, sqlx::FromRow)]
pub struct OutboxEntry {
    pub id: String,
    pub kind: String,
    pub resume_id: Option<String>,
    pub job_id: Option<String>,
    pub endpoint: String,
    pub payload: String,
    pub attempts: i64,
}

/// Retry delay after `attempts` completed dispatch attempts
pub fn backoff_delay(attempts: i64) -> ChronoDuration {
    ChronoDuration::seconds(BASE_BACKOFF_SECS << attempts.clamp(0, 10))
}

/// Queue an analyze trigger for dispatch
pub async fn enqueue_analyze(
    pool: &SqlitePool,
    resume_id: &str,
    trigger: &AnalyzeTrigger,
) -> Result<String, sqlx::Error> {
    let payload = serde_json::to_string(trigger)
        .map_err(|e| sqlx::Error::Protocol(format!("trigger serialization failed: {}", e)))?;
    enqueue(pool, "analyze", Some(resume_id), None, "/analyze", &payload).await
}

/// Queue a match trigger for dispatch
pub async fn enqueue_match(
    pool: &SqlitePool,
    job_id: &str,
    trigger: &MatchTrigger,
) -> Result<String, sqlx::Error> {
    let payload = serde_json::to_string(trigger)
        .map_err(|e| sqlx::Error::Protocol(format!("trigger serialization failed: {}", e)))?;
    enqueue(pool, "match", None, Some(job_id), "/match", &payload).await
}

async fn enqueue(
    pool: &SqlitePool,
    kind: &str,
    resume_id: Option<&str>,
    job_id: Option<&str>,
    endpoint: &str,
    payload: &str,
) -> Result<String, sqlx::Error> {
    let id = generate_outbox_id();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO ml_outbox
            (id, kind, resume_id, job_id, endpoint, payload, attempts, next_attempt_at, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, 0, ?, 'queued', ?)
        "#,
    )
    .bind(&id)
    .bind(kind)
    .bind(resume_id)
    .bind(job_id)
    .bind(endpoint)
    .bind(payload)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    info!(outbox_id = %id, kind = %kind, "ML trigger queued");
    Ok(id)
}

/// Fetch entries that are due for a dispatch attempt
pub async fn due_entries(pool: &SqlitePool, limit: i64) -> Result<Vec<OutboxEntry>, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    sqlx::query_as::<_, OutboxEntry>(
        r#"
        SELECT id, kind, resume_id, job_id, endpoint, payload, attempts
        FROM ml_outbox
        WHERE status = 'queued' AND next_attempt_at <= ?
        ORDER BY next_attempt_at ASC
        LIMIT ?
        "#,
    )
    .bind(&now)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Mark an entry sent; an accepted analyze dispatch moves its resume from
/// `pending` to `processing`
pub async fn record_dispatch_success(
    pool: &SqlitePool,
    entry: &OutboxEntry,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE ml_outbox SET status = 'sent', attempts = attempts + 1 WHERE id = ?")
        .bind(&entry.id)
        .execute(pool)
        .await?;

    if entry.kind == "analyze" {
        if let Some(resume_id) = &entry.resume_id {
            sqlx::query(
                "UPDATE resumes SET status = 'processing' WHERE id = ? AND status = 'pending'",
            )
            .bind(resume_id)
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}

/// Reschedule a failed dispatch, or give up once attempts are exhausted.
///
/// Exhausted analyze entries flip the resume to a terminal `error` unless a
/// late callback already resolved it.
pub async fn record_dispatch_failure(
    pool: &SqlitePool,
    entry: &OutboxEntry,
    reason: &str,
) -> Result<(), sqlx::Error> {
    let attempts = entry.attempts + 1;

    if attempts >= MAX_ATTEMPTS {
        sqlx::query(
            "UPDATE ml_outbox SET status = 'failed', attempts = ?, last_error = ? WHERE id = ?",
        )
        .bind(attempts)
        .bind(reason)
        .bind(&entry.id)
        .execute(pool)
        .await?;

        if entry.kind == "analyze" {
            if let Some(resume_id) = &entry.resume_id {
                sqlx::query(
                    r#"
                    UPDATE resumes SET status = 'error', error_message = ?
                    WHERE id = ? AND status IN ('pending', 'processing')
                    "#,
                )
                .bind(STRANDED_MESSAGE)
                .bind(resume_id)
                .execute(pool)
                .await?;
            }
        }

        warn!(
            outbox_id = %entry.id,
            kind = %entry.kind,
            attempts = attempts,
            reason = %reason,
            "ML trigger dispatch exhausted"
        );
        return Ok(());
    }

    let next_attempt_at = (Utc::now() + backoff_delay(entry.attempts)).to_rfc3339();
    sqlx::query(
        r#"
        UPDATE ml_outbox
        SET attempts = ?, next_attempt_at = ?, last_error = ?
        WHERE id = ?
        "#,
    )
    .bind(attempts)
    .bind(&next_attempt_at)
    .bind(reason)
    .bind(&entry.id)
    .execute(pool)
    .await?;

    warn!(
        outbox_id = %entry.id,
        attempts = attempts,
        next_attempt_at = %next_attempt_at,
        reason = %reason,
        "ML trigger dispatch failed, rescheduled"
    );
    Ok(())
}

/// One dispatcher pass: try every due entry once
pub async fn dispatch_due(pool: &SqlitePool, ml: &MLService) -> Result<usize, sqlx::Error> {
    let entries = due_entries(pool, 10).await?;
    let count = entries.len();

    for entry in &entries {
        let payload: serde_json::Value = match serde_json::from_str(&entry.payload) {
            Ok(v) => v,
            Err(e) => {
                // Unparseable payloads can never succeed; fail them outright
                error!(outbox_id = %entry.id, error = %e, "Corrupt outbox payload");
                sqlx::query(
                    "UPDATE ml_outbox SET status = 'failed', last_error = ? WHERE id = ?",
                )
                .bind(e.to_string())
                .bind(&entry.id)
                .execute(pool)
                .await?;
                continue;
            }
        };

        match ml.dispatch_trigger(&entry.endpoint, &payload).await {
            Ok(()) => record_dispatch_success(pool, entry).await?,
            Err(e) => record_dispatch_failure(pool, entry, &e.to_string()).await?,
        }
    }

    Ok(count)
}

/// Spawn the background dispatcher loop
pub fn start_dispatcher(shared: Arc<RwLock<AppState>>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        loop {
            interval.tick().await;

            let (pool, ml) = {
                let state = shared.read().await;
                (state.db.clone(), state.ml.clone())
            };

            if let Err(e) = dispatch_due(&pool, &ml).await {
                error!(error = %e, "Outbox dispatch pass failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::migrations::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    async fn seed_resume(pool: &SqlitePool, id: &str, status: &str) {
        sqlx::query("INSERT INTO users (id, email) VALUES ('U_TEST', 'u@test.dev')")
            .execute(pool)
            .await
            .ok();
        sqlx::query(
            r#"
            INSERT INTO resumes
                (id, user_id, original_name, storage_key, file_type, status, analysis_attempt, uploaded_at)
            VALUES (?, 'U_TEST', 'cv.pdf', ?, 'pdf', ?, 1, ?)
            "#,
        )
        .bind(id)
        .bind(format!("resumes/U_TEST/{}.pdf", id))
        .bind(status)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .unwrap();
    }

    #[test]
    fn test_backoff_doubles_from_base() {
        assert_eq!(backoff_delay(0).num_seconds(), 5);
        assert_eq!(backoff_delay(1).num_seconds(), 10);
        assert_eq!(backoff_delay(2).num_seconds(), 20);
        assert_eq!(backoff_delay(4).num_seconds(), 80);
    }

    #[tokio::test]
    async fn test_enqueued_entry_is_immediately_due() {
        let pool = test_pool().await;
        seed_resume(&pool, "R_OUT1", "pending").await;

        let trigger = AnalyzeTrigger {
            resume_id: "R_OUT1".to_string(),
            s3_key: "resumes/U_TEST/R_OUT1.pdf".to_string(),
            file_type: "pdf".to_string(),
            callback_url: "http://backend/api/resumes/R_OUT1/analysis?attempt=1".to_string(),
            callback_token: "t".to_string(),
        };
        enqueue_analyze(&pool, "R_OUT1", &trigger).await.unwrap();

        let due = due_entries(&pool, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].kind, "analyze");
        assert_eq!(due[0].endpoint, "/analyze");
        assert_eq!(due[0].attempts, 0);
    }

    #[tokio::test]
    async fn test_success_marks_sent_and_resume_processing() {
        let pool = test_pool().await;
        seed_resume(&pool, "R_OUT2", "pending").await;

        let trigger = AnalyzeTrigger {
            resume_id: "R_OUT2".to_string(),
            s3_key: "k".to_string(),
            file_type: "pdf".to_string(),
            callback_url: "cb".to_string(),
            callback_token: "t".to_string(),
        };
        enqueue_analyze(&pool, "R_OUT2", &trigger).await.unwrap();
        let entry = due_entries(&pool, 1).await.unwrap().remove(0);

        record_dispatch_success(&pool, &entry).await.unwrap();

        let status: String = sqlx::query_scalar("SELECT status FROM resumes WHERE id = 'R_OUT2'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "processing");

        assert!(due_entries(&pool, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_reschedules_with_backoff() {
        let pool = test_pool().await;
        seed_resume(&pool, "R_OUT3", "pending").await;

        let entry = {
            let trigger = AnalyzeTrigger {
                resume_id: "R_OUT3".to_string(),
                s3_key: "k".to_string(),
                file_type: "pdf".to_string(),
                callback_url: "cb".to_string(),
                callback_token: "t".to_string(),
            };
            enqueue_analyze(&pool, "R_OUT3", &trigger).await.unwrap();
            due_entries(&pool, 1).await.unwrap().remove(0)
        };

        record_dispatch_failure(&pool, &entry, "connection refused")
            .await
            .unwrap();

        // Rescheduled into the future, so no longer due
        assert!(due_entries(&pool, 10).await.unwrap().is_empty());

        let (status, attempts): (String, i64) =
            sqlx::query_as("SELECT status, attempts FROM ml_outbox WHERE id = ?")
                .bind(&entry.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, "queued");
        assert_eq!(attempts, 1);

        // Resume is still pending, not stranded as error
        let resume_status: String =
            sqlx::query_scalar("SELECT status FROM resumes WHERE id = 'R_OUT3'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(resume_status, "pending");
    }

    #[tokio::test]
    async fn test_exhausted_analyze_marks_resume_error() {
        let pool = test_pool().await;
        seed_resume(&pool, "R_OUT4", "processing").await;

        let trigger = AnalyzeTrigger {
            resume_id: "R_OUT4".to_string(),
            s3_key: "k".to_string(),
            file_type: "pdf".to_string(),
            callback_url: "cb".to_string(),
            callback_token: "t".to_string(),
        };
        enqueue_analyze(&pool, "R_OUT4", &trigger).await.unwrap();
        let mut entry = due_entries(&pool, 1).await.unwrap().remove(0);
        entry.attempts = MAX_ATTEMPTS - 1;

        record_dispatch_failure(&pool, &entry, "timeout").await.unwrap();

        let outbox_status: String =
            sqlx::query_scalar("SELECT status FROM ml_outbox WHERE id = ?")
                .bind(&entry.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(outbox_status, "failed");

        let (status, message): (String, Option<String>) =
            sqlx::query_as("SELECT status, error_message FROM resumes WHERE id = 'R_OUT4'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, "error");
        assert_eq!(message.as_deref(), Some(STRANDED_MESSAGE));
    }
}
