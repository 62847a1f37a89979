// src/common/migrations.rs
//! Database migration and schema management

use sqlx::SqlitePool;
use std::env;
use tracing::{info, warn};

/// Run all database migrations
///
/// Tables are created idempotently; set RESET_DB=true to drop and recreate
/// the schema from scratch (development only).
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let should_reset_db = env::var("RESET_DB").unwrap_or_else(|_| "false".to_string()) == "true";

    if should_reset_db {
        warn!("RESET_DB=true - Dropping all tables and recreating schema...");
        drop_all_tables(pool).await?;
    }

    create_user_tables(pool).await?;
    create_resume_tables(pool).await?;
    create_job_tables(pool).await?;
    create_outbox_tables(pool).await?;
    create_indexes(pool).await?;

    info!("Database migration completed");

    Ok(())
}

async fn drop_all_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let tables = [
        "ml_outbox",
        "jd_matches",
        "job_descriptions",
        "analyses",
        "resumes",
        "users",
    ];
    for table in tables {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(pool)
            .await?;
    }
    Ok(())
}

async fn create_user_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT,
            avatar TEXT,
            provider TEXT,
            provider_id TEXT,
            created_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_resume_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resumes (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            original_name TEXT NOT NULL,
            storage_key TEXT NOT NULL,
            file_type TEXT NOT NULL CHECK (file_type IN ('pdf', 'docx')),
            file_size INTEGER,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'processing', 'done', 'error')),
            error_message TEXT,
            analysis_attempt INTEGER NOT NULL DEFAULT 0,
            uploaded_at TEXT,
            FOREIGN KEY (user_id) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analyses (
            id TEXT PRIMARY KEY,
            resume_id TEXT NOT NULL,
            attempt INTEGER NOT NULL DEFAULT 0,
            ats_score REAL,
            quality_score REAL,
            strength TEXT,
            extracted_skills TEXT,
            grammar_issues TEXT,
            keyword_matches TEXT,
            raw_result TEXT,
            role_prediction TEXT,
            anomalies TEXT,
            created_at TEXT,
            FOREIGN KEY (resume_id) REFERENCES resumes (id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_job_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_descriptions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            company TEXT,
            content TEXT NOT NULL,
            created_at TEXT,
            FOREIGN KEY (user_id) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One match row per (resume, job) pair; repeat match runs upsert in place
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jd_matches (
            id TEXT PRIMARY KEY,
            resume_id TEXT NOT NULL,
            jd_id TEXT NOT NULL,
            similarity_score REAL,
            hiring_probability REAL,
            matched_keywords TEXT,
            skill_gaps TEXT,
            rank INTEGER,
            created_at TEXT,
            UNIQUE (resume_id, jd_id),
            FOREIGN KEY (resume_id) REFERENCES resumes (id) ON DELETE CASCADE,
            FOREIGN KEY (jd_id) REFERENCES job_descriptions (id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_outbox_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ml_outbox (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL CHECK (kind IN ('analyze', 'match')),
            resume_id TEXT,
            job_id TEXT,
            endpoint TEXT NOT NULL,
            payload TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            next_attempt_at TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'queued'
                CHECK (status IN ('queued', 'sent', 'failed')),
            last_error TEXT,
            created_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_indexes(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_resumes_user ON resumes (user_id)",
        "CREATE INDEX IF NOT EXISTS idx_resumes_status ON resumes (status)",
        "CREATE INDEX IF NOT EXISTS idx_analyses_resume ON analyses (resume_id, created_at)",
        "CREATE INDEX IF NOT EXISTS idx_jobs_user ON job_descriptions (user_id)",
        "CREATE INDEX IF NOT EXISTS idx_matches_jd ON jd_matches (jd_id)",
        "CREATE INDEX IF NOT EXISTS idx_outbox_due ON ml_outbox (status, next_attempt_at)",
    ];

    for index in indexes {
        sqlx::query(index).execute(pool).await?;
    }

    Ok(())
}
