// src/analytics/handlers.rs
//! Per-user analytics summary over analyses and match runs.
//!
//! Score history and match history aggregate in SQL; skill and role
//! frequencies fold in Rust because those columns store JSON text.

use axum::{extract::Extension, response::Json};
use serde::Serialize;
use serde_json::json;
use sqlx::FromRow;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::auth::AuthedUser;
use crate::common::{parse_json_string_list, ApiError, AppState};

const SCORE_HISTORY_DAYS: i64 = 30;
const TOP_SKILLS: usize = 12;
const TOP_ROLES: usize = 6;
const MATCH_HISTORY_LIMIT: i64 = 10;

#[derive(FromRow, Serialize, Debug)]
struct ScoreHistoryRow {
    date: Option<String>,
    avg_ats: Option<f64>,
    avg_quality: Option<f64>,
    count: i64,
}

#[derive(FromRow, Serialize, Debug)]
struct AveragesRow {
    avg_ats: Option<f64>,
    avg_quality: Option<f64>,
    total_analyzed: i64,
}

#[derive(FromRow, Serialize, Debug)]
struct MatchHistoryRow {
    title: String,
    company: Option<String>,
    candidate_count: i64,
    avg_similarity: Option<f64>,
    avg_hire_prob: Option<f64>,
    created_at: Option<String>,
}

#[derive(Serialize, Debug)]
struct FrequencyEntry {
    name: String,
    count: i64,
}

/// GET /api/analytics/summary - Aggregated analytics for the current user
pub async fn analytics_summary(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await;
    let pool = &state.db;

    let score_history = sqlx::query_as::<_, ScoreHistoryRow>(
        r#"
        SELECT DATE(a.created_at) AS date,
               ROUND(AVG(a.ats_score), 1) AS avg_ats,
               ROUND(AVG(a.quality_score), 1) AS avg_quality,
               COUNT(*) AS count
        FROM analyses a
        JOIN resumes r ON r.id = a.resume_id
        WHERE r.user_id = ?
        GROUP BY DATE(a.created_at)
        ORDER BY DATE(a.created_at) ASC
        LIMIT ?
        "#,
    )
    .bind(&authed.id)
    .bind(SCORE_HISTORY_DAYS)
    .fetch_all(pool)
    .await
    .map_err(ApiError::DatabaseError)?;

    let averages = sqlx::query_as::<_, AveragesRow>(
        r#"
        SELECT ROUND(AVG(a.ats_score), 1) AS avg_ats,
               ROUND(AVG(a.quality_score), 1) AS avg_quality,
               COUNT(*) AS total_analyzed
        FROM analyses a
        JOIN resumes r ON r.id = a.resume_id
        WHERE r.user_id = ?
        "#,
    )
    .bind(&authed.id)
    .fetch_one(pool)
    .await
    .map_err(ApiError::DatabaseError)?;

    let skill_columns: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT a.extracted_skills
        FROM analyses a
        JOIN resumes r ON r.id = a.resume_id
        WHERE r.user_id = ? AND a.extracted_skills IS NOT NULL
        "#,
    )
    .bind(&authed.id)
    .fetch_all(pool)
    .await
    .map_err(ApiError::DatabaseError)?;

    let top_skills = top_skill_frequencies(
        skill_columns.iter().map(|(raw,)| raw.as_str()),
        TOP_SKILLS,
    );

    let role_columns: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT a.role_prediction
        FROM analyses a
        JOIN resumes r ON r.id = a.resume_id
        WHERE r.user_id = ? AND a.role_prediction IS NOT NULL
        "#,
    )
    .bind(&authed.id)
    .fetch_all(pool)
    .await
    .map_err(ApiError::DatabaseError)?;

    let top_roles = top_role_frequencies(
        role_columns.iter().map(|(raw,)| raw.as_str()),
        TOP_ROLES,
    );

    let jd_match_history = sqlx::query_as::<_, MatchHistoryRow>(
        r#"
        SELECT jd.title, jd.company,
               COUNT(jm.id) AS candidate_count,
               ROUND(AVG(jm.similarity_score), 3) AS avg_similarity,
               ROUND(AVG(jm.hiring_probability), 3) AS avg_hire_prob,
               jd.created_at
        FROM job_descriptions jd
        LEFT JOIN jd_matches jm ON jm.jd_id = jd.id
        WHERE jd.user_id = ?
        GROUP BY jd.id
        ORDER BY jd.created_at DESC
        LIMIT ?
        "#,
    )
    .bind(&authed.id)
    .bind(MATCH_HISTORY_LIMIT)
    .fetch_all(pool)
    .await
    .map_err(ApiError::DatabaseError)?;

    Ok(Json(json!({
        "score_history": score_history,
        "averages": averages,
        "top_skills": top_skills
            .iter()
            .map(|e| json!({ "skill": e.name, "count": e.count }))
            .collect::<Vec<_>>(),
        "top_roles": top_roles
            .iter()
            .map(|e| json!({ "role": e.name, "count": e.count }))
            .collect::<Vec<_>>(),
        "jd_match_history": jd_match_history,
    })))
}

/// Fold JSON-text skill lists into lowercase frequency counts
fn top_skill_frequencies<'a>(
    columns: impl Iterator<Item = &'a str>,
    limit: usize,
) -> Vec<FrequencyEntry> {
    let mut counts: HashMap<String, i64> = HashMap::new();
    for raw in columns {
        for skill in parse_json_string_list(Some(raw)) {
            *counts.entry(skill.to_lowercase()).or_insert(0) += 1;
        }
    }
    top_entries(counts, limit)
}

/// Fold role-prediction JSON objects into frequency counts of their `role`
fn top_role_frequencies<'a>(
    columns: impl Iterator<Item = &'a str>,
    limit: usize,
) -> Vec<FrequencyEntry> {
    let mut counts: HashMap<String, i64> = HashMap::new();
    for raw in columns {
        let role = serde_json::from_str::<serde_json::Value>(raw)
            .ok()
            .and_then(|v| {
                v.get("role")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
            });
        if let Some(role) = role {
            *counts.entry(role).or_insert(0) += 1;
        }
    }
    top_entries(counts, limit)
}

fn top_entries(counts: HashMap<String, i64>, limit: usize) -> Vec<FrequencyEntry> {
    let mut entries: Vec<FrequencyEntry> = counts
        .into_iter()
        .map(|(name, count)| FrequencyEntry { name, count })
        .collect();
    // Count descending, name ascending for a stable order on ties
    entries.sort_by(|a, b| b.count.cmp(&a.count).then(a.name.cmp(&b.name)));
    entries.truncate(limit);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skill_frequencies_fold_case_insensitively() {
        let columns = [
            r#"["Python","SQL"]"#,
            r#"["python","Docker"]"#,
            r#"["SQL"]"#,
        ];
        let top = top_skill_frequencies(columns.iter().copied(), 12);

        assert_eq!(top[0].name, "python");
        assert_eq!(top[0].count, 2);
        assert_eq!(top[1].name, "sql");
        assert_eq!(top[1].count, 2);
        assert_eq!(top[2].name, "docker");
        assert_eq!(top[2].count, 1);
    }

    #[test]
    fn test_skill_frequencies_respect_limit() {
        let columns = [r#"["a","b","c","d"]"#];
        let top = top_skill_frequencies(columns.iter().copied(), 2);
        assert_eq!(top.len(), 2);
    }

    #[test]
    fn test_role_frequencies_skip_malformed_columns() {
        let columns = [
            r#"{"role":"Backend Engineer","confidence":0.9}"#,
            r#"{"role":"Backend Engineer"}"#,
            "not json",
            r#"{"confidence":0.5}"#,
        ];
        let top = top_role_frequencies(columns.iter().copied(), 6);

        assert_eq!(top.len(), 1);
        assert_eq!(top[0].name, "Backend Engineer");
        assert_eq!(top[0].count, 2);
    }
}
