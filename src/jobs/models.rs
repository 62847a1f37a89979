// src/jobs/models.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use crate::common::parse_json_string_list;

// ============================================================================
// Job Description Models
// ============================================================================

#[derive(FromRow, Serialize, Deserialize, Debug)]
pub struct JobDescription {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub company: Option<String>,
    pub content: String,
    pub created_at: Option<String>,
}

/// List row: job plus aggregate match info
#[derive(FromRow, Serialize, Debug)]
pub struct JobListRow {
    pub id: String,
    pub title: String,
    pub company: Option<String>,
    pub content: String,
    pub created_at: Option<String>,
    pub match_count: i64,
    pub last_matched_at: Option<String>,
}

/// One ranked match row joined to its resume and latest analysis
#[derive(FromRow, Debug)]
pub struct MatchRow {
    pub id: String,
    pub resume_id: String,
    pub similarity_score: Option<f64>,
    pub hiring_probability: Option<f64>,
    pub matched_keywords: Option<String>,
    pub skill_gaps: Option<String>,
    pub rank: Option<i64>,
    pub created_at: Option<String>,
    pub original_name: String,
    pub file_type: String,
    pub uploaded_at: Option<String>,
    pub extracted_skills: Option<String>,
    pub ats_score: Option<f64>,
    pub quality_score: Option<f64>,
    pub strength: Option<String>,
}

impl MatchRow {
    /// API shape with JSON-text list columns expanded back into arrays
    pub fn to_api_json(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "resume_id": self.resume_id,
            "similarity_score": self.similarity_score,
            "hiring_probability": self.hiring_probability,
            "matched_keywords": parse_json_string_list(self.matched_keywords.as_deref()),
            "skill_gaps": parse_json_string_list(self.skill_gaps.as_deref()),
            "rank": self.rank,
            "created_at": self.created_at,
            "resume": {
                "original_name": self.original_name,
                "file_type": self.file_type,
                "uploaded_at": self.uploaded_at,
                "extracted_skills": parse_json_string_list(self.extracted_skills.as_deref()),
                "ats_score": self.ats_score,
                "quality_score": self.quality_score,
                "strength": self.strength,
            },
        })
    }
}

// ============================================================================
// Request / Callback Models
// ============================================================================

/// Body of POST /api/jobs
#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    #[serde(default)]
    pub title: String,
    pub company: Option<String>,
    #[serde(default)]
    pub content: String,
}

/// One per-resume ranking record inside the match callback
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct MatchRecord {
    pub resume_id: String,
    pub similarity_score: Option<f64>,
    pub hiring_probability: Option<f64>,
    #[serde(default)]
    pub matched_keywords: Vec<String>,
    #[serde(default)]
    pub skill_gaps: Vec<String>,
    pub rank: Option<i64>,
}

/// Body of the ML match callback: either an error string or a ranking list
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct MatchCallback {
    pub error: Option<String>,
    #[serde(default)]
    pub matches: Vec<MatchRecord>,
}
