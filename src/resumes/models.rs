// src/resumes/models.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use crate::common::parse_json_string_list;

// ============================================================================
// Resume Models
// ============================================================================

/// Resume lifecycle states observed by polling clients.
///
/// `pending` = queued for dispatch, `processing` = the ML service accepted
/// the trigger; both are non-terminal. `done` and `error` are terminal.
pub const RESUME_STATUSES: [&str; 4] = ["pending", "processing", "done", "error"];

#[derive(FromRow, Serialize, Deserialize, Debug)]
pub struct Resume {
    pub id: String,
    pub user_id: String,
    pub original_name: String,
    pub storage_key: String,
    pub file_type: String,
    pub file_size: Option<i64>,
    pub status: String,
    pub error_message: Option<String>,
    pub analysis_attempt: i64,
    pub uploaded_at: Option<String>,
}

/// One analysis result row; re-analysis appends a new row and reads take the
/// most recent, so rows are never updated in place
#[derive(FromRow, Serialize, Deserialize, Debug)]
pub struct Analysis {
    pub id: String,
    pub resume_id: String,
    pub attempt: i64,
    pub ats_score: Option<f64>,
    pub quality_score: Option<f64>,
    pub strength: Option<String>,
    pub extracted_skills: Option<String>,
    pub grammar_issues: Option<String>,
    pub keyword_matches: Option<String>,
    pub raw_result: Option<String>,
    pub role_prediction: Option<String>,
    pub anomalies: Option<String>,
    pub created_at: Option<String>,
}

impl Analysis {
    /// API shape with the JSON-text columns expanded back into values
    pub fn to_api_json(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "resume_id": self.resume_id,
            "attempt": self.attempt,
            "ats_score": self.ats_score,
            "quality_score": self.quality_score,
            "strength": self.strength,
            "extracted_skills": parse_json_string_list(self.extracted_skills.as_deref()),
            "grammar_issues": parse_json_column(self.grammar_issues.as_deref()),
            "keyword_matches": parse_json_column(self.keyword_matches.as_deref()),
            "raw_result": parse_json_column(self.raw_result.as_deref()),
            "role_prediction": parse_json_column(self.role_prediction.as_deref()),
            "anomalies": parse_json_string_list(self.anomalies.as_deref()),
            "created_at": self.created_at,
        })
    }
}

fn parse_json_column(raw: Option<&str>) -> Value {
    raw.and_then(|text| serde_json::from_str(text).ok())
        .unwrap_or(Value::Null)
}

/// Row shape for the resume list (latest analysis joined in)
#[derive(FromRow, Debug)]
pub struct ResumeListRow {
    pub id: String,
    pub original_name: String,
    pub file_type: String,
    pub file_size: Option<i64>,
    pub status: String,
    pub error_message: Option<String>,
    pub uploaded_at: Option<String>,
    pub ats_score: Option<f64>,
    pub quality_score: Option<f64>,
    pub strength: Option<String>,
    pub extracted_skills: Option<String>,
    pub role_prediction: Option<String>,
}

impl ResumeListRow {
    pub fn to_api_json(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "original_name": self.original_name,
            "file_type": self.file_type,
            "file_size": self.file_size,
            "status": self.status,
            "error_message": self.error_message,
            "uploaded_at": self.uploaded_at,
            "ats_score": self.ats_score,
            "quality_score": self.quality_score,
            "strength": self.strength,
            "extracted_skills": parse_json_string_list(self.extracted_skills.as_deref()),
            "role_prediction": parse_json_column(self.role_prediction.as_deref()),
        })
    }
}

// ============================================================================
// Request / Callback Models
// ============================================================================

/// Query parameters for GET /api/resumes
#[derive(Debug, Deserialize)]
pub struct ResumeListParams {
    pub status: Option<String>,
    pub sort: Option<String>,
}

/// Query parameters the callback URL carries back
#[derive(Debug, Deserialize)]
pub struct AnalysisCallbackParams {
    pub attempt: Option<i64>,
}

/// Body of the ML analysis callback: either an error string or a result bundle
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct AnalysisCallback {
    pub error: Option<String>,
    pub ats_score: Option<f64>,
    pub quality_score: Option<f64>,
    pub strength: Option<String>,
    #[serde(default)]
    pub extracted_skills: Vec<String>,
    #[serde(default)]
    pub grammar_issues: Vec<Value>,
    pub keyword_matches: Option<Value>,
    pub raw_result: Option<Value>,
    pub role_prediction: Option<Value>,
    #[serde(default)]
    pub anomalies: Vec<String>,
}

/// Body of POST /api/resumes/:id/keyword-scan
#[derive(Debug, Deserialize)]
pub struct KeywordScanRequest {
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// A file pulled out of the upload multipart form, pre-validation
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    pub fn extension(&self) -> Option<String> {
        self.filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }
}
