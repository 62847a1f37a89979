// src/services/ml.rs
//! Client for the external ML analysis service.
//!
//! Analysis and matching run out of process: the backend POSTs a trigger
//! payload carrying a callback URL, and the ML service delivers results back
//! to that URL when the pipeline finishes. Triggers go through the outbox
//! (see services::outbox) so a transient ML outage never strands a resume;
//! keyword scanning and interview questions are synchronous passthroughs.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::common::parse_json_string_list;

/// Trigger dispatches only kick the pipeline off; the ML side runs async
const TRIGGER_TIMEOUT: Duration = Duration::from_secs(5);
/// Synchronous passthrough calls wait for a real answer
const PASSTHROUGH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum MLError {
    #[error("ML request failed: {0}")]
    RequestFailed(String),

    #[error("ML service returned status {0}")]
    BadStatus(u16),

    #[error("Invalid ML response: {0}")]
    InvalidResponse(String),
}

/// Payload for `POST {ml_base}/analyze`
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeTrigger {
    pub resume_id: String,
    pub s3_key: String,
    pub file_type: String,
    pub callback_url: String,
    pub callback_token: String,
}

/// One resume entry inside a match trigger
#[derive(Debug, Serialize, Deserialize)]
pub struct MatchResumeEntry {
    pub id: String,
    pub name: String,
    pub skills: Vec<String>,
    pub ats_score: f64,
    pub quality_score: f64,
    pub text: String,
}

/// Payload for `POST {ml_base}/match`
#[derive(Debug, Serialize, Deserialize)]
pub struct MatchTrigger {
    pub job_id: String,
    pub jd_text: String,
    pub callback_url: String,
    pub callback_token: String,
    pub resumes: Vec<MatchResumeEntry>,
}

/// Raw analysis columns a match-eligible resume carries into a trigger
#[derive(Debug, sqlx::FromRow)]
pub struct MatchCandidateRow {
    pub id: String,
    pub original_name: String,
    pub extracted_skills: Option<String>,
    pub ats_score: Option<f64>,
    pub quality_score: Option<f64>,
    pub raw_result: Option<String>,
}

#[derive(Debug)]
pub struct MLService {
    http: Client,
    base_url: String,
    internal_base_url: String,
    callback_token: String,
}

impl MLService {
    pub fn new(
        http: Client,
        base_url: String,
        internal_base_url: String,
        callback_token: String,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            internal_base_url: internal_base_url.trim_end_matches('/').to_string(),
            callback_token,
        }
    }

    pub fn callback_token(&self) -> &str {
        &self.callback_token
    }

    /// Callback address the ML service POSTs analysis results to.
    ///
    /// The attempt number rides along as a query parameter so the callback
    /// handler can reject stale deliveries from superseded trigger runs.
    pub fn analysis_callback_url(&self, resume_id: &str, attempt: i64) -> String {
        format!(
            "{}/api/resumes/{}/analysis?attempt={}",
            self.internal_base_url, resume_id, attempt
        )
    }

    /// Callback address the ML service POSTs match results to
    pub fn match_callback_url(&self, job_id: &str) -> String {
        format!("{}/api/jobs/{}/match-result", self.internal_base_url, job_id)
    }

    /// Build the analyze trigger payload for a freshly stored resume
    pub fn build_analyze_trigger(
        &self,
        resume_id: &str,
        storage_key: &str,
        file_type: &str,
        attempt: i64,
    ) -> AnalyzeTrigger {
        AnalyzeTrigger {
            resume_id: resume_id.to_string(),
            s3_key: storage_key.to_string(),
            file_type: file_type.to_string(),
            callback_url: self.analysis_callback_url(resume_id, attempt),
            callback_token: self.callback_token.clone(),
        }
    }

    /// Build the match trigger payload from the eligible-resume rows.
    ///
    /// Skill lists are stored as JSON text and normalized back to arrays here;
    /// missing scores default to zero; resume text comes out of the stored
    /// raw extraction payload when present.
    pub fn build_match_trigger(
        &self,
        job_id: &str,
        jd_text: &str,
        candidates: &[MatchCandidateRow],
    ) -> MatchTrigger {
        let resumes = candidates
            .iter()
            .map(|row| MatchResumeEntry {
                id: row.id.clone(),
                name: row.original_name.clone(),
                skills: parse_json_string_list(row.extracted_skills.as_deref()),
                ats_score: row.ats_score.unwrap_or(0.0),
                quality_score: row.quality_score.unwrap_or(0.0),
                text: row
                    .raw_result
                    .as_deref()
                    .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
                    .and_then(|v| v.get("text").and_then(Value::as_str).map(str::to_string))
                    .unwrap_or_default(),
            })
            .collect();

        MatchTrigger {
            job_id: job_id.to_string(),
            jd_text: jd_text.to_string(),
            callback_url: self.match_callback_url(job_id),
            callback_token: self.callback_token.clone(),
            resumes,
        }
    }

    /// Dispatch a previously enqueued trigger payload to the ML service.
    ///
    /// `endpoint` is the ML route ("/analyze" or "/match"); `payload` is the
    /// serialized trigger JSON from the outbox row.
    pub async fn dispatch_trigger(&self, endpoint: &str, payload: &Value) -> Result<(), MLError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(url = %url, "Dispatching ML trigger");

        let response = self
            .http
            .post(&url)
            .timeout(TRIGGER_TIMEOUT)
            .json(payload)
            .send()
            .await
            .map_err(|e| MLError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = %status, "ML trigger dispatch rejected");
            return Err(MLError::BadStatus(status.as_u16()));
        }

        Ok(())
    }

    /// POST {ml_base}/keyword-scan - synchronous passthrough
    pub async fn keyword_scan(&self, text: &str, keywords: &[String]) -> Result<Value, MLError> {
        self.passthrough(
            "/keyword-scan",
            &serde_json::json!({ "text": text, "keywords": keywords }),
        )
        .await
    }

    /// POST {ml_base}/interview-questions - synchronous passthrough
    pub async fn interview_questions(
        &self,
        skills: &[String],
        role: &str,
    ) -> Result<Value, MLError> {
        self.passthrough(
            "/interview-questions",
            &serde_json::json!({ "skills": skills, "role": role }),
        )
        .await
    }

    async fn passthrough(&self, endpoint: &str, payload: &Value) -> Result<Value, MLError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let response = self
            .http
            .post(&url)
            .timeout(PASSTHROUGH_TIMEOUT)
            .json(payload)
            .send()
            .await
            .map_err(|e| MLError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MLError::BadStatus(status.as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| MLError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> MLService {
        MLService::new(
            Client::new(),
            "http://ml:8000/".to_string(),
            "http://backend:4000".to_string(),
            "secret-token".to_string(),
        )
    }

    #[test]
    fn test_analysis_callback_url_embeds_resume_and_attempt() {
        let ml = test_service();
        assert_eq!(
            ml.analysis_callback_url("R_ABC123", 2),
            "http://backend:4000/api/resumes/R_ABC123/analysis?attempt=2"
        );
    }

    #[test]
    fn test_analyze_trigger_payload_shape() {
        let ml = test_service();
        let trigger = ml.build_analyze_trigger("R_ABC123", "resumes/U_1/R_ABC123.pdf", "pdf", 1);

        let json = serde_json::to_value(&trigger).unwrap();
        assert_eq!(json["resume_id"], "R_ABC123");
        assert_eq!(json["s3_key"], "resumes/U_1/R_ABC123.pdf");
        assert_eq!(json["file_type"], "pdf");
        assert_eq!(json["callback_token"], "secret-token");
        assert!(json["callback_url"]
            .as_str()
            .unwrap()
            .contains("/api/resumes/R_ABC123/analysis"));
    }

    #[test]
    fn test_match_trigger_normalizes_skills_and_defaults_scores() {
        let ml = test_service();
        let candidates = vec![
            MatchCandidateRow {
                id: "R_1".to_string(),
                original_name: "alice.pdf".to_string(),
                extracted_skills: Some(r#"["Python","SQL"]"#.to_string()),
                ats_score: Some(82.0),
                quality_score: None,
                raw_result: Some(r#"{"text":"resume body"}"#.to_string()),
            },
            MatchCandidateRow {
                id: "R_2".to_string(),
                original_name: "bob.docx".to_string(),
                extracted_skills: None,
                ats_score: None,
                quality_score: None,
                raw_result: None,
            },
        ];

        let trigger = ml.build_match_trigger("J_9", "We need a data engineer", &candidates);

        assert_eq!(trigger.resumes.len(), 2);
        assert_eq!(trigger.resumes[0].skills, vec!["Python", "SQL"]);
        assert_eq!(trigger.resumes[0].text, "resume body");
        assert_eq!(trigger.resumes[1].ats_score, 0.0);
        assert_eq!(trigger.resumes[1].quality_score, 0.0);
        assert!(trigger.resumes[1].skills.is_empty());
        assert_eq!(
            trigger.callback_url,
            "http://backend:4000/api/jobs/J_9/match-result"
        );
    }
}
