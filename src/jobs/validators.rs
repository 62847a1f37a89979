// src/jobs/validators.rs

use super::models::CreateJobRequest;
use crate::common::{ValidationResult, Validator};

pub const MAX_TITLE_LENGTH: usize = 255;
/// Shorter descriptions give the matcher too little signal to rank against
pub const MIN_CONTENT_LENGTH: usize = 50;

// ============================================================================
// Job Description Validators
// ============================================================================

pub struct CreateJobValidator;

impl Validator<CreateJobRequest> for CreateJobValidator {
    fn validate(&self, data: &CreateJobRequest) -> ValidationResult {
        let mut result = ValidationResult::new();

        let title = data.title.trim();
        if title.is_empty() {
            result.add_error("title", "Title is required");
        } else if title.len() > MAX_TITLE_LENGTH {
            result.add_error("title", "Title must be at most 255 characters");
        }

        let content = data.content.trim();
        if content.is_empty() {
            result.add_error("content", "Job description content is required");
        } else if content.len() < MIN_CONTENT_LENGTH {
            result.add_error(
                "content",
                "Job description must be at least 50 characters",
            );
        }

        result
    }
}
