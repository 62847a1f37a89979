// src/jobs/tests/validators_tests.rs

#[cfg(test)]
mod tests {
    use crate::common::Validator;
    use crate::jobs::models::CreateJobRequest;
    use crate::jobs::validators::*;

    fn request(title: &str, content: &str) -> CreateJobRequest {
        CreateJobRequest {
            title: title.to_string(),
            company: None,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_valid_job_passes() {
        let result = CreateJobValidator.validate(&request(
            "Data Engineer",
            "We are looking for a data engineer with strong SQL and Python skills.",
        ));
        assert!(result.is_valid);
    }

    #[test]
    fn test_title_is_required() {
        let result = CreateJobValidator.validate(&request(
            "   ",
            "We are looking for a data engineer with strong SQL and Python skills.",
        ));
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.field == "title"));
    }

    #[test]
    fn test_title_length_is_capped() {
        let result = CreateJobValidator.validate(&request(
            &"x".repeat(MAX_TITLE_LENGTH + 1),
            "We are looking for a data engineer with strong SQL and Python skills.",
        ));
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.field == "title"));
    }

    #[test]
    fn test_short_content_is_rejected() {
        let result = CreateJobValidator.validate(&request("Data Engineer", "Too short."));
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.field == "content"));
    }

    #[test]
    fn test_content_length_counts_trimmed_text() {
        let padded = format!("   {}   ", "x".repeat(MIN_CONTENT_LENGTH));
        assert!(CreateJobValidator
            .validate(&request("Data Engineer", &padded))
            .is_valid);
    }
}
