// src/resumes/tests/validators_tests.rs

#[cfg(test)]
mod tests {
    use crate::common::Validator;
    use crate::resumes::models::{KeywordScanRequest, UploadedFile};
    use crate::resumes::validators::*;

    // Minimal valid PDF header so the magic-byte sniff passes
    fn pdf_bytes() -> Vec<u8> {
        let mut data = b"%PDF-1.4\n".to_vec();
        data.extend_from_slice(&[0u8; 64]);
        data
    }

    #[test]
    fn test_upload_validator_accepts_pdf() {
        let file = UploadedFile {
            filename: "resume.pdf".to_string(),
            data: pdf_bytes(),
        };

        let result = UploadValidator.validate(&file);
        assert!(result.is_valid);
    }

    #[test]
    fn test_upload_validator_rejects_unknown_extension() {
        let file = UploadedFile {
            filename: "resume.txt".to_string(),
            data: b"plain text".to_vec(),
        };

        let result = UploadValidator.validate(&file);
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.field == "filename"));
    }

    #[test]
    fn test_upload_validator_rejects_empty_file() {
        let file = UploadedFile {
            filename: "resume.pdf".to_string(),
            data: Vec::new(),
        };

        let result = UploadValidator.validate(&file);
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.field == "resume"));
    }

    #[test]
    fn test_upload_validator_rejects_oversized_file() {
        let file = UploadedFile {
            filename: "resume.pdf".to_string(),
            data: vec![0u8; MAX_FILE_SIZE + 1],
        };

        let result = UploadValidator.validate(&file);
        assert!(!result.is_valid);
    }

    #[test]
    fn test_upload_validator_rejects_mismatched_content() {
        // A PNG renamed to .pdf must not pass the sniff
        let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        data.extend_from_slice(&[0u8; 64]);
        let file = UploadedFile {
            filename: "resume.pdf".to_string(),
            data,
        };

        let result = UploadValidator.validate(&file);
        assert!(!result.is_valid);
    }

    #[test]
    fn test_extension_is_lowercased() {
        let file = UploadedFile {
            filename: "Resume.PDF".to_string(),
            data: pdf_bytes(),
        };
        assert_eq!(file.extension().as_deref(), Some("pdf"));
        assert!(UploadValidator.validate(&file).is_valid);
    }

    #[test]
    fn test_keyword_scan_validator_requires_keywords() {
        let request = KeywordScanRequest { keywords: vec![] };
        let result = KeywordScanValidator.validate(&request);
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.field == "keywords"));
    }

    #[test]
    fn test_keyword_scan_validator_accepts_keywords() {
        let request = KeywordScanRequest {
            keywords: vec!["Python".to_string(), "SQL".to_string()],
        };
        assert!(KeywordScanValidator.validate(&request).is_valid);
    }

    #[test]
    fn test_keyword_scan_validator_rejects_blank_keywords() {
        let request = KeywordScanRequest {
            keywords: vec!["Python".to_string(), "  ".to_string()],
        };
        assert!(!KeywordScanValidator.validate(&request).is_valid);
    }
}
