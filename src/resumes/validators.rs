// src/resumes/validators.rs

use super::models::{KeywordScanRequest, UploadedFile};
use crate::common::{ValidationResult, Validator};

/// 10 MB upload cap
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

const ALLOWED_EXTENSIONS: [&str; 2] = ["pdf", "docx"];

// MIME types `infer` reports for the accepted formats
const PDF_MIME: &str = "application/pdf";
const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const ZIP_MIME: &str = "application/zip";

// ============================================================================
// Upload Validators
// ============================================================================

pub struct UploadValidator;

impl Validator<UploadedFile> for UploadValidator {
    fn validate(&self, data: &UploadedFile) -> ValidationResult {
        let mut result = ValidationResult::new();

        if data.filename.trim().is_empty() {
            result.add_error("filename", "Filename is required");
        }

        match data.extension() {
            Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => {}
            _ => {
                result.add_error("filename", "Only PDF and DOCX files are allowed");
            }
        }

        if data.data.is_empty() {
            result.add_error("resume", "Uploaded file is empty");
        } else if data.data.len() > MAX_FILE_SIZE {
            result.add_error("resume", "File exceeds the 10 MB size limit");
        }

        // Magic-byte sniff; DOCX containers sniff as zip
        if let Some(kind) = infer::get(&data.data) {
            let mime = kind.mime_type();
            if mime != PDF_MIME && mime != DOCX_MIME && mime != ZIP_MIME {
                result.add_error("resume", "File content does not match an accepted format");
            }
        }

        result
    }
}

// ============================================================================
// Keyword Scan Validators
// ============================================================================

pub struct KeywordScanValidator;

impl Validator<KeywordScanRequest> for KeywordScanValidator {
    fn validate(&self, data: &KeywordScanRequest) -> ValidationResult {
        let mut result = ValidationResult::new();

        if data.keywords.is_empty() {
            result.add_error("keywords", "keywords array is required");
        } else if data.keywords.len() > 50 {
            result.add_error("keywords", "At most 50 keywords per scan");
        } else if data.keywords.iter().any(|k| k.trim().is_empty()) {
            result.add_error("keywords", "Keywords must be non-empty strings");
        }

        result
    }
}
