// src/common/id_generator.rs
//! Crockford Base32 ID Generator
//!
//! Generates human-readable, prefixed IDs using Crockford Base32 encoding.
//! Format: PREFIX_XXXXXX (e.g., R_K7NP3X for resumes)
//!
//! Benefits:
//! - No ambiguous characters (excludes I, L, O, U)
//! - Case-insensitive
//! - ~1 billion combinations per entity type (32^6)
//! - Easy to read, type, and communicate verbally

use rand::Rng;

/// Crockford Base32 alphabet (excludes I, L, O, U to avoid confusion)
const CROCKFORD_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Entity type prefixes for ID generation
#[derive(Debug, Clone, Copy)]
pub enum EntityPrefix {
    /// User (U_)
    User,
    /// Resume (R_)
    Resume,
    /// Analysis (A_)
    Analysis,
    /// Job description (J_)
    JobDescription,
    /// JD match (M_)
    Match,
    /// Outbox entry (B_)
    Outbox,
}

impl EntityPrefix {
    /// Get the string prefix for this entity type
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityPrefix::User => "U",
            EntityPrefix::Resume => "R",
            EntityPrefix::Analysis => "A",
            EntityPrefix::JobDescription => "J",
            EntityPrefix::Match => "M",
            EntityPrefix::Outbox => "B",
        }
    }
}

/// Generate a random Crockford Base32 string of specified length
fn generate_crockford_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..32);
            CROCKFORD_ALPHABET[idx] as char
        })
        .collect()
}

/// Generate a prefixed ID using Crockford Base32 encoding
///
/// Returns a string in format "PREFIX_XXXXXX" (e.g., "R_8MWQT2")
pub fn generate_id(prefix: EntityPrefix) -> String {
    format!("{}_{}", prefix.as_str(), generate_crockford_string(6))
}

/// Generate a raw Crockford Base32 string without prefix
/// Useful for filenames or other non-entity identifiers
pub fn generate_raw_id(length: usize) -> String {
    generate_crockford_string(length)
}

// ============================================================================
// Convenience functions for each entity type
// ============================================================================

/// Generate a User ID (U_XXXXXX)
pub fn generate_user_id() -> String {
    generate_id(EntityPrefix::User)
}

/// Generate a Resume ID (R_XXXXXX)
pub fn generate_resume_id() -> String {
    generate_id(EntityPrefix::Resume)
}

/// Generate an Analysis ID (A_XXXXXX)
pub fn generate_analysis_id() -> String {
    generate_id(EntityPrefix::Analysis)
}

/// Generate a Job Description ID (J_XXXXXX)
pub fn generate_job_id() -> String {
    generate_id(EntityPrefix::JobDescription)
}

/// Generate a JD Match ID (M_XXXXXX)
pub fn generate_match_id() -> String {
    generate_id(EntityPrefix::Match)
}

/// Generate an Outbox entry ID (B_XXXXXX)
pub fn generate_outbox_id() -> String {
    generate_id(EntityPrefix::Outbox)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_format() {
        let id = generate_resume_id();
        assert!(id.starts_with("R_"));
        assert_eq!(id.len(), 8);
        assert!(id[2..]
            .bytes()
            .all(|b| CROCKFORD_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_prefixes_are_distinct() {
        assert!(generate_user_id().starts_with("U_"));
        assert!(generate_analysis_id().starts_with("A_"));
        assert!(generate_job_id().starts_with("J_"));
        assert!(generate_match_id().starts_with("M_"));
        assert!(generate_outbox_id().starts_with("B_"));
    }
}
