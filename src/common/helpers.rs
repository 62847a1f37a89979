// Helper functions for safe logging and JSON-text columns

/// Masks email addresses for safe logging
/// Prevents sensitive data exposure while preserving debugging utility
///
/// # Example
/// ```
/// let masked = safe_email_log("user@example.com");
/// // Returns: "u***@example.com"
/// ```
pub fn safe_email_log(email: &str) -> String {
    if email.len() > 3 {
        let parts: Vec<&str> = email.split('@').collect();
        if parts.len() == 2 {
            format!("{}***@{}", &parts[0][..1.min(parts[0].len())], parts[1])
        } else {
            "***@***.***".to_string()
        }
    } else {
        "***@***.***".to_string()
    }
}

/// Parses a JSON-text column holding a list of strings.
///
/// Skill and keyword lists are stored as serialized JSON arrays; older rows or
/// upstream payloads occasionally hold bare values, so anything unparseable
/// yields an empty list rather than an error.
pub fn parse_json_string_list(raw: Option<&str>) -> Vec<String> {
    match raw {
        Some(text) => serde_json::from_str::<Vec<String>>(text).unwrap_or_default(),
        None => Vec::new(),
    }
}
