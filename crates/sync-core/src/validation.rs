//! Input validation for metasync
//!
//! Provides validation functions to reject:
//! - Missing or blank required names
//! - Values longer than their column allows
//! - Malformed Postgres identifiers passed to source-database discovery
//! - JSON blobs of the wrong shape

use crate::{Result, SyncError};

/// Maximum length for `VARCHAR(255)` columns (names, URLs)
pub const MAX_NAME_LEN: usize = 255;

/// Maximum length for `VARCHAR(50)` columns (status, db_type)
pub const MAX_STATUS_LEN: usize = 50;

/// Maximum length of a Postgres identifier (NAMEDATALEN - 1)
pub const MAX_PG_IDENTIFIER_LEN: usize = 63;

/// Maximum number of audit rows returned by one request
pub const MAX_AUDIT_LIMIT: i64 = 500;

/// Validate a required text column
///
/// Requirements:
/// - Not empty or whitespace-only
/// - <= `max_len` characters
pub fn validate_required_text(value: &str, field_name: &str, max_len: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SyncError::ValidationError(format!(
            "{} cannot be empty",
            field_name
        )));
    }

    validate_length(value, field_name, max_len)
}

/// Validate an optional text column against its length limit.
pub fn validate_optional_text(value: Option<&str>, field_name: &str, max_len: usize) -> Result<()> {
    match value {
        Some(v) => validate_length(v, field_name, max_len),
        None => Ok(()),
    }
}

fn validate_length(value: &str, field_name: &str, max_len: usize) -> Result<()> {
    let len = value.chars().count();
    if len > max_len {
        return Err(SyncError::ValidationError(format!(
            "{} too long: {} > {} characters",
            field_name, len, max_len
        )));
    }
    Ok(())
}

/// Validate a schema or table name supplied for source-database discovery
///
/// Names are always bound as query parameters, so this only rejects values
/// Postgres could never match.
pub fn validate_pg_identifier(identifier: &str, field_name: &str) -> Result<()> {
    if identifier.is_empty() {
        return Err(SyncError::ValidationError(format!(
            "{} cannot be empty",
            field_name
        )));
    }

    if identifier.len() > MAX_PG_IDENTIFIER_LEN {
        return Err(SyncError::ValidationError(format!(
            "{} too long: {} > {} bytes",
            field_name,
            identifier.len(),
            MAX_PG_IDENTIFIER_LEN
        )));
    }

    if identifier.contains('\0') {
        return Err(SyncError::ValidationError(format!(
            "{} contains a NUL character",
            field_name
        )));
    }

    Ok(())
}

/// Validate that an optional JSON column holds an object when present.
pub fn validate_json_object(value: Option<&serde_json::Value>, field_name: &str) -> Result<()> {
    match value {
        None | Some(serde_json::Value::Null) | Some(serde_json::Value::Object(_)) => Ok(()),
        Some(_) => Err(SyncError::ValidationError(format!(
            "{} must be a JSON object",
            field_name
        ))),
    }
}

/// Clamp a requested audit page size into `1..=MAX_AUDIT_LIMIT`.
pub fn clamp_audit_limit(limit: Option<i64>, default: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, MAX_AUDIT_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_text() {
        assert!(validate_required_text("billing", "systemname", MAX_NAME_LEN).is_ok());
        assert!(validate_required_text("", "systemname", MAX_NAME_LEN).is_err());
        assert!(validate_required_text("   ", "systemname", MAX_NAME_LEN).is_err());

        let long = "x".repeat(MAX_NAME_LEN + 1);
        let err = validate_required_text(&long, "systemname", MAX_NAME_LEN).unwrap_err();
        assert!(err.to_string().contains("systemname too long"));
    }

    #[test]
    fn test_length_counts_characters() {
        // 50 multi-byte characters fit a VARCHAR(50)
        let status = "é".repeat(MAX_STATUS_LEN);
        assert!(validate_optional_text(Some(&status), "status", MAX_STATUS_LEN).is_ok());
        assert!(validate_optional_text(None, "status", MAX_STATUS_LEN).is_ok());
    }

    #[test]
    fn test_pg_identifiers() {
        assert!(validate_pg_identifier("public", "schema").is_ok());
        assert!(validate_pg_identifier("Mixed Case Table", "table").is_ok());
        assert!(validate_pg_identifier("", "schema").is_err());
        assert!(validate_pg_identifier(&"a".repeat(64), "table").is_err());
        assert!(validate_pg_identifier("bad\0name", "table").is_err());
    }

    #[test]
    fn test_json_object() {
        assert!(validate_json_object(None, "db_creds").is_ok());
        assert!(validate_json_object(Some(&json!(null)), "db_creds").is_ok());
        assert!(validate_json_object(Some(&json!({"host": "db"})), "db_creds").is_ok());
        assert!(validate_json_object(Some(&json!(["host"])), "db_creds").is_err());
        assert!(validate_json_object(Some(&json!("host=db")), "db_creds").is_err());
    }

    #[test]
    fn test_clamp_audit_limit() {
        assert_eq!(clamp_audit_limit(None, 50), 50);
        assert_eq!(clamp_audit_limit(Some(0), 50), 1);
        assert_eq!(clamp_audit_limit(Some(10_000), 50), MAX_AUDIT_LIMIT);
    }
}
