//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic business failure raised by aggregates and record services.
///
/// Infrastructure failures (storage, network) have their own error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or missing input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The command is not allowed in the current state.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("not found")]
    NotFound,

    /// Duplicate or stale write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The acting user may not perform this operation on this record.
    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn unauthorized() -> Self {
        Self::Unauthorized
    }
}

/// Trim a required text field, failing with a validation error naming `field` when blank.
pub fn required_text(value: &str, field: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

/// Trim an optional text field; blank becomes `None`.
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Normalize a business code: trimmed and upper-cased, never blank.
pub fn normalize_code(value: &str, field: &str) -> DomainResult<String> {
    Ok(required_text(value, field)?.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_trimmed_and_uppercased() {
        assert_eq!(normalize_code("  cu-001 ", "code").unwrap(), "CU-001");
        match normalize_code("   ", "code") {
            Err(DomainError::Validation(msg)) => assert!(msg.contains("code")),
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn optional_text_drops_blank_values() {
        assert_eq!(optional_text(Some("  ")), None);
        assert_eq!(optional_text(Some(" Lyon ")), Some("Lyon".to_string()));
        assert_eq!(optional_text(None), None);
    }
}
