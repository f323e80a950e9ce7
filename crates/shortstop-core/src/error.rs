//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A day key that is not a `YYYY-MM-DD` calendar date
    #[error("Invalid day key: {value} (expected YYYY-MM-DD)")]
    InvalidDayKey { value: String },

    /// Redirect threshold outside the accepted range
    #[error("Invalid redirect threshold: {value} (expected {min}..={max})")]
    InvalidThreshold { value: i64, min: u32, max: u32 },

    /// Redirect URL that is blank after trimming
    #[error("Redirect URL must not be empty")]
    EmptyRedirectUrl,
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_display() {
        let err = DomainError::InvalidDayKey {
            value: "yesterday".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid day key: yesterday (expected YYYY-MM-DD)"
        );

        let err = DomainError::InvalidThreshold {
            value: 0,
            min: 1,
            max: 100,
        };
        assert_eq!(
            err.to_string(),
            "Invalid redirect threshold: 0 (expected 1..=100)"
        );
    }
}
