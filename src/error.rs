//! Error types
//!
//! Run-level failures are `SyncError` and always stop the run. Per-field
//! conversion problems are `FieldConversionError` and are only reported.

use thiserror::Error;

/// Reason reported when the login POST does not redirect
pub const REASON_LOGIN_REJECTED: &str = "invalid credentials or unexpected response";
/// Reason reported when the approval page or approval POST answers non-2xx
pub const REASON_UNEXPECTED_RESPONSE: &str = "unexpected response";
/// Reason reported when the approval page has no `oauth_token` input
pub const REASON_OAUTH_TOKEN_MISSING: &str = "oauth token not found";
/// Reason reported when the approval response has no code text area
pub const REASON_CODE_MISSING: &str = "authorization code not found";
/// Reason reported when the token exchange carries no `access_token`
pub const REASON_ACCESS_TOKEN_MISSING: &str = "access token missing";

/// Errors that abort a sync run
#[derive(Error, Debug)]
pub enum SyncError {
    /// A login step did not meet its structural expectation
    #[error("Authentication failed: {reason}")]
    Authentication { reason: String },

    /// Network failure or non-success status
    #[error("Transport error: {0}")]
    Transport(String),

    /// A response could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Invalid run configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The row sink rejected output
    #[error("Sink error: {0}")]
    Sink(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn authentication(reason: &str) -> Self {
        SyncError::Authentication {
            reason: reason.to_string(),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}

impl From<csv::Error> for SyncError {
    fn from(err: csv::Error) -> Self {
        SyncError::Sink(err.to_string())
    }
}

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// A single metric value that could not be converted to its column type.
///
/// The field stays unset on its row; the row is still emitted.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot convert {value:?} to {expected} for column {column}")]
pub struct FieldConversionError {
    pub column: String,
    pub value: String,
    pub expected: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::authentication(REASON_OAUTH_TOKEN_MISSING);
        assert_eq!(err.to_string(), "Authentication failed: oauth token not found");

        let err = SyncError::Transport("HTTP 500".into());
        assert_eq!(err.to_string(), "Transport error: HTTP 500");
    }

    #[test]
    fn test_json_error_is_decode() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: SyncError = json_err.into();
        assert!(matches!(err, SyncError::Decode(_)));
    }

    #[test]
    fn test_field_conversion_display() {
        let err = FieldConversionError {
            column: "weight".into(),
            value: "abc".into(),
            expected: "double",
        };
        assert_eq!(
            err.to_string(),
            "cannot convert \"abc\" to double for column weight"
        );
    }
}
