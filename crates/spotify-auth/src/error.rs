//! Error types for the OAuth flow, token endpoint and credential cache

use std::time::Duration;

/// Errors from OAuth authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("PKCE verifier length must be greater than zero")]
    InvalidVerifierLength,

    #[error("state mismatch, expected {expected}, got {received}")]
    StateMismatch { expected: String, received: String },

    #[error("authorization callback carried no code")]
    MissingCode,

    #[error("authorization denied: {0}")]
    Denied(String),

    #[error("no authorization callback within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("failed to capture auth callback: {0}")]
    Callback(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_mismatch_names_both_values() {
        let err = Error::StateMismatch {
            expected: "Y".into(),
            received: "X".into(),
        };
        assert_eq!(err.to_string(), "state mismatch, expected Y, got X");
    }

    #[test]
    fn timeout_reports_seconds() {
        let err = Error::Timeout(Duration::from_secs(300));
        assert_eq!(err.to_string(), "no authorization callback within 300s");
    }
}
