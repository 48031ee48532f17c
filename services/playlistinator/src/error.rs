//! Command outcome errors
//!
//! Library failures (config, auth, API) travel as `anyhow` errors with
//! context. This enum covers outcomes the commands decide themselves.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("purge incomplete: {failed} failed and {cancelled} cancelled of {total} batches")]
    PurgeIncomplete {
        failed: usize,
        cancelled: usize,
        total: usize,
    },

    #[error("{path}: row {row} has delete=true but no id")]
    MissingId { path: String, row: usize },

    #[error("interrupted by signal")]
    Interrupted,
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = Error::PurgeIncomplete {
            failed: 2,
            cancelled: 0,
            total: 10,
        };
        assert_eq!(
            err.to_string(),
            "purge incomplete: 2 failed and 0 cancelled of 10 batches"
        );

        let err = Error::MissingId {
            path: "liked.csv".into(),
            row: 4,
        };
        assert!(err.to_string().contains("row 4"));

        assert_eq!(Error::Interrupted.to_string(), "interrupted by signal");
    }

    #[test]
    fn error_debug_includes_variant_name() {
        let err = Error::PurgeIncomplete {
            failed: 1,
            cancelled: 0,
            total: 1,
        };
        let debug = format!("{err:?}");
        assert!(
            debug.contains("PurgeIncomplete"),
            "Debug output must include variant name, got: {debug}"
        );
    }
}
