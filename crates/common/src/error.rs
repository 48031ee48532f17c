//! Common error types

use thiserror::Error;

/// Common error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let config_err = Error::Config("batch_size must be at most 50".into());
        assert_eq!(
            config_err.to_string(),
            "Configuration error: batch_size must be at most 50"
        );

        let missing = Error::ConfigMissing("SPOTIFY_CLIENT_ID");
        assert_eq!(
            missing.to_string(),
            "Missing required configuration: SPOTIFY_CLIENT_ID"
        );

        let io_err = Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
        assert!(
            io_err.to_string().starts_with("I/O error:"),
            "got: {}",
            io_err
        );
    }

    #[test]
    fn toml_errors_convert() {
        let parse: std::result::Result<toml::Table, _> = toml::from_str("not valid {{{{ toml");
        let err: Error = parse.unwrap_err().into();
        let debug = format!("{:?}", err);
        assert!(
            debug.contains("Toml"),
            "Debug should include variant name, got: {debug}"
        );
    }
}
