//! Error types and handling for docframe-core operations.
//!
//! Errors are grouped into a small number of categories so that hosts can
//! decide how to surface them:
//!
//! - **Fetch errors**: network failures, non-success statuses, unusable
//!   content types, preview-data collaborator failures
//! - **URL errors**: source or navigation URLs that cannot be resolved
//! - **Configuration errors**: unreadable or malformed config files
//! - **Protocol errors**: cross-frame messages with an unexpected shape
//!
//! A rewrite never fails: documents lacking the structure a step expects are
//! reported through [`RewriteReport`](crate::RewriteReport) instead.
//!
//! ```rust
//! use docframe_core::Error;
//!
//! let err = Error::FetchFailed("empty content type".to_string());
//! assert_eq!(err.category(), "fetch");
//! assert!(!err.is_recoverable());
//! ```

use thiserror::Error;

/// The main error type for docframe-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Network operation failed.
    ///
    /// The underlying `reqwest::Error` is preserved so that timeouts and
    /// connection failures can be told apart from protocol errors.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Retrieving the preview document failed.
    ///
    /// Covers non-success HTTP statuses and responses whose content type is
    /// missing, empty, or not textual.
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    /// The preview-data collaborator could not supply a download URL.
    #[error("Preview data unavailable: {0}")]
    PreviewData(String),

    /// URL is malformed or cannot be resolved against its base.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Configuration is invalid or inaccessible.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A cross-frame message did not match the navigation protocol.
    #[error("Malformed frame message: {0}")]
    MalformedMessage(String),

    /// The preview session has shut down and no longer accepts events.
    #[error("Preview session closed")]
    SessionClosed,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Error {
    /// Check if the error might be recoverable through retry logic.
    ///
    /// The pipeline itself never retries; this is a hint for hosts that
    /// want to offer a "try again" action.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network(e) if e.is_timeout() || e.is_connect())
    }

    /// Get the error category as a string identifier for logging.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Network(_) | Self::FetchFailed(_) | Self::PreviewData(_) => "fetch",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::MalformedMessage(_) => "protocol",
            Self::SessionClosed => "session",
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        let cases = vec![
            (Error::FetchFailed("status 500".into()), "Fetch failed"),
            (Error::PreviewData("no cached url".into()), "Preview data"),
            (Error::InvalidUrl("::".into()), "Invalid URL"),
            (Error::Config("missing field".into()), "Configuration error"),
            (Error::MalformedMessage("no type".into()), "Malformed frame"),
        ];

        for (error, prefix) in cases {
            let rendered = error.to_string();
            assert!(
                rendered.starts_with(prefix),
                "expected '{rendered}' to start with '{prefix}'"
            );
        }
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(Error::FetchFailed(String::new()).category(), "fetch");
        assert_eq!(Error::PreviewData(String::new()).category(), "fetch");
        assert_eq!(Error::MalformedMessage(String::new()).category(), "protocol");
        assert_eq!(Error::SessionClosed.category(), "session");
        assert_eq!(Error::InvalidUrl(String::new()).category(), "invalid_url");
    }

    #[test]
    fn test_error_recoverability() {
        assert!(!Error::FetchFailed("404".into()).is_recoverable());
        assert!(!Error::MalformedMessage("{}".into()).is_recoverable());
    }

    #[test]
    fn test_error_from_json() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            other => panic!("expected serialization error, got {other:?}"),
        }
    }
}
