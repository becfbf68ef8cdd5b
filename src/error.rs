//! Error types for the matching library.
//!
//! Only `MatchError` may leave the per-song pipeline. Everything a catalog
//! can report is a `CatalogError`, which callers degrade into an empty
//! search result or a failed favorite on the decision.

use thiserror::Error;

/// Failures that stop the batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    /// Threshold ordering/range or another setting is invalid. Raised by the
    /// config builder before any song is processed.
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),
    /// The human answered "quit" at an interactive prompt, or the session
    /// was cancelled while a prompt was open.
    #[error("matching aborted by user")]
    HumanAbort,
}

impl MatchError {
    pub fn config(msg: impl Into<String>) -> Self {
        MatchError::ConfigurationInvalid(msg.into())
    }
}

/// Failures reported by a catalog implementation.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("http error: {0}")]
    Http(String),
    #[error("catalog returned status {0}")]
    Status(u16),
    #[error("rate limited by catalog")]
    RateLimited,
    #[error("parse error: {0}")]
    Parse(String),
    #[error("not authenticated: {0}")]
    Auth(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for CatalogError {
    fn from(e: serde_json::Error) -> Self {
        CatalogError::Parse(e.to_string())
    }
}

impl From<ureq::Error> for CatalogError {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::Status(429, _) => CatalogError::RateLimited,
            ureq::Error::Status(401, _) => CatalogError::Auth("access token rejected".into()),
            ureq::Error::Status(code, _) => CatalogError::Status(code),
            ureq::Error::Transport(transport) => CatalogError::Http(transport.to_string()),
        }
    }
}
