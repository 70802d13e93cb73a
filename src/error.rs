// src/error.rs

//! Unified error handling for the listing monitor.

use std::fmt;

use thiserror::Error;

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Failure while fetching a listing document from the marketplace.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Remote answered 404
    #[error("Listing not found: {url}")]
    NotFound { url: String },

    /// Remote answered 400
    #[error("Invalid request: {url}")]
    InvalidRequest { url: String },

    /// Connection failures, timeouts and every other status
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },
}

impl FetchError {
    /// Create a transport error for a URL.
    pub fn transport(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Classify an HTTP status returned for `url`.
    pub fn from_status(url: impl Into<String>, status: u16) -> Self {
        let url = url.into();
        match status {
            404 => Self::NotFound { url },
            400 => Self::InvalidRequest { url },
            other => Self::Transport {
                url,
                message: format!("HTTP status {other}"),
            },
        }
    }
}

/// Failure while extracting a snapshot from a fetched document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The URL carries no usable listing id
    #[error("Invalid listing URL: {0}")]
    InvalidUrl(String),

    /// The title element is absent
    #[error("Listing title not found")]
    MissingTitle,

    /// A configured CSS selector does not parse
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },
}

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Listing document could not be fetched
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Listing document could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Notification channel failure
    #[error("Dispatch error via {channel}: {message}")]
    Dispatch { channel: String, message: String },

    /// History store failure
    #[error("Store error: {0}")]
    Store(String),

    /// A listing task ended abnormally
    #[error("Task error: {0}")]
    Task(String),

    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a dispatch error for a channel.
    pub fn dispatch(channel: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Dispatch {
            channel: channel.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error is terminal for one listing in one cycle only.
    pub fn is_listing_failure(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Parse(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_from_status() {
        assert_eq!(
            FetchError::from_status("u", 404),
            FetchError::NotFound { url: "u".into() }
        );
        assert_eq!(
            FetchError::from_status("u", 400),
            FetchError::InvalidRequest { url: "u".into() }
        );
        assert!(matches!(
            FetchError::from_status("u", 503),
            FetchError::Transport { .. }
        ));
    }

    #[test]
    fn test_listing_failure_classification() {
        assert!(AppError::from(ParseError::MissingTitle).is_listing_failure());
        assert!(AppError::from(FetchError::transport("u", "reset")).is_listing_failure());
        assert!(!AppError::store("disk full").is_listing_failure());
    }
}
