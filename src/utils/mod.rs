// src/utils/mod.rs

//! Utility functions and helpers.

pub mod http;

use url::Url;

use crate::error::ParseError;

/// Derive the stable listing id from a canonical URL: its last non-empty path segment.
pub fn listing_id_from_url(url: &str) -> Result<String, ParseError> {
    let parsed = Url::parse(url).map_err(|_| ParseError::InvalidUrl(url.to_string()))?;
    parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| s.to_string())
        .ok_or_else(|| ParseError::InvalidUrl(url.to_string()))
}

/// Extract the domain from a URL string.
pub fn get_domain(url_str: &str) -> Option<String> {
    Url::parse(url_str)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_string()))
}
