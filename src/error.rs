//! Error types for the Hub gateway

use std::io;

use thiserror::Error;

/// Result type alias for the Hub gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Hub gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Identity-provider metadata discovery failed at startup
    #[error("Provider discovery failed: {0}")]
    Discovery(String),

    /// Authorization-code exchange failed or returned an incomplete token set
    #[error("Code exchange failed: {0}")]
    Exchange(String),

    /// Persistent store unavailable or a write failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// The Hub (or identity provider) answered with a non-success status
    #[error("Upstream returned HTTP {status}")]
    Upstream {
        /// Status code to mirror back to the caller
        status: u16,
    },

    /// Network timeout calling the identity provider or the Hub
    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status this error maps to at the router boundary.
    ///
    /// `Storage` is deliberately a 500, never a 401: a store outage must not
    /// masquerade as a missing credential and push users into a re-login loop.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Exchange(_) => 401,
            Self::Upstream { status } => *status,
            Self::UpstreamTimeout(_) => 504,
            _ => 500,
        }
    }

    /// Wrap a reqwest failure, separating timeouts from other transport errors.
    pub(crate) fn from_outbound(context: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::UpstreamTimeout(format!("{context}: {e}"))
        } else {
            Self::Http(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_maps_to_401() {
        assert_eq!(Error::Exchange("denied".to_string()).status_code(), 401);
    }

    #[test]
    fn upstream_status_is_mirrored() {
        assert_eq!(Error::Upstream { status: 404 }.status_code(), 404);
        assert_eq!(Error::Upstream { status: 503 }.status_code(), 503);
    }

    #[test]
    fn storage_is_a_server_error_not_auth() {
        assert_eq!(Error::Storage("db down".to_string()).status_code(), 500);
    }

    #[test]
    fn timeout_is_distinct_from_generic_500() {
        assert_eq!(Error::UpstreamTimeout("hub".to_string()).status_code(), 504);
    }
}
