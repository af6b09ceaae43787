//! OIDC Provider Metadata Discovery
//!
//! Fetches the issuer's `/.well-known/openid-configuration` document once at
//! startup. The gateway cannot serve authenticated routes without it.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// OIDC provider metadata (the subset this gateway consumes)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Issuer URL
    pub issuer: String,

    /// Authorization endpoint URL
    pub authorization_endpoint: String,

    /// Token endpoint URL
    pub token_endpoint: String,

    /// Userinfo endpoint (optional)
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,

    /// End-session endpoint (optional)
    #[serde(default)]
    pub end_session_endpoint: Option<String>,

    /// Supported grant types
    #[serde(default)]
    pub grant_types_supported: Vec<String>,

    /// Supported response types
    #[serde(default)]
    pub response_types_supported: Vec<String>,

    /// Supported PKCE code challenge methods
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
}

impl ProviderMetadata {
    /// Discover provider metadata from an issuer base URL
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] if the metadata endpoint is unreachable
    /// or returns invalid data. Callers treat this as fatal.
    pub async fn discover(client: &Client, issuer_url: &str) -> Result<Self> {
        let url = format!(
            "{}/.well-known/openid-configuration",
            issuer_url.trim_end_matches('/')
        );
        debug!(url = %url, "Discovering OIDC provider metadata");

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Discovery(format!("Failed to fetch provider metadata: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Discovery(format!(
                "Provider metadata discovery failed: HTTP {}",
                response.status()
            )));
        }

        let metadata: Self = response
            .json()
            .await
            .map_err(|e| Error::Discovery(format!("Failed to parse provider metadata: {e}")))?;

        debug!(issuer = %metadata.issuer, "Discovered identity provider");
        Ok(metadata)
    }

    /// Check if PKCE is supported (S256 method)
    #[must_use]
    pub fn supports_pkce(&self) -> bool {
        self.code_challenge_methods_supported
            .contains(&"S256".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_metadata_full() {
        let json = r#"{
            "issuer": "https://hub.example.com/auth/realms/hub",
            "authorization_endpoint": "https://hub.example.com/auth/realms/hub/protocol/openid-connect/auth",
            "token_endpoint": "https://hub.example.com/auth/realms/hub/protocol/openid-connect/token",
            "code_challenge_methods_supported": ["plain", "S256"],
            "grant_types_supported": ["authorization_code", "refresh_token", "client_credentials"],
            "response_types_supported": ["code"]
        }"#;
        let meta: ProviderMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.issuer, "https://hub.example.com/auth/realms/hub");
        assert!(meta.supports_pkce());
        assert!(meta.userinfo_endpoint.is_none());
    }

    #[test]
    fn deserialize_metadata_minimal() {
        let json = r#"{
            "issuer": "https://auth.example.com",
            "authorization_endpoint": "https://auth.example.com/authorize",
            "token_endpoint": "https://auth.example.com/token"
        }"#;
        let meta: ProviderMetadata = serde_json::from_str(json).unwrap();
        assert!(meta.code_challenge_methods_supported.is_empty());
        assert!(!meta.supports_pkce());
    }

    #[test]
    fn supports_pkce_requires_s256() {
        let json = r#"{
            "issuer": "https://auth.example.com",
            "authorization_endpoint": "https://auth.example.com/authorize",
            "token_endpoint": "https://auth.example.com/token",
            "code_challenge_methods_supported": ["plain"]
        }"#;
        let meta: ProviderMetadata = serde_json::from_str(json).unwrap();
        assert!(!meta.supports_pkce());
    }
}
