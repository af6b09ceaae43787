//! OIDC Client
//!
//! Confidential-client adapter for the identity provider: authorization-URL
//! construction, authorization-code + PKCE exchange, refresh grants, and the
//! client-credentials grant used by non-interactive callers.

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use dashmap::DashMap;
use rand::RngExt;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;

use super::metadata::ProviderMetadata;
use crate::config::PkceMode;
use crate::{Error, Result};

/// Tokens returned by a successful grant
#[derive(Debug, Clone)]
pub struct TokenSet {
    /// Bearer access token
    pub access_token: String,
    /// Refresh token, when the grant issues one
    pub refresh_token: Option<String>,
    /// Provider-reported lifetime of the access token, in seconds
    pub expires_in: Option<u64>,
}

impl TokenSet {
    /// Cache TTL for the access token, falling back to the given default
    /// when the provider omitted `expires_in`.
    #[must_use]
    pub fn ttl(&self, default: Duration) -> Duration {
        self.expires_in.map_or(default, Duration::from_secs)
    }
}

/// Outcome of a refresh-grant exchange.
///
/// A rejected refresh token is a normal, expected state (expired or revoked
/// provider-side) and routes the caller back into the login flow; it is not
/// an error.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// Provider issued a fresh token set
    Granted(TokenSet),
    /// Provider refused the refresh token
    Rejected,
}

/// A PKCE verifier/challenge pair
#[derive(Debug, Clone)]
pub struct PkcePair {
    /// Plaintext code verifier, sent with the code exchange
    pub verifier: String,
    /// S256 challenge, sent with the authorization request
    pub challenge: String,
}

/// Generate a PKCE code verifier and its S256 challenge
#[must_use]
pub fn generate_pkce() -> PkcePair {
    // 32 random bytes for the verifier
    let verifier_bytes: [u8; 32] = rand::rng().random();
    let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

    // SHA256 hash for the challenge
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let challenge_bytes = hasher.finalize();
    let challenge = URL_SAFE_NO_PAD.encode(challenge_bytes);

    PkcePair {
        verifier,
        challenge,
    }
}

/// Generate a random `state` parameter
fn generate_state() -> String {
    let state_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(state_bytes)
}

/// PKCE material keyed by authorization attempt.
///
/// `Shared` reproduces the legacy behavior of one process-wide pair reused by
/// every attempt. `PerAttempt` generates a fresh pair per authorization URL
/// and parks the verifier under the `state` value until the callback
/// consumes it.
enum PkceState {
    Shared(PkcePair),
    PerAttempt(DashMap<String, String>),
}

/// OIDC client for the configured identity provider
pub struct OidcClient {
    /// HTTP client for token requests
    http: Client,

    /// Discovered provider metadata, read-only after startup
    metadata: ProviderMetadata,

    /// OAuth client ID
    client_id: String,

    /// OAuth client secret
    client_secret: String,

    /// PKCE material per the configured mode
    pkce: PkceState,
}

/// OAuth token response body
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

impl OidcClient {
    /// Create a client from discovered metadata
    #[must_use]
    pub fn new(
        http: Client,
        metadata: ProviderMetadata,
        client_id: String,
        client_secret: String,
        pkce_mode: PkceMode,
    ) -> Self {
        if !metadata.supports_pkce() && !metadata.code_challenge_methods_supported.is_empty() {
            warn!(issuer = %metadata.issuer, "Provider does not advertise S256 PKCE support");
        }

        let pkce = match pkce_mode {
            PkceMode::Shared => PkceState::Shared(generate_pkce()),
            PkceMode::PerAttempt => PkceState::PerAttempt(DashMap::new()),
        };

        Self {
            http,
            metadata,
            client_id,
            client_secret,
            pkce,
        }
    }

    /// Discovered issuer URL
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.metadata.issuer
    }

    /// Build the authorization URL for one login attempt.
    ///
    /// In per-attempt PKCE mode this also generates and parks a fresh
    /// verifier; the returned URL then carries a `state` parameter the
    /// callback must echo.
    pub fn authorization_url(&self, redirect_uri: &str) -> Result<Url> {
        let mut auth_url = Url::parse(&self.metadata.authorization_endpoint)
            .map_err(|e| Error::Internal(format!("Invalid authorization endpoint: {e}")))?;

        let (challenge, state) = match &self.pkce {
            PkceState::Shared(pair) => (pair.challenge.clone(), None),
            PkceState::PerAttempt(pending) => {
                let pair = generate_pkce();
                let state = generate_state();
                pending.insert(state.clone(), pair.verifier);
                (pair.challenge, Some(state))
            }
        };

        {
            let mut params = auth_url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &self.client_id);
            params.append_pair("redirect_uri", redirect_uri);
            params.append_pair("code_challenge", &challenge);
            params.append_pair("code_challenge_method", "S256");
            if let Some(ref state) = state {
                params.append_pair("state", state);
            }
        }

        Ok(auth_url)
    }

    /// Resolve the code verifier for a callback.
    ///
    /// Shared mode ignores `state`; per-attempt mode consumes the parked
    /// verifier and fails the exchange if the state is unknown.
    pub fn verifier_for(&self, state: Option<&str>) -> Result<String> {
        match &self.pkce {
            PkceState::Shared(pair) => Ok(pair.verifier.clone()),
            PkceState::PerAttempt(pending) => {
                let state = state
                    .ok_or_else(|| Error::Exchange("Callback missing state parameter".to_string()))?;
                pending
                    .remove(state)
                    .map(|(_, verifier)| verifier)
                    .ok_or_else(|| Error::Exchange("Unknown authorization state".to_string()))
            }
        }
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Exchange`] when the provider rejects the code or the
    /// response lacks the access or refresh token.
    pub async fn exchange_code(
        &self,
        redirect_uri: &str,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenSet> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("code_verifier", code_verifier),
        ];

        let response = self
            .http
            .post(&self.metadata.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::from_outbound("token endpoint", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Exchange(format!(
                "Code exchange failed: HTTP {status} - {body}"
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Exchange(format!("Failed to parse token response: {e}")))?;

        let (Some(access_token), Some(refresh_token)) =
            (token_response.access_token, token_response.refresh_token)
        else {
            return Err(Error::Exchange(
                "Token response missing access or refresh token".to_string(),
            ));
        };

        debug!("Authorization code exchanged");
        Ok(TokenSet {
            access_token,
            refresh_token: Some(refresh_token),
            expires_in: token_response.expires_in,
        })
    }

    /// Perform a refresh-grant exchange.
    ///
    /// A 4xx from the provider means the refresh token is invalid, expired
    /// or revoked and yields [`RefreshOutcome::Rejected`]; a provider 5xx is
    /// a transient upstream failure and surfaces as [`Error::Upstream`].
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshOutcome> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ];

        let response = self
            .http
            .post(&self.metadata.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::from_outbound("token endpoint", e))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            debug!(status = %status, body = %body, "Refresh grant rejected");
            return Ok(RefreshOutcome::Rejected);
        }
        if !status.is_success() {
            return Err(Error::Upstream {
                status: status.as_u16(),
            });
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Exchange(format!("Failed to parse refresh response: {e}")))?;

        let Some(access_token) = token_response.access_token else {
            debug!("Refresh response carried no access token");
            return Ok(RefreshOutcome::Rejected);
        };

        info!("Refresh grant succeeded");
        Ok(RefreshOutcome::Granted(TokenSet {
            access_token,
            refresh_token: token_response.refresh_token,
            expires_in: token_response.expires_in,
        }))
    }

    /// Service-to-service grant for non-interactive callers. No PKCE.
    pub async fn client_credentials(&self) -> Result<TokenSet> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ];

        let response = self
            .http
            .post(&self.metadata.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::from_outbound("token endpoint", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Exchange(format!(
                "Client-credentials grant failed: HTTP {status} - {body}"
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Exchange(format!("Failed to parse token response: {e}")))?;

        let Some(access_token) = token_response.access_token else {
            return Err(Error::Exchange(
                "Token response missing access token".to_string(),
            ));
        };

        Ok(TokenSet {
            access_token,
            refresh_token: token_response.refresh_token,
            expires_in: token_response.expires_in,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_metadata() -> ProviderMetadata {
        serde_json::from_value(serde_json::json!({
            "issuer": "https://hub.example.com/auth/realms/hub",
            "authorization_endpoint": "https://hub.example.com/auth/realms/hub/protocol/openid-connect/auth",
            "token_endpoint": "https://hub.example.com/auth/realms/hub/protocol/openid-connect/token",
            "code_challenge_methods_supported": ["S256"]
        }))
        .unwrap()
    }

    fn test_client(mode: PkceMode) -> OidcClient {
        OidcClient::new(
            Client::new(),
            test_metadata(),
            "catalog".to_string(),
            "secret".to_string(),
            mode,
        )
    }

    // =========================================================================
    // PKCE generation
    // =========================================================================

    #[test]
    fn pkce_verifier_is_base64url_safe() {
        for _ in 0..10 {
            let pair = generate_pkce();
            assert!(!pair.verifier.contains('+'));
            assert!(!pair.verifier.contains('/'));
            assert!(!pair.verifier.contains('='));
            assert!(!pair.challenge.contains('+'));
            assert!(!pair.challenge.contains('/'));
            assert!(!pair.challenge.contains('='));
        }
    }

    #[test]
    fn pkce_challenge_is_sha256_of_verifier() {
        let pair = generate_pkce();
        let mut hasher = Sha256::new();
        hasher.update(pair.verifier.as_bytes());
        let expected = URL_SAFE_NO_PAD.encode(hasher.finalize());
        assert_eq!(pair.challenge, expected);
    }

    #[test]
    fn pkce_generates_unique_pairs() {
        let a = generate_pkce();
        let b = generate_pkce();
        assert_ne!(a.verifier, b.verifier);
        assert_ne!(a.challenge, b.challenge);
    }

    // =========================================================================
    // Authorization URL
    // =========================================================================

    #[test]
    fn authorization_url_carries_pkce_params() {
        let client = test_client(PkceMode::Shared);
        let url = client
            .authorization_url("http://localhost:7007/cb/u1?continueTo=http%3A%2F%2Flocalhost%3A3000")
            .unwrap();

        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert!(query.iter().any(|(k, v)| k == "response_type" && v == "code"));
        assert!(query.iter().any(|(k, v)| k == "client_id" && v == "catalog"));
        assert!(query.iter().any(|(k, v)| k == "code_challenge_method" && v == "S256"));
        assert!(query.iter().any(|(k, _)| k == "code_challenge"));
        // Shared mode carries no state parameter
        assert!(!query.iter().any(|(k, _)| k == "state"));
    }

    #[test]
    fn shared_mode_reuses_one_challenge() {
        let client = test_client(PkceMode::Shared);
        let a = client.authorization_url("http://localhost/cb/u1").unwrap();
        let b = client.authorization_url("http://localhost/cb/u2").unwrap();

        let challenge = |u: &Url| {
            u.query_pairs()
                .find(|(k, _)| k == "code_challenge")
                .map(|(_, v)| v.into_owned())
                .unwrap()
        };
        assert_eq!(challenge(&a), challenge(&b));
    }

    #[test]
    fn per_attempt_mode_rotates_challenge_and_sets_state() {
        let client = test_client(PkceMode::PerAttempt);
        let a = client.authorization_url("http://localhost/cb/u1").unwrap();
        let b = client.authorization_url("http://localhost/cb/u1").unwrap();

        let param = |u: &Url, name: &str| {
            u.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        };
        assert_ne!(param(&a, "code_challenge"), param(&b, "code_challenge"));
        assert!(param(&a, "state").is_some());
        assert!(param(&b, "state").is_some());
    }

    // =========================================================================
    // Verifier resolution
    // =========================================================================

    #[test]
    fn shared_verifier_ignores_state() {
        let client = test_client(PkceMode::Shared);
        let v1 = client.verifier_for(None).unwrap();
        let v2 = client.verifier_for(Some("anything")).unwrap();
        assert_eq!(v1, v2);
    }

    #[test]
    fn per_attempt_verifier_is_consumed_once() {
        let client = test_client(PkceMode::PerAttempt);
        let url = client.authorization_url("http://localhost/cb/u1").unwrap();
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        assert!(client.verifier_for(Some(&state)).is_ok());
        // Second consumption of the same state must fail
        assert!(client.verifier_for(Some(&state)).is_err());
    }

    #[test]
    fn per_attempt_rejects_missing_state() {
        let client = test_client(PkceMode::PerAttempt);
        assert!(matches!(
            client.verifier_for(None),
            Err(Error::Exchange(_))
        ));
    }

    // =========================================================================
    // TokenSet
    // =========================================================================

    #[test]
    fn ttl_uses_provider_expiry() {
        let set = TokenSet {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_in: Some(120),
        };
        assert_eq!(set.ttl(Duration::from_secs(60)), Duration::from_secs(120));
    }

    #[test]
    fn ttl_falls_back_to_default() {
        let set = TokenSet {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_in: None,
        };
        assert_eq!(set.ttl(Duration::from_secs(60)), Duration::from_secs(60));
    }
}
