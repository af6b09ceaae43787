//! Token broker middleware
//!
//! Every inbound request (except the health and OAuth-callback paths) passes
//! through here. The broker resolves the caller identity to a valid Hub
//! access token: session-cache hit, transparent refresh-grant against the
//! identity provider, or a 401 carrying a fresh authorization URL when no
//! usable credential exists. Downstream handlers only ever see the
//! [`HubToken`] request extension.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use super::router::{AppState, error_response};
use crate::Result;
use crate::oidc::RefreshOutcome;

/// Identity assigned to requests that carry no caller identity.
///
/// Unauthenticated and service contexts are deliberately let through under
/// this sentinel instead of being rejected; they share one broker slot.
pub const IDENTITY_SENTINEL: &str = "undefined";

/// Request extension carrying the resolved Hub access token
#[derive(Debug, Clone)]
pub struct HubToken(pub String);

/// Outcome of token resolution for one request
enum Resolution {
    /// A valid access token, ready to attach
    Token(String),
    /// No usable credential; the caller must visit this authorization URL
    LoginRequired(String),
}

/// Token broker middleware
pub async fn broker_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();

    // Health and callback paths bypass the broker entirely
    if path.starts_with("/health") || path.starts_with("/cb") {
        return next.run(request).await;
    }

    let identity = request
        .headers()
        .get(&state.config.broker.identity_header)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(IDENTITY_SENTINEL)
        .to_string();

    // Remember where the caller came from so the callback can send the
    // browser back after login.
    let referer = request
        .headers()
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    match resolve_token(&state, &identity, referer.as_deref()).await {
        Ok(Resolution::Token(token)) => {
            request.extensions_mut().insert(HubToken(token));
            next.run(request).await
        }
        Ok(Resolution::LoginRequired(login_url)) => {
            debug!(identity = %identity, "No usable credential, issuing login URL");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "loginURL": login_url })),
            )
                .into_response()
        }
        Err(e) => {
            warn!(identity = %identity, error = %e, "Token resolution failed");
            error_response(&e)
        }
    }
}

/// Resolve an identity to an access token, or to a login redirect.
///
/// State machine: cache hit → done; cache miss + stored refresh token →
/// refresh grant (rotating the stored token if the provider issued a new
/// one); cache miss + no stored token, or a rejected refresh → login URL.
/// Storage failures propagate; they are never treated as "no token".
async fn resolve_token(
    state: &AppState,
    identity: &str,
    referer: Option<&str>,
) -> Result<Resolution> {
    if let Some(token) = state.cache.get(identity) {
        return Ok(Resolution::Token(token));
    }

    let Some(stored) = state.store.get_refresh_token(identity).await? else {
        return Ok(Resolution::LoginRequired(login_url(
            state, identity, referer,
        )?));
    };

    match state.oidc.refresh(&stored).await? {
        RefreshOutcome::Granted(tokens) => {
            state.cache.insert(
                identity,
                tokens.access_token.clone(),
                tokens.ttl(state.config.broker.default_token_ttl),
            );

            // Persist a provider-issued rotation, and only a rotation. The
            // write is awaited; a storage failure fails the request rather
            // than silently dropping the new token.
            if let Some(ref rotated) = tokens.refresh_token {
                if rotated != &stored {
                    state.store.save_refresh_token(identity, rotated).await?;
                    info!(identity = %identity, "Refresh token rotated");
                }
            }

            Ok(Resolution::Token(tokens.access_token))
        }
        // The stale stored token is left in place; provider-side revocation
        // is the only removal path.
        RefreshOutcome::Rejected => Ok(Resolution::LoginRequired(login_url(
            state, identity, referer,
        )?)),
    }
}

/// Build the authorization URL for an identity.
///
/// The redirect URI targets this gateway's callback for the identity and
/// always carries a `continueTo` parameter: the referring page when known,
/// else the configured front-end base URL.
pub fn login_url(state: &AppState, identity: &str, referer: Option<&str>) -> Result<String> {
    let mut redirect_uri = Url::parse(&format!(
        "{}/cb/{}",
        state.config.urls.backend_base_url.trim_end_matches('/'),
        identity
    ))
    .map_err(|e| crate::Error::Internal(format!("Invalid callback URL: {e}")))?;

    redirect_uri.query_pairs_mut().append_pair(
        "continueTo",
        referer.unwrap_or(&state.config.urls.frontend_base_url),
    );

    let authorization_url = state.oidc.authorization_url(redirect_uri.as_str())?;
    Ok(authorization_url.to_string())
}
