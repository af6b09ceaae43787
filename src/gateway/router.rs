//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, compression::CompressionLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use url::Url;

use super::broker::{HubToken, broker_middleware};
use crate::cache::SessionCache;
use crate::config::Config;
use crate::hub::HubClient;
use crate::oidc::OidcClient;
use crate::store::TokenStore;
use crate::{Error, Result};

/// Shared application state, built once at startup and passed by reference
pub struct AppState {
    /// Loaded configuration
    pub config: Config,
    /// OIDC client adapter (discovered metadata is read-only after startup)
    pub oidc: OidcClient,
    /// Durable refresh-token and entity-mapping store
    pub store: Arc<dyn TokenStore>,
    /// Ephemeral access-token cache
    pub cache: SessionCache,
    /// Hub API client
    pub hub: HubClient,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/cb/{identity}", get(callback_handler))
        .route("/applications", get(applications_handler))
        .route("/applications/{id}", get(application_handler))
        .route("/application/entity/{id}", get(entity_application_handler))
        .route("/application/entity", post(save_entity_application_handler))
        .route("/issues/{id}", get(issues_handler))
        // Token broker (applied before other layers)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            broker_middleware,
        ))
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Convert an error into its boundary response.
///
/// Upstream failures mirror the Hub's status with `{"status"}`; exchange
/// failures are a bare 401; everything else is a generic 5xx that leaks no
/// internal detail.
pub(crate) fn error_response(err: &Error) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    match err {
        Error::Upstream { status: code } => (status, Json(json!({ "status": code }))).into_response(),
        Error::Exchange(_) => (status, Json(json!({}))).into_response(),
        _ => {
            error!(error = %err, "Request failed");
            (status, Json(json!({ "error": "internal error" }))).into_response()
        }
    }
}

/// Health check handler
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Query parameters delivered to the OAuth callback
#[derive(Debug, Deserialize)]
struct CallbackQuery {
    /// Where to send the browser after a completed login
    #[serde(rename = "continueTo")]
    continue_to: Option<String>,
    /// Authorization code from the identity provider
    code: Option<String>,
    /// State parameter (per-attempt PKCE mode)
    state: Option<String>,
}

/// OAuth callback handler
///
/// Completes the PKCE flow the broker started: exchanges the code, caches
/// the access token, upserts the refresh token, and sends the browser back
/// to `continueTo` (or the front-end base URL).
async fn callback_handler(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    // The redirect URI must be rebuilt byte-for-byte as the broker built it,
    // including the continueTo parameter when present.
    let redirect_uri = match callback_redirect_uri(&state, &identity, query.continue_to.as_deref())
    {
        Ok(uri) => uri,
        Err(e) => return error_response(&e),
    };

    let Some(code) = query.code.as_deref() else {
        warn!(identity = %identity, "Callback without authorization code");
        return (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response();
    };

    let verifier = match state.oidc.verifier_for(query.state.as_deref()) {
        Ok(v) => v,
        Err(e) => return error_response(&e),
    };

    let tokens = match state.oidc.exchange_code(&redirect_uri, code, &verifier).await {
        Ok(t) => t,
        Err(e) => {
            warn!(identity = %identity, error = %e, "Code exchange failed");
            return error_response(&e);
        }
    };

    // exchange_code guarantees a refresh token is present
    let Some(ref refresh_token) = tokens.refresh_token else {
        return (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response();
    };

    state.cache.insert(
        &identity,
        tokens.access_token.clone(),
        tokens.ttl(state.config.broker.default_token_ttl),
    );

    if let Err(e) = state.store.save_refresh_token(&identity, refresh_token).await {
        return error_response(&e);
    }

    info!(identity = %identity, "Login completed");

    let target = query
        .continue_to
        .unwrap_or_else(|| state.config.urls.frontend_base_url.clone());
    Redirect::to(&target).into_response()
}

/// Rebuild the redirect URI used when the authorization URL was issued
fn callback_redirect_uri(
    state: &AppState,
    identity: &str,
    continue_to: Option<&str>,
) -> Result<String> {
    let mut uri = Url::parse(&format!(
        "{}/cb/{}",
        state.config.urls.backend_base_url.trim_end_matches('/'),
        identity
    ))
    .map_err(|e| Error::Internal(format!("Invalid callback URL: {e}")))?;

    if let Some(continue_to) = continue_to {
        uri.query_pairs_mut().append_pair("continueTo", continue_to);
    }

    Ok(uri.into())
}

/// GET /applications — proxy the Hub's application list
async fn applications_handler(
    State(state): State<Arc<AppState>>,
    Extension(HubToken(token)): Extension<HubToken>,
) -> Response {
    match state.hub.applications(&token).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /applications/{id} — proxy one application
async fn application_handler(
    State(state): State<Arc<AppState>>,
    Extension(HubToken(token)): Extension<HubToken>,
    Path(id): Path<String>,
) -> Response {
    match state.hub.application(&token, &id).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /issues/{id} — proxy analysis issues for an application
async fn issues_handler(
    State(state): State<Arc<AppState>>,
    Extension(HubToken(token)): Extension<HubToken>,
    Path(id): Path<String>,
) -> Response {
    match state.hub.issues(&token, &id).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /application/entity/{id} — resolve the mapped application and proxy it
async fn entity_application_handler(
    State(state): State<Arc<AppState>>,
    Extension(HubToken(token)): Extension<HubToken>,
    Path(entity_uid): Path<String>,
) -> Response {
    let application_id = match state.store.get_application_for_entity(&entity_uid).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, Json(json!({ "status": 404 }))).into_response();
        }
        Err(e) => return error_response(&e),
    };

    match state.hub.application(&token, &application_id).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Body of POST /application/entity
#[derive(Debug, Deserialize)]
struct SaveMappingRequest {
    #[serde(rename = "entityID")]
    entity_id: String,
    #[serde(rename = "applicationID")]
    application_id: String,
}

/// POST /application/entity — upsert the entity → application mapping
async fn save_entity_application_handler(
    State(state): State<Arc<AppState>>,
    Extension(HubToken(token)): Extension<HubToken>,
    Json(body): Json<SaveMappingRequest>,
) -> Response {
    if let Err(e) = state
        .store
        .save_application_for_entity(&body.entity_id, &body.application_id)
        .await
    {
        return error_response(&e);
    }

    info!(entity = %body.entity_id, application = %body.application_id, "Entity mapping saved");

    // Hand the mapped application back so the caller sees what it linked
    match state.hub.application(&token, &body.application_id).await {
        Ok(hub_body) => Json(hub_body).into_response(),
        Err(e) => error_response(&e),
    }
}
