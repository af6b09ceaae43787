//! Hub API client
//!
//! Thin authenticated proxy layer over the Hub's REST API. Responses are
//! passed through as raw JSON; a non-200 from the Hub becomes
//! [`Error::Upstream`] carrying the status to mirror back to the caller.

use reqwest::Client;
use serde_json::Value;
use tracing::warn;

use crate::{Error, Result};

/// Client for the Hub REST API
pub struct HubClient {
    /// HTTP client (carries the upstream timeout)
    http: Client,

    /// Base URL of the Hub API (`{hub_url}/hub`)
    api_url: String,
}

impl HubClient {
    /// Create a client for the given Hub API base URL
    #[must_use]
    pub fn new(http: Client, api_url: String) -> Self {
        Self { http, api_url }
    }

    /// List all applications
    pub async fn applications(&self, access_token: &str) -> Result<Value> {
        self.get(&format!("{}/applications", self.api_url), access_token)
            .await
    }

    /// Fetch one application by ID
    pub async fn application(&self, access_token: &str, id: &str) -> Result<Value> {
        self.get(
            &format!("{}/applications/{id}", self.api_url),
            access_token,
        )
        .await
    }

    /// Fetch analysis issues for an application
    pub async fn issues(&self, access_token: &str, id: &str) -> Result<Value> {
        self.get(
            &format!("{}/applications/{id}/analysis/issues", self.api_url),
            access_token,
        )
        .await
    }

    /// Create an application (service-credential callers)
    pub async fn create_application(&self, access_token: &str, body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}/applications", self.api_url))
            .header("Accept", "application/json, text/plain, */*")
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::from_outbound("hub", e))?;

        Self::into_json(response).await
    }

    async fn get(&self, url: &str, access_token: &str) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json, text/plain, */*")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::from_outbound("hub", e))?;

        Self::into_json(response).await
    }

    async fn into_json(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Hub request failed");
            return Err(Error::Upstream {
                status: status.as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Failed to parse Hub response: {e}")))
    }
}
