//! Non-interactive Hub actions
//!
//! The catalog sync job and the create-application action authenticate with
//! the client-credentials grant (no PKCE, no user identity) and talk to the
//! Hub directly. Both are full-push, fire-and-forget style jobs: the sync
//! emits the complete entity set every run.

use serde_json::{Value, json};
use tracing::{info, warn};

use crate::config::Config;
use crate::hub::HubClient;
use crate::oidc::{OidcClient, ProviderMetadata};
use crate::{Error, Result};

/// Build a service-authenticated OIDC client and Hub client pair
async fn service_clients(config: &Config) -> Result<(OidcClient, HubClient)> {
    let http = reqwest::Client::builder()
        .timeout(config.hub.upstream_timeout)
        .build()?;

    let metadata = ProviderMetadata::discover(&http, &config.issuer_url()).await?;
    let oidc = OidcClient::new(
        http.clone(),
        metadata,
        config.auth.client_id.clone(),
        config.auth.resolve_secret(),
        config.auth.pkce,
    );
    let hub = HubClient::new(http, config.hub.api_url());

    Ok((oidc, hub))
}

/// Fetch the Hub's application inventory and map it to the full catalog
/// component-entity set.
pub async fn sync_catalog(config: &Config) -> Result<Value> {
    let (oidc, hub) = service_clients(config).await?;

    let tokens = oidc.client_credentials().await?;
    let applications = hub.applications(&tokens.access_token).await?;

    let Some(applications) = applications.as_array() else {
        return Err(Error::Internal(
            "Expected an array of applications from the Hub".to_string(),
        ));
    };

    let api_url = config.hub.api_url();
    let entities: Vec<Value> = applications
        .iter()
        .filter_map(|application| component_entity(&api_url, application))
        .collect();

    info!(count = entities.len(), "Mapped Hub applications to catalog entities");
    Ok(Value::Array(entities))
}

/// Map one Hub application to a catalog component entity
fn component_entity(api_url: &str, application: &Value) -> Option<Value> {
    let name = application.get("name").and_then(Value::as_str)?;
    let id = application.get("id")?;
    let location = format!("url:{api_url}/applications/{id}");

    Some(json!({
        "apiVersion": "catalog/v1alpha1",
        "kind": "Component",
        "metadata": {
            "name": name,
            "namespace": "default",
            "annotations": {
                "managed-by-location": location,
                "managed-by-origin-location": location,
            },
        },
        "spec": {
            "type": "service",
            "lifecycle": "experimental",
            "owner": "unknown",
        },
    }))
}

/// Create an application in the Hub
pub async fn create_application(config: &Config, name: &str, repo: Option<&str>) -> Result<Value> {
    let (oidc, hub) = service_clients(config).await?;

    let tokens = oidc.client_credentials().await?;

    let mut body = json!({ "name": name });
    if let Some(repo) = repo {
        body["repository"] = json!({ "url": repo });
    }

    match hub.create_application(&tokens.access_token, &body).await {
        Ok(created) => {
            info!(name = %name, "Application created in Hub");
            Ok(created)
        }
        Err(e) => {
            warn!(name = %name, error = %e, "Unable to create application in Hub");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_entity_maps_name_and_location() {
        let application = json!({ "id": 7, "name": "payments" });
        let entity = component_entity("https://hub.example.com/hub", &application).unwrap();

        assert_eq!(entity["kind"], "Component");
        assert_eq!(entity["metadata"]["name"], "payments");
        assert_eq!(
            entity["metadata"]["annotations"]["managed-by-location"],
            "url:https://hub.example.com/hub/applications/7"
        );
        assert_eq!(entity["spec"]["type"], "service");
    }

    #[test]
    fn component_entity_skips_nameless_applications() {
        let application = json!({ "id": 7 });
        assert!(component_entity("https://hub.example.com/hub", &application).is_none());
    }
}
