//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Hub connection configuration
    pub hub: HubConfig,
    /// Identity-provider (OIDC) configuration
    pub auth: AuthConfig,
    /// Base URLs used for redirect construction
    pub urls: UrlsConfig,
    /// Token broker configuration
    pub broker: BrokerConfig,
    /// Persistent storage configuration
    pub storage: StorageConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7007,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Hub connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Base URL of the Hub installation (the API lives under `{url}/hub`)
    pub url: String,
    /// Timeout applied to every outbound call (Hub and identity provider)
    #[serde(with = "humantime_serde")]
    pub upstream_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            upstream_timeout: Duration::from_secs(10),
        }
    }
}

impl HubConfig {
    /// Base URL of the Hub REST API
    #[must_use]
    pub fn api_url(&self) -> String {
        format!("{}/hub", self.url.trim_end_matches('/'))
    }
}

/// PKCE pair lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PkceMode {
    /// One process-wide verifier/challenge pair, shared by every
    /// authorization attempt. Matches the legacy deployment this gateway
    /// replaces; the pair is a process constant, not a per-flow nonce.
    #[default]
    Shared,
    /// Fresh pair per authorization attempt, threaded through the callback
    /// via the `state` parameter.
    PerAttempt,
}

/// Identity-provider (OIDC) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Realm under `{hub.url}/auth/realms/`
    pub realm: String,
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret (supports `env:VAR_NAME` indirection)
    pub client_secret: String,
    /// PKCE pair lifecycle
    pub pkce: PkceMode,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            realm: "hub".to_string(),
            client_id: "catalog".to_string(),
            client_secret: String::new(),
            pkce: PkceMode::Shared,
        }
    }
}

impl AuthConfig {
    /// Resolve the client secret (expand `env:VAR_NAME` indirection)
    #[must_use]
    pub fn resolve_secret(&self) -> String {
        if let Some(var_name) = self.client_secret.strip_prefix("env:") {
            env::var(var_name).unwrap_or_else(|_| self.client_secret.clone())
        } else {
            self.client_secret.clone()
        }
    }
}

/// Base URLs used when constructing redirect URIs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlsConfig {
    /// This gateway's externally reachable base URL (callback URIs are built
    /// on top of it)
    pub backend_base_url: String,
    /// Front-end base URL, the fallback redirect target after login
    pub frontend_base_url: String,
}

impl Default for UrlsConfig {
    fn default() -> Self {
        Self {
            backend_base_url: "http://localhost:7007".to_string(),
            frontend_base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Token broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Request header carrying the caller identity
    pub identity_header: String,
    /// Access-token TTL applied when the provider omits `expires_in`
    #[serde(with = "humantime_serde")]
    pub default_token_ttl: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            identity_header: "x-identity".to_string(),
            default_token_ttl: Duration::from_secs(60),
        }
    }
}

/// Persistent storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the embedded database file. Empty means
    /// `~/.hub-gateway/tokens.redb`.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: String::new() }
    }
}

impl StorageConfig {
    /// Resolve the database path, defaulting under the home directory.
    pub fn resolve_path(&self) -> Result<std::path::PathBuf> {
        if self.path.is_empty() {
            let home = dirs::home_dir()
                .ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))?;
            Ok(home.join(".hub-gateway").join("tokens.redb"))
        } else {
            Ok(expand_tilde(&self.path).into())
        }
    }
}

fn expand_tilde(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.display().to_string(), 1);
        }
    }
    path.to_string()
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (HUB_GATEWAY_ prefix)
        figment = figment.merge(Env::prefixed("HUB_GATEWAY_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before env var expansion)
        config.load_env_files();

        // Expand ${VAR} in values that commonly carry secrets or host names
        config.expand_env_vars();

        Ok(config)
    }

    /// Issuer URL for the configured realm
    #[must_use]
    pub fn issuer_url(&self) -> String {
        format!(
            "{}/auth/realms/{}",
            self.hub.url.trim_end_matches('/'),
            self.auth.realm
        )
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = expand_tilde(path_str);
            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in config values
    fn expand_env_vars(&mut self) {
        // Pattern: ${VAR} or ${VAR:-default}
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();

        self.hub.url = Self::expand_string(&re, &self.hub.url);
        self.auth.client_secret = Self::expand_string(&re, &self.auth.client_secret);
        self.urls.backend_base_url = Self::expand_string(&re, &self.urls.backend_base_url);
        self.urls.frontend_base_url = Self::expand_string(&re, &self.urls.frontend_base_url);
        self.storage.path = Self::expand_string(&re, &self.storage.path);
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}
