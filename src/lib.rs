//! Hub Gateway Library
//!
//! Integrates a software catalog with an external application-modernization
//! Hub. Three jobs:
//!
//! - **Token broker**: per-request middleware that resolves a caller
//!   identity to a valid Hub access token, transparently refreshing expired
//!   tokens or issuing a PKCE authorization redirect when no credential
//!   exists.
//! - **Proxy**: authenticated pass-through to the Hub's application and
//!   analysis endpoints.
//! - **Mapping**: durable identity → refresh-token and entity → application
//!   storage.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod hub;
pub mod oidc;
pub mod store;
pub mod sync;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
