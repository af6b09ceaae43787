//! OIDC client adapter for the Hub's identity provider
//!
//! Wraps discovery, PKCE challenge generation, authorization-URL
//! construction, the authorization-code exchange, refresh grants, and the
//! client-credentials grant.

mod client;
mod metadata;

pub use client::{OidcClient, PkcePair, RefreshOutcome, TokenSet, generate_pkce};
pub use metadata::ProviderMetadata;
