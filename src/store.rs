//! Durable token and mapping store
//!
//! Two tables keyed by natural identity, backed by an embedded ACID
//! database:
//!
//! - `refresh_tokens`: caller identity → OAuth refresh token
//! - `entity_applications`: catalog entity UID → Hub application ID
//!
//! Both writes are upserts: at most one row per key. Access tokens are never
//! written here; they live only in the [`crate::cache::SessionCache`].

use std::path::Path;

use dashmap::DashMap;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::{debug, info};

use crate::{Error, Result};

/// Identity → refresh token
const REFRESH_TOKENS: TableDefinition<&str, &str> = TableDefinition::new("refresh_tokens");

/// Entity UID → Hub application ID
const ENTITY_APPLICATIONS: TableDefinition<&str, &str> =
    TableDefinition::new("entity_applications");

fn storage_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Storage(e.to_string())
}

/// Trait abstracting the durable store.
///
/// Implementations must be `Send + Sync` because the store is shared across
/// request-handling tasks. Every operation is a single-key read or upsert;
/// no multi-key transactions are required.
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync + 'static {
    /// Look up the refresh token stored for an identity.
    async fn get_refresh_token(&self, identity: &str) -> Result<Option<String>>;

    /// Upsert the refresh token for an identity.
    ///
    /// A row with the same value is left untouched; a differing value is
    /// updated in place; a missing row is inserted.
    async fn save_refresh_token(&self, identity: &str, token: &str) -> Result<()>;

    /// Look up the Hub application mapped to a catalog entity.
    async fn get_application_for_entity(&self, entity_uid: &str) -> Result<Option<String>>;

    /// Upsert the entity → application mapping.
    async fn save_application_for_entity(
        &self,
        entity_uid: &str,
        application_id: &str,
    ) -> Result<()>;
}

/// Embedded-database store
pub struct RedbTokenStore {
    db: Database,
}

impl RedbTokenStore {
    /// Open (or create) the database and ensure both tables exist.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::Storage(format!("Failed to create storage dir: {e}")))?;
            }
        }

        let db = Database::create(path).map_err(storage_err)?;

        // Opening the tables once up front means later reads never observe
        // a missing table.
        let tx = db.begin_write().map_err(storage_err)?;
        {
            tx.open_table(REFRESH_TOKENS).map_err(storage_err)?;
            tx.open_table(ENTITY_APPLICATIONS).map_err(storage_err)?;
        }
        tx.commit().map_err(storage_err)?;

        info!(path = %path.display(), "Token store opened");
        Ok(Self { db })
    }

    fn read_key(&self, table: TableDefinition<&str, &str>, key: &str) -> Result<Option<String>> {
        let tx = self.db.begin_read().map_err(storage_err)?;
        let table = tx.open_table(table).map_err(storage_err)?;
        let value = table
            .get(key)
            .map_err(storage_err)?
            .map(|guard| guard.value().to_string());
        Ok(value)
    }

    fn upsert_key(&self, table: TableDefinition<&str, &str>, key: &str, value: &str) -> Result<()> {
        let tx = self.db.begin_write().map_err(storage_err)?;
        {
            let mut table = tx.open_table(table).map_err(storage_err)?;
            table.insert(key, value).map_err(storage_err)?;
        }
        tx.commit().map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl TokenStore for RedbTokenStore {
    async fn get_refresh_token(&self, identity: &str) -> Result<Option<String>> {
        if identity.is_empty() {
            return Ok(None);
        }
        self.read_key(REFRESH_TOKENS, identity)
    }

    async fn save_refresh_token(&self, identity: &str, token: &str) -> Result<()> {
        if identity.is_empty() || token.is_empty() {
            return Ok(());
        }

        // Skip the write when the stored value already matches; the broker
        // only calls this on an actual provider-issued rotation, but the
        // store enforces it too.
        if self.read_key(REFRESH_TOKENS, identity)?.as_deref() == Some(token) {
            debug!(identity = %identity, "Refresh token unchanged, skipping write");
            return Ok(());
        }

        self.upsert_key(REFRESH_TOKENS, identity, token)?;
        debug!(identity = %identity, "Refresh token saved");
        Ok(())
    }

    async fn get_application_for_entity(&self, entity_uid: &str) -> Result<Option<String>> {
        if entity_uid.is_empty() {
            return Ok(None);
        }
        self.read_key(ENTITY_APPLICATIONS, entity_uid)
    }

    async fn save_application_for_entity(
        &self,
        entity_uid: &str,
        application_id: &str,
    ) -> Result<()> {
        if entity_uid.is_empty() || application_id.is_empty() {
            return Ok(());
        }
        self.upsert_key(ENTITY_APPLICATIONS, entity_uid, application_id)?;
        debug!(entity = %entity_uid, application = %application_id, "Entity mapping saved");
        Ok(())
    }
}

/// In-memory store for tests and ephemeral deployments
#[derive(Default)]
pub struct InMemoryTokenStore {
    refresh_tokens: DashMap<String, String>,
    entity_applications: DashMap<String, String>,
}

impl InMemoryTokenStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get_refresh_token(&self, identity: &str) -> Result<Option<String>> {
        Ok(self.refresh_tokens.get(identity).map(|v| v.clone()))
    }

    async fn save_refresh_token(&self, identity: &str, token: &str) -> Result<()> {
        if identity.is_empty() || token.is_empty() {
            return Ok(());
        }
        self.refresh_tokens
            .insert(identity.to_string(), token.to_string());
        Ok(())
    }

    async fn get_application_for_entity(&self, entity_uid: &str) -> Result<Option<String>> {
        Ok(self.entity_applications.get(entity_uid).map(|v| v.clone()))
    }

    async fn save_application_for_entity(
        &self,
        entity_uid: &str,
        application_id: &str,
    ) -> Result<()> {
        if entity_uid.is_empty() || application_id.is_empty() {
            return Ok(());
        }
        self.entity_applications
            .insert(entity_uid.to_string(), application_id.to_string());
        Ok(())
    }
}
