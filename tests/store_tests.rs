//! Durable store tests
//!
//! Exercises the embedded-database store: upsert idempotency, rotation,
//! entity mappings, and the guarantee that the durable side never holds
//! access tokens (only the session cache does).

use hub_gateway::store::{InMemoryTokenStore, RedbTokenStore, TokenStore};

fn temp_store() -> (tempfile::TempDir, RedbTokenStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = RedbTokenStore::open(&dir.path().join("tokens.redb")).unwrap();
    (dir, store)
}

/// Saving the same token twice leaves exactly one row with that value
#[tokio::test]
async fn upsert_is_idempotent() {
    let (_dir, store) = temp_store();

    store.save_refresh_token("u1", "t1").await.unwrap();
    store.save_refresh_token("u1", "t1").await.unwrap();

    assert_eq!(
        store.get_refresh_token("u1").await.unwrap(),
        Some("t1".to_string())
    );
}

/// Saving a differing token replaces the row, never duplicates it
#[tokio::test]
async fn rotation_replaces_the_row() {
    let (_dir, store) = temp_store();

    store.save_refresh_token("u1", "t1").await.unwrap();
    store.save_refresh_token("u1", "t2").await.unwrap();

    assert_eq!(
        store.get_refresh_token("u1").await.unwrap(),
        Some("t2".to_string())
    );
}

/// Identities are independent keys
#[tokio::test]
async fn identities_do_not_collide() {
    let (_dir, store) = temp_store();

    store.save_refresh_token("u1", "t1").await.unwrap();
    store.save_refresh_token("u2", "t2").await.unwrap();

    assert_eq!(
        store.get_refresh_token("u1").await.unwrap(),
        Some("t1".to_string())
    );
    assert_eq!(
        store.get_refresh_token("u2").await.unwrap(),
        Some("t2".to_string())
    );
}

/// A missing identity reads back as absent, not as an error
#[tokio::test]
async fn absent_identity_is_none() {
    let (_dir, store) = temp_store();
    assert_eq!(store.get_refresh_token("nobody").await.unwrap(), None);
}

/// Tokens survive a close/reopen cycle
#[tokio::test]
async fn tokens_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokens.redb");

    {
        let store = RedbTokenStore::open(&path).unwrap();
        store.save_refresh_token("u1", "t1").await.unwrap();
        store.save_application_for_entity("e1", "42").await.unwrap();
    }

    let store = RedbTokenStore::open(&path).unwrap();
    assert_eq!(
        store.get_refresh_token("u1").await.unwrap(),
        Some("t1".to_string())
    );
    assert_eq!(
        store.get_application_for_entity("e1").await.unwrap(),
        Some("42".to_string())
    );
}

/// Entity mappings upsert by entity UID
#[tokio::test]
async fn entity_mapping_upserts() {
    let (_dir, store) = temp_store();

    store.save_application_for_entity("e1", "42").await.unwrap();
    store.save_application_for_entity("e1", "43").await.unwrap();

    assert_eq!(
        store.get_application_for_entity("e1").await.unwrap(),
        Some("43".to_string())
    );
}

/// Refresh tokens and entity mappings live in separate tables
#[tokio::test]
async fn tables_are_disjoint() {
    let (_dir, store) = temp_store();

    store.save_refresh_token("shared-key", "a-token").await.unwrap();

    assert_eq!(
        store.get_application_for_entity("shared-key").await.unwrap(),
        None
    );
}

/// The in-memory store honors the same contract
#[tokio::test]
async fn in_memory_store_matches_contract() {
    let store = InMemoryTokenStore::new();

    store.save_refresh_token("u1", "t1").await.unwrap();
    store.save_refresh_token("u1", "t2").await.unwrap();
    assert_eq!(
        store.get_refresh_token("u1").await.unwrap(),
        Some("t2".to_string())
    );

    store.save_application_for_entity("e1", "42").await.unwrap();
    assert_eq!(
        store.get_application_for_entity("e1").await.unwrap(),
        Some("42".to_string())
    );
}
