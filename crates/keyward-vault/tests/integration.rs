//! Integration tests for the keyward-vault crate.
//!
//! These tests load vault snapshots from disk and read credentials back
//! through the [`VaultHandle`] trait object the policy engine consumes.

use std::io::Write;
use std::sync::Arc;

use chrono::{Duration, Utc};
use keyward_vault::{
    MemoryVault, PasswordRevision, Secret, VaultEntry, VaultError, VaultHandle, VaultMetadata,
};

const SNAPSHOT: &str = r#"{
    "meta": { "name": "Ops", "key_changed": "2023-06-01T12:00:00Z" },
    "entries": [
        { "id": "db", "group": ["Root", "Infra"], "title": "Postgres",
          "username": "admin", "url": "https://db.internal.example.com",
          "password": "Tr0ub4dor&3", "fields": { "port": "5432" } },
        { "id": "ci", "group": ["Root", "Infra"], "title": "CI token",
          "password": "Tr0ub4dor&3", "expires_at": "2001-01-01T00:00:00Z" }
    ]
}"#;

fn write_snapshot(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

// ═══════════════════════════════════════════════════════════════════════
//  Snapshot loading
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn load_snapshot_from_disk() {
    let file = write_snapshot(SNAPSHOT);
    let vault = MemoryVault::load(file.path()).await.unwrap();

    assert_eq!(vault.len(), 2);
    assert_eq!(vault.metadata().name.as_deref(), Some("Ops"));
    assert!(vault.metadata().key_changed.is_some());

    let listing = vault.list_credentials().await.unwrap();
    let paths: Vec<_> = listing.iter().map(|s| s.path.join("/")).collect();
    assert_eq!(paths, vec!["Root/Infra/Postgres", "Root/Infra/CI token"]);
    assert!(listing[1].expired);
    assert!(!listing[0].has_expiration);
}

#[tokio::test]
async fn malformed_snapshot_is_a_serialization_error() {
    let file = write_snapshot("{ not json");
    let err = MemoryVault::load(file.path()).await.err().unwrap();
    assert!(matches!(err, VaultError::Serialization(_)));
}

#[tokio::test]
async fn missing_snapshot_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = MemoryVault::load(dir.path().join("nope.json"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, VaultError::Io(_)));
}

// ═══════════════════════════════════════════════════════════════════════
//  Reading through the handle trait
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn handle_returns_fresh_credentials() {
    let file = write_snapshot(SNAPSHOT);
    let vault: Arc<dyn VaultHandle> = Arc::new(MemoryVault::load(file.path()).await.unwrap());

    let db = vault.get_credential_by_id("db").await.unwrap().unwrap();
    let ci = vault.get_credential_by_id("ci").await.unwrap().unwrap();

    assert_eq!(db.data.fields["port"], "5432");
    assert!(db.data.password.equals(&ci.data.password));
    assert!(ci.expired);

    // Two reads are independent values.
    let again = vault.get_credential_by_id("db").await.unwrap().unwrap();
    assert_eq!(again.id, db.id);
    assert!(again.data.password.equals(&db.data.password));
}

#[tokio::test]
async fn password_age_follows_history() {
    let now = Utc::now();
    let mut vault = MemoryVault::new(VaultMetadata::default());
    let id = vault
        .insert(
            VaultEntry::new(&["Root"], "Shop", "same-password")
                .with_last_modified(now - Duration::hours(1))
                .with_history(vec![
                    PasswordRevision {
                        password: Some(Secret::text("same-password")),
                        modified_at: Some(now - Duration::hours(30)),
                    },
                    PasswordRevision {
                        password: Some(Secret::text("first-password")),
                        modified_at: Some(now - Duration::hours(90)),
                    },
                ]),
        )
        .unwrap();

    let c = vault.get_credential_by_id(&id).await.unwrap().unwrap();
    assert!(c.password_age >= 30.0 && c.password_age < 30.1);
}
