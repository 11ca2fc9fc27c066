//! Vault handles.
//!
//! [`VaultHandle`] is the read-only view of an open vault that the policy
//! rules need: vault metadata, a secret-free listing and lookup by id.
//! Parsing a real vault format is the job of whoever implements the trait.
//!
//! [`MemoryVault`] is an in-memory implementation. It is loaded from a JSON
//! [`VaultSnapshot`] (the CLI uses this) or filled entry by entry in tests.
//! Like a real vault reader it builds a fresh [`Credential`] on every read,
//! computing expiry and password age at that moment.
//!
//! # Snapshot format
//!
//! ```json
//! {
//!   "meta": { "name": "Team vault", "key_changed": "2024-01-01T00:00:00Z",
//!             "custom_data": { "KPXC_DECRYPTION_TIME_PREFERENCE": "1000" } },
//!   "entries": [
//!     { "group": ["Root", "Mail"], "title": "Work", "username": "alice",
//!       "password": "…", "attachments": { "key.pem": "<base64>" } }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::age::{PasswordRevision, password_age_hours};
use crate::credential::{Credential, CredentialData, CredentialSummary, is_expired};
use crate::error::{Result, VaultError};
use crate::secret::Secret;

/// Custom-data key under which KeePassXC stores the preferred key
/// derivation time, in milliseconds.
pub const DECRYPTION_TIME_KEY: &str = "KPXC_DECRYPTION_TIME_PREFERENCE";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Non-secret vault-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaultMetadata {
    /// Display name of the vault.
    #[serde(default)]
    pub name: Option<String>,
    /// When the master key last changed.
    #[serde(default)]
    pub key_changed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub custom_data: BTreeMap<String, String>,
}

impl VaultMetadata {
    /// Preferred decryption time in milliseconds, when recorded and numeric.
    ///
    /// A blank value reads as `0` and `Infinity` as an unbounded time.
    pub fn decryption_time_preference(&self) -> Option<f64> {
        self.custom_data
            .get(DECRYPTION_TIME_KEY)
            .and_then(|v| coerce_number(v))
    }
}

fn coerce_number(raw: &str) -> Option<f64> {
    match raw.trim() {
        "" => Some(0.0),
        "Infinity" | "+Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        // `str::parse` also takes `inf` and `NaN` spellings; those are not numbers here.
        s if s.bytes().any(|b| b.is_ascii_alphabetic() && !matches!(b, b'e' | b'E')) => None,
        s => s.parse().ok(),
    }
}

/// The secrets needed to open a vault. Ephemeral; never persisted.
#[derive(Debug, Clone)]
pub struct VaultCredential {
    pub vault_path: PathBuf,
    pub password: Secret,
    /// Second authentication factor, if any.
    pub keyfile_path: Option<PathBuf>,
    /// Whether the user asked for the password to be remembered.
    pub save_password: bool,
}

impl VaultCredential {
    pub fn new(vault_path: impl Into<PathBuf>, password: Secret) -> Self {
        Self {
            vault_path: vault_path.into(),
            password,
            keyfile_path: None,
            save_password: false,
        }
    }

    pub fn with_keyfile(mut self, keyfile: impl Into<PathBuf>) -> Self {
        self.keyfile_path = Some(keyfile.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Handle trait
// ---------------------------------------------------------------------------

/// Read-only access to an open vault.
#[async_trait]
pub trait VaultHandle: Send + Sync {
    fn metadata(&self) -> &VaultMetadata;

    /// Every credential in the vault, without secret material.
    async fn list_credentials(&self) -> Result<Vec<CredentialSummary>>;

    /// A freshly built credential, or `None` when the id is unknown.
    async fn get_credential_by_id(&self, id: &str) -> Result<Option<Credential>>;
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One entry of a [`VaultSnapshot`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VaultEntry {
    /// Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Ancestor group names, outermost first.
    #[serde(default)]
    pub group: Vec<String>,
    pub title: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub password: Secret,
    #[serde(default)]
    pub protected: BTreeMap<String, Secret>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Attachment name to base64 content.
    #[serde(default)]
    pub attachments: BTreeMap<String, String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<PasswordRevision>,
}

impl VaultEntry {
    pub fn new(group: &[&str], title: impl Into<String>, password: impl Into<Secret>) -> Self {
        Self {
            group: group.iter().map(|g| g.to_string()).collect(),
            title: title.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified = Some(at);
        self
    }

    pub fn with_history(mut self, history: Vec<PasswordRevision>) -> Self {
        self.history = history;
        self
    }
}

/// Serialized form of a [`MemoryVault`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VaultSnapshot {
    #[serde(default)]
    pub meta: VaultMetadata,
    #[serde(default)]
    pub entries: Vec<VaultEntry>,
}

impl VaultSnapshot {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ---------------------------------------------------------------------------
// MemoryVault
// ---------------------------------------------------------------------------

struct StoredEntry {
    id: String,
    entry: VaultEntry,
    attachments: BTreeMap<String, Secret>,
}

impl StoredEntry {
    fn path(&self) -> Vec<String> {
        let mut path = self.entry.group.clone();
        path.push(self.entry.title.clone());
        path
    }

    fn build(&self, now: DateTime<Utc>) -> Credential {
        let e = &self.entry;
        Credential {
            id: self.id.clone(),
            path: self.path(),
            has_expiration: e.expires_at.is_some(),
            expired: is_expired(e.expires_at, now),
            expires_at: e.expires_at,
            password_age: password_age_hours(&e.password, e.last_modified, &e.history, now),
            data: CredentialData {
                title: e.title.clone(),
                username: e.username.clone(),
                url: e.url.clone(),
                notes: e.notes.clone(),
                password: e.password.clone(),
                protected: e.protected.clone(),
                fields: e.fields.clone(),
            },
            attachments: self.attachments.clone(),
        }
    }

    fn summary(&self, now: DateTime<Utc>) -> CredentialSummary {
        let e = &self.entry;
        CredentialSummary {
            id: self.id.clone(),
            path: self.path(),
            title: e.title.clone(),
            username: e.username.clone(),
            url: e.url.clone(),
            has_expiration: e.expires_at.is_some(),
            expired: is_expired(e.expires_at, now),
        }
    }

    fn in_group(&self, group: &str) -> bool {
        self.entry.group.iter().any(|g| g.eq_ignore_ascii_case(group))
    }
}

/// In-memory [`VaultHandle`].
pub struct MemoryVault {
    meta: VaultMetadata,
    entries: Vec<StoredEntry>,
}

impl MemoryVault {
    /// Create an empty vault.
    pub fn new(meta: VaultMetadata) -> Self {
        Self {
            meta,
            entries: Vec::new(),
        }
    }

    /// Build a vault from a parsed snapshot.
    pub fn from_snapshot(snapshot: VaultSnapshot) -> Result<Self> {
        let mut vault = Self::new(snapshot.meta);
        for entry in snapshot.entries {
            vault.insert(entry)?;
        }
        Ok(vault)
    }

    /// Read and parse a JSON snapshot file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await?;
        let vault = Self::from_snapshot(VaultSnapshot::from_json(&json)?)?;
        tracing::info!(
            path = %path.display(),
            name = vault.meta.name.as_deref().unwrap_or("???"),
            entries = vault.entries.len(),
            "vault snapshot loaded"
        );
        Ok(vault)
    }

    /// Add an entry and return its id.
    pub fn insert(&mut self, entry: VaultEntry) -> Result<String> {
        let id = entry
            .id
            .clone()
            .unwrap_or_else(|| Uuid::now_v7().to_string());

        if self.entries.iter().any(|e| e.id == id) {
            return Err(VaultError::CredentialAlreadyExists { id });
        }

        let mut attachments = BTreeMap::new();
        for (name, encoded) in &entry.attachments {
            let bytes = BASE64
                .decode(encoded)
                .map_err(|e| VaultError::InvalidAttachment {
                    entry: entry.title.clone(),
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            attachments.insert(name.clone(), Secret::binary(bytes));
        }

        tracing::debug!(id = %id, title = %entry.title, "credential stored");
        self.entries.push(StoredEntry {
            id: id.clone(),
            entry,
            attachments,
        });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Credentials with `group` among their ancestors (case-insensitive).
    pub fn list_in_group(&self, group: &str) -> Vec<CredentialSummary> {
        let now = Utc::now();
        self.entries
            .iter()
            .filter(|e| e.in_group(group))
            .map(|e| e.summary(now))
            .collect()
    }

    /// Look up a credential by title (case-insensitive), optionally
    /// restricted to a group.
    pub fn find(&self, group: Option<&str>, title: &str) -> Option<Credential> {
        let now = Utc::now();
        self.entries
            .iter()
            .filter(|e| group.is_none_or(|g| e.in_group(g)))
            .find(|e| e.entry.title.eq_ignore_ascii_case(title))
            .map(|e| e.build(now))
    }

    /// Fetch a credential or fail with [`VaultError::CredentialNotFound`].
    pub fn get(&self, id: &str) -> Result<Credential> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.build(Utc::now()))
            .ok_or_else(|| VaultError::CredentialNotFound { id: id.to_string() })
    }
}

#[async_trait]
impl VaultHandle for MemoryVault {
    fn metadata(&self) -> &VaultMetadata {
        &self.meta
    }

    async fn list_credentials(&self) -> Result<Vec<CredentialSummary>> {
        let now = Utc::now();
        Ok(self.entries.iter().map(|e| e.summary(now)).collect())
    }

    async fn get_credential_by_id(&self, id: &str) -> Result<Option<Credential>> {
        Ok(self
            .entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.build(Utc::now())))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
