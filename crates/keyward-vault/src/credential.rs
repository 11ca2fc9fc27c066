//! The credential shape consumed by policy rules.
//!
//! A [`Credential`] is built fresh from vault storage on every read and is
//! never mutated by the policy engine. Secret material (the password, custom
//! protected fields, attachments) lives in [`Secret`] containers; everything
//! else is plain data that may be logged or displayed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::secret::Secret;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Entry fields of a credential.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CredentialData {
    pub title: String,
    pub username: String,
    pub url: String,
    pub notes: String,
    pub password: Secret,
    /// Custom protected attributes, keyed by field name.
    pub protected: BTreeMap<String, Secret>,
    /// Custom plain attributes, keyed by field name.
    pub fields: BTreeMap<String, String>,
}

/// A single vault entry as seen by the credential rules.
#[derive(Debug, Clone, Serialize)]
pub struct Credential {
    /// Stable identifier of the entry inside its vault.
    pub id: String,
    /// Ancestor group names followed by the entry title.
    pub path: Vec<String>,
    pub has_expiration: bool,
    /// `true` only when `has_expiration` is set and the expiry has passed.
    pub expired: bool,
    pub expires_at: Option<DateTime<Utc>>,
    /// Hours since the password last actually changed.
    pub password_age: f64,
    pub data: CredentialData,
    pub attachments: BTreeMap<String, Secret>,
}

impl Credential {
    /// The path joined with `/`, as shown in diagnostics.
    pub fn display_path(&self) -> String {
        self.path.join("/")
    }

    /// The non-secret view of this credential.
    pub fn summary(&self) -> CredentialSummary {
        CredentialSummary {
            id: self.id.clone(),
            path: self.path.clone(),
            title: self.data.title.clone(),
            username: self.data.username.clone(),
            url: self.data.url.clone(),
            has_expiration: self.has_expiration,
            expired: self.expired,
        }
    }
}

/// A credential without any secret material. Returned by vault listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialSummary {
    pub id: String,
    pub path: Vec<String>,
    pub title: String,
    pub username: String,
    pub url: String,
    pub has_expiration: bool,
    pub expired: bool,
}

/// Expiry state at `now`.
pub fn is_expired(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.is_some_and(|at| at <= now)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
