//! Keyward vault model.
//!
//! The types the policy engine reads from a password vault, independent of
//! any on-disk vault format:
//!
//! - **[`secret`]** -- [`Secret`], a redacted, zeroize-on-drop container with
//!   length-first constant-time equality.
//! - **[`credential`]** -- [`Credential`] and its secret-free
//!   [`CredentialSummary`].
//! - **[`age`]** -- Password age derived from an entry's change history.
//! - **[`store`]** -- The [`VaultHandle`] trait, vault metadata, the
//!   [`VaultCredential`] used to open a vault, and the in-memory
//!   [`MemoryVault`].
//! - **[`error`]** -- Unified vault error types via [`thiserror`].

pub mod age;
pub mod credential;
pub mod error;
pub mod secret;
pub mod store;

pub use age::{MS_PER_HOUR, PasswordRevision, password_age_hours};
pub use credential::{Credential, CredentialData, CredentialSummary};
pub use error::{Result, VaultError};
pub use secret::{REDACTED, Secret, SecretKind};
pub use store::{
    DECRYPTION_TIME_KEY, MemoryVault, VaultCredential, VaultEntry, VaultHandle, VaultMetadata,
    VaultSnapshot,
};
