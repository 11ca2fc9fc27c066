//! Vault error types.
//!
//! All vault subsystems surface errors through [`VaultError`], the single
//! error type returned by every public API in this crate.

/// Unified error type for the Keyward vault model.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Store errors -------------------------------------------------------
    /// The requested credential does not exist.
    #[error("credential not found: {id}")]
    CredentialNotFound { id: String },

    /// A credential with this id is already stored.
    #[error("credential already exists: {id}")]
    CredentialAlreadyExists { id: String },

    /// An attachment in a snapshot is not valid base64.
    #[error("invalid attachment `{name}` on `{entry}`: {reason}")]
    InvalidAttachment {
        entry: String,
        name: String,
        reason: String,
    },

    /// The vault backend could not be read.
    #[error("vault unavailable: {reason}")]
    Unavailable { reason: String },

    // -- Underlying errors --------------------------------------------------
    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from the filesystem.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;
