//! Policy error types.
//!
//! [`PolicyError`] is the single error type of this crate. Rule violations
//! carry the failing rule's name, message and description together with the
//! credential or vault they were raised for. Collaborator failures (vault
//! reads, filesystem and VCS probes) are kept apart from violations.

use keyward_kernel::KernelError;
use keyward_vault::VaultError;

/// Unified error type for the Keyward policy engine.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    // -- Violations ---------------------------------------------------------
    /// A credential does not satisfy a credential rule.
    #[error("credential `{}` violates {rule}: {message}", path.join("/"))]
    CredentialRule {
        credential_id: String,
        path: Vec<String>,
        rule: String,
        message: String,
        description: Option<String>,
    },

    /// A vault does not satisfy a vault rule.
    #[error("vault `{vault_name}` violates {rule}: {message}")]
    VaultRule {
        /// The vault's display name, `???` when it has none.
        vault_name: String,
        rule: String,
        message: String,
        description: Option<String>,
    },

    /// A rule could not be evaluated because a collaborator failed.
    #[error("rule `{rule}` could not be evaluated: {source}")]
    Collaborator {
        rule: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // -- Configuration errors -----------------------------------------------
    /// The named security preset does not exist.
    #[error("unknown security preset: {name} (expected one of none, basic, good, better)")]
    UnknownPreset { name: String },

    /// The named prompt method does not exist.
    #[error("unknown prompt method: {name}")]
    UnknownPromptMethod { name: String },

    /// A configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// TOML configuration could not be parsed.
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration could not be rendered as TOML.
    #[error("failed to render TOML: {0}")]
    TomlRender(#[from] toml::ser::Error),

    /// JSON configuration could not be parsed or rendered.
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    // -- Probe errors -------------------------------------------------------
    /// A storage probe command failed or timed out.
    #[error("storage probe failed: {reason}")]
    Probe { reason: String },

    // -- Underlying errors --------------------------------------------------
    /// Rule engine error that is neither a violation nor a collaborator
    /// failure (e.g. an invalid selector).
    #[error("rule engine error: {0}")]
    Kernel(KernelError),

    /// Vault model error.
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),
}

impl PolicyError {
    /// `true` for credential and vault rule violations.
    pub fn is_violation(&self) -> bool {
        matches!(self, Self::CredentialRule { .. } | Self::VaultRule { .. })
    }

    /// Name of the rule involved, if any.
    pub fn rule(&self) -> Option<&str> {
        match self {
            Self::CredentialRule { rule, .. }
            | Self::VaultRule { rule, .. }
            | Self::Collaborator { rule, .. } => Some(rule),
            _ => None,
        }
    }

    /// Message followed by the rule description, separated by a newline.
    pub fn detailed_message(&self) -> String {
        match self {
            Self::CredentialRule {
                message,
                description,
                ..
            }
            | Self::VaultRule {
                message,
                description,
                ..
            } => match description {
                Some(d) => format!("{message}\n{d}"),
                None => message.clone(),
            },
            other => other.to_string(),
        }
    }
}

/// Convenience alias used throughout the policy crate.
pub type Result<T> = std::result::Result<T, PolicyError>;
