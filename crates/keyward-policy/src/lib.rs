//! Keyward security policy.
//!
//! Decides whether a vault and the credentials in it are acceptable under a
//! security configuration:
//!
//! - **[`config`]** -- Presets and partial overrides resolved into a
//!   [`SecurityConfig`].
//! - **[`rules`]** -- The credential and vault rule catalogs.
//! - **[`checker`]** -- [`SecurityChecker`], the entry point that runs the
//!   catalogs and reports violations per credential or vault.
//! - **[`fuzzy`]** -- Approximate substring matching used to spot non-secrets
//!   inside passwords.
//! - **[`complexity`]** -- Character category counting.
//! - **[`location`]** -- Where files live relative to source code
//!   ([`StorageProbe`], [`SystemProbe`]).
//! - **[`error`]** -- Unified policy error types via [`thiserror`].

pub mod checker;
pub mod complexity;
pub mod config;
pub mod error;
pub mod fuzzy;
pub mod location;
pub mod rules;

pub use checker::{SecurityChecker, UNNAMED_VAULT};
pub use complexity::count_character_categories;
pub use config::{
    AgeLimit, CredentialRestriction, Preset, PromptConfig, PromptMethod, SecurityConfig,
    SecurityConfigInput, SecurityConfigOverride, VaultRestriction, resolve_config,
};
pub use error::{PolicyError, Result};
pub use fuzzy::{PartialMatch, Strictness, detect_partial_match};
pub use location::{StorageProbe, SystemProbe};
pub use rules::{CredentialContext, VaultContext, credential_rules, vault_rules};
