//! The credential and vault rule catalogs.
//!
//! Both catalogs are fixed at build time. Each is built on first use, cached
//! for the life of the process and shared through an [`Arc`]:
//!
//! - [`credential_rules`] -- run against a [`CredentialContext`] whenever a
//!   credential is handed out.
//! - [`vault_rules`] -- run against a [`VaultContext`] when a vault is opened.
//!
//! Registration order is part of the contract: rules run in that order and
//! the first violation wins.

pub mod credential;
pub mod vault;

use std::sync::{Arc, OnceLock};

use keyward_kernel::{Activation, KernelError, Rulebook};
use keyward_vault::{Credential, Secret, VaultCredential, VaultHandle};

use crate::complexity::count_character_categories;
use crate::config::{AgeLimit, SecurityConfig};
use crate::location::StorageProbe;

/// Number of character categories a password can draw from.
pub const CHARACTER_CATEGORIES: i64 = 4;

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

/// Everything a credential rule may look at.
#[derive(Clone)]
pub struct CredentialContext {
    pub config: Arc<SecurityConfig>,
    pub credential: Arc<Credential>,
    /// The vault the credential came from, for cross-credential checks.
    pub vault: Arc<dyn VaultHandle>,
}

/// Everything a vault rule may look at.
#[derive(Clone)]
pub struct VaultContext {
    pub config: Arc<SecurityConfig>,
    pub vault: Arc<dyn VaultHandle>,
    pub vault_credential: Arc<VaultCredential>,
    pub probe: Arc<dyn StorageProbe>,
}

// ---------------------------------------------------------------------------
// Catalogs
// ---------------------------------------------------------------------------

static CREDENTIAL_RULES: OnceLock<Arc<Rulebook<CredentialContext>>> = OnceLock::new();
static VAULT_RULES: OnceLock<Arc<Rulebook<VaultContext>>> = OnceLock::new();

/// The credential rule catalog.
pub fn credential_rules() -> Arc<Rulebook<CredentialContext>> {
    CREDENTIAL_RULES
        .get_or_init(|| {
            let book = Arc::new(credential::catalog());
            tracing::info!(rules = book.len(), "credential rule catalog built");
            book
        })
        .clone()
}

/// The vault rule catalog.
pub fn vault_rules() -> Arc<Rulebook<VaultContext>> {
    VAULT_RULES
        .get_or_init(|| {
            let book = Arc::new(vault::catalog());
            tracing::info!(rules = book.len(), "vault rule catalog built");
            book
        })
        .clone()
}

/// Append a rule to a catalog under construction. Names in a catalog are
/// static and distinct, so a duplicate is a bug in the catalog itself.
fn register<C, R>(book: &mut Rulebook<C>, rule: R)
where
    C: Send + Sync + ?Sized,
    R: keyward_kernel::Rule<C> + 'static,
{
    if let Err(KernelError::DuplicateRule { name }) = book.add(rule) {
        tracing::error!(rulebook = book.name(), rule = %name, "duplicate rule skipped");
    }
}

// ---------------------------------------------------------------------------
// Shared checks
// ---------------------------------------------------------------------------

fn disabled_by(setting: &str) -> Activation {
    Activation::disabled(format!("Disabled by security config `{setting}`"))
}

fn check_min_length(min: i64) -> Activation {
    if min < 0 {
        return Activation::misconfigured("Configuration error: Min password length can not be below 0");
    }
    Activation::Enabled
}

fn check_max_age(max: AgeLimit) -> Activation {
    match max {
        AgeLimit::Hours(h) if h <= 0.0 => Activation::misconfigured(
            "Configuration error: Max password age can not be equal to or below 0. \
             If you want this rule to never throw an error, use \"unlimited\".",
        ),
        _ => Activation::Enabled,
    }
}

fn check_min_categories(min: i64) -> Activation {
    if min < 1 {
        return Activation::misconfigured(
            "Configuration error: Min character category count can not be below 1",
        );
    }
    if min > CHARACTER_CATEGORIES {
        return Activation::misconfigured(format!(
            "Configuration error: Min character category count can not be above {CHARACTER_CATEGORIES}"
        ));
    }
    Activation::Enabled
}

/// Categories present in a password. Binary secrets count as none.
fn categories_in(password: &Secret) -> i64 {
    password
        .expose_str()
        .map_or(0, |p| count_character_categories(p) as i64)
}

fn too_short(password: &Secret, min: i64) -> bool {
    (password.len() as i64) < min
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
