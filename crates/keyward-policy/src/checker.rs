//! The security checker.
//!
//! [`SecurityChecker`] is what the vault access layer talks to. It runs the
//! vault catalog when a vault is opened and the credential catalog whenever a
//! credential is handed out, and turns rule engine outcomes into
//! [`PolicyError`]s that name the credential or vault involved.

use std::sync::Arc;

use futures::future::join_all;
use keyward_kernel::{EnforcementReport, KernelError, Rulebook, Selector};
use keyward_vault::{Credential, CredentialSummary, VaultCredential, VaultHandle};

use crate::config::SecurityConfig;
use crate::error::{PolicyError, Result};
use crate::location::{StorageProbe, SystemProbe};
use crate::rules::{CredentialContext, VaultContext, credential_rules, vault_rules};

/// Display name used for vaults without one.
pub const UNNAMED_VAULT: &str = "???";

/// Runs the rule catalogs against vaults and credentials.
#[derive(Clone)]
pub struct SecurityChecker {
    credential_rules: Arc<Rulebook<CredentialContext>>,
    vault_rules: Arc<Rulebook<VaultContext>>,
    probe: Arc<dyn StorageProbe>,
    selector: Selector,
}

impl Default for SecurityChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityChecker {
    /// A checker using the shared catalogs and the system storage probe.
    pub fn new() -> Self {
        Self::with_probe(Arc::new(SystemProbe::new()))
    }

    /// A checker using the shared catalogs and a custom storage probe.
    pub fn with_probe(probe: Arc<dyn StorageProbe>) -> Self {
        Self {
            credential_rules: credential_rules(),
            vault_rules: vault_rules(),
            probe,
            selector: Selector::All,
        }
    }

    /// Only run the rules whose names match `pattern`.
    pub fn with_selector(mut self, pattern: &str) -> Result<Self> {
        self.selector = Selector::new(pattern).map_err(PolicyError::Kernel)?;
        Ok(self)
    }

    pub fn credential_rules(&self) -> &Rulebook<CredentialContext> {
        &self.credential_rules
    }

    pub fn vault_rules(&self) -> &Rulebook<VaultContext> {
        &self.vault_rules
    }

    /// Check a credential about to be handed out.
    pub async fn check_credential_security(
        &self,
        config: Arc<SecurityConfig>,
        credential: Arc<Credential>,
        vault: Arc<dyn VaultHandle>,
    ) -> Result<EnforcementReport> {
        let ctx = CredentialContext {
            config,
            credential,
            vault,
        };
        match self
            .credential_rules
            .enforce_with(&self.selector, &ctx)
            .await
        {
            Ok(report) => Ok(report),
            Err(KernelError::Violation(v)) => Err(PolicyError::CredentialRule {
                credential_id: ctx.credential.id.clone(),
                path: ctx.credential.path.clone(),
                rule: v.rule,
                message: v.message,
                description: v.description,
            }),
            Err(other) => Err(collaborator_or_kernel(other)),
        }
    }

    /// Check a vault that was just opened with `vault_credential`.
    pub async fn check_vault_security(
        &self,
        config: Arc<SecurityConfig>,
        vault: Arc<dyn VaultHandle>,
        vault_credential: Arc<VaultCredential>,
    ) -> Result<EnforcementReport> {
        let ctx = VaultContext {
            config,
            vault,
            vault_credential,
            probe: self.probe.clone(),
        };
        match self.vault_rules.enforce_with(&self.selector, &ctx).await {
            Ok(report) => Ok(report),
            Err(KernelError::Violation(v)) => Err(PolicyError::VaultRule {
                vault_name: ctx
                    .vault
                    .metadata()
                    .name
                    .clone()
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| UNNAMED_VAULT.to_string()),
                rule: v.rule,
                message: v.message,
                description: v.description,
            }),
            Err(other) => Err(collaborator_or_kernel(other)),
        }
    }

    /// Check every credential in a vault. Credentials are checked
    /// concurrently; results come back in listing order.
    pub async fn check_all_credentials(
        &self,
        config: Arc<SecurityConfig>,
        vault: Arc<dyn VaultHandle>,
    ) -> Result<Vec<(CredentialSummary, Result<EnforcementReport>)>> {
        let summaries = vault.list_credentials().await?;
        tracing::info!(credentials = summaries.len(), "checking vault credentials");

        let checks = summaries.into_iter().map(|summary| {
            let (config, vault) = (config.clone(), vault.clone());
            async move {
                let result = match vault.get_credential_by_id(&summary.id).await {
                    Ok(Some(credential)) => {
                        self.check_credential_security(config, Arc::new(credential), vault)
                            .await
                    }
                    Ok(None) => Err(PolicyError::Vault(
                        keyward_vault::VaultError::CredentialNotFound {
                            id: summary.id.clone(),
                        },
                    )),
                    Err(e) => Err(e.into()),
                };
                (summary, result)
            }
        });
        Ok(join_all(checks).await)
    }
}

impl std::fmt::Debug for SecurityChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityChecker")
            .field("credential_rules", &self.credential_rules.len())
            .field("vault_rules", &self.vault_rules.len())
            .field("selector", &self.selector.as_str())
            .finish()
    }
}

fn collaborator_or_kernel(err: KernelError) -> PolicyError {
    match err {
        KernelError::Collaborator { rule, source } => PolicyError::Collaborator { rule, source },
        other => PolicyError::Kernel(other),
    }
}
