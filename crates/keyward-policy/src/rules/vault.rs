//! Vault rules, in registration order.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use keyward_kernel::{Activation, Rule, RuleFailure, Rulebook, Verdict};
use keyward_vault::MS_PER_HOUR;

use super::{
    VaultContext, categories_in, check_max_age, check_min_categories, check_min_length,
    disabled_by, register, too_short,
};
use crate::config::AgeLimit;
use crate::fuzzy::{Strictness, detect_partial_match};
use crate::location::parent_dir;

pub(super) fn catalog() -> Rulebook<VaultContext> {
    let mut book = Rulebook::new("vault");
    register(&mut book, PasswordAge);
    register(&mut book, MinCharacterCategories);
    register(&mut book, ForbidReuse);
    register(&mut book, PasswordLength);
    register(&mut book, DecryptionTime);
    register(&mut book, KeyfileRequire);
    register(&mut book, KeyfileStoredWithCode);
    register(&mut book, ForbidVaultName);
    register(&mut book, ForbidVaultPath);
    register(&mut book, StoredWithCode);
    register(&mut book, StoredWithKeyfile);
    book
}

fn no_keyfile() -> Activation {
    Activation::disabled("No keyfile defined")
}

// ---------------------------------------------------------------------------
// Master password
// ---------------------------------------------------------------------------

pub struct PasswordAge;

#[async_trait]
impl Rule<VaultContext> for PasswordAge {
    fn name(&self) -> &'static str {
        "vault/password/age"
    }

    fn description(&self) -> &'static str {
        "Ensure that the vault password is not used for too long.\n\n\
         Teams change, and people who left may still know the password. Rotating it \
         periodically limits how long a former member or an accidental exposure keeps \
         the vault open."
    }

    async fn enable(&self, ctx: &VaultContext) -> Activation {
        check_max_age(ctx.config.vault_restrictions.max_password_age)
    }

    async fn define(&self, ctx: &VaultContext) -> Verdict {
        let max = ctx.config.vault_restrictions.max_password_age;
        if max == AgeLimit::Unlimited {
            return Ok(());
        }

        let Some(changed) = ctx.vault.metadata().key_changed else {
            return Err(RuleFailure::violation(
                "Could not find when the vault password was last changed. Assuming the worst.",
            ));
        };

        let age = (Utc::now() - changed).num_milliseconds() as f64 / MS_PER_HOUR;
        if max.is_exceeded_by(age) {
            return Err(RuleFailure::violation("Vault password is too old, change it"));
        }
        Ok(())
    }
}

pub struct MinCharacterCategories;

#[async_trait]
impl Rule<VaultContext> for MinCharacterCategories {
    fn name(&self) -> &'static str {
        "vault/password/complexity/min-character-categories"
    }

    fn description(&self) -> &'static str {
        "Ensure that the vault password mixes character categories.\n\n\
         The categories are lowercase letters, uppercase letters, digits and symbols."
    }

    async fn enable(&self, ctx: &VaultContext) -> Activation {
        check_min_categories(
            ctx.config
                .vault_restrictions
                .password_complexity
                .min_character_categories,
        )
    }

    async fn define(&self, ctx: &VaultContext) -> Verdict {
        let min = ctx
            .config
            .vault_restrictions
            .password_complexity
            .min_character_categories;
        if min == 1 {
            return Ok(());
        }

        let count = categories_in(&ctx.vault_credential.password);
        if count < min {
            return Err(RuleFailure::violation(format!(
                "Vault password not complex enough. \
                 Should contain at least {min} characters categories but only contains {count}."
            )));
        }
        Ok(())
    }
}

pub struct ForbidReuse;

#[async_trait]
impl Rule<VaultContext> for ForbidReuse {
    fn name(&self) -> &'static str {
        "vault/password/complexity/forbid-reuse"
    }

    fn description(&self) -> &'static str {
        "Ensure that the vault password is not also the password of a credential inside it.\n\n\
         A credential leaked on its own would otherwise hand over the whole vault."
    }

    async fn enable(&self, ctx: &VaultContext) -> Activation {
        if !ctx.config.vault_restrictions.password_complexity.forbid_reuse {
            return disabled_by("forbid_reuse");
        }
        if ctx.vault_credential.password.is_empty() {
            return Activation::disabled("No vault password, nothing to check");
        }
        Activation::Enabled
    }

    async fn define(&self, ctx: &VaultContext) -> Verdict {
        let password = &ctx.vault_credential.password;
        let summaries = ctx
            .vault
            .list_credentials()
            .await
            .map_err(RuleFailure::collaborator)?;

        for summary in &summaries {
            let Some(credential) = ctx
                .vault
                .get_credential_by_id(&summary.id)
                .await
                .map_err(RuleFailure::collaborator)?
            else {
                continue;
            };

            if password.equals(&credential.data.password) {
                return Err(RuleFailure::violation(format!(
                    "Vault password is used by a credential: '{}'",
                    credential.display_path()
                )));
            }
        }
        Ok(())
    }
}

pub struct PasswordLength;

#[async_trait]
impl Rule<VaultContext> for PasswordLength {
    fn name(&self) -> &'static str {
        "vault/password/length"
    }

    fn description(&self) -> &'static str {
        "Enforce a minimum vault password length."
    }

    async fn enable(&self, ctx: &VaultContext) -> Activation {
        check_min_length(ctx.config.vault_restrictions.min_password_length)
    }

    async fn define(&self, ctx: &VaultContext) -> Verdict {
        let min = ctx.config.vault_restrictions.min_password_length;
        if too_short(&ctx.vault_credential.password, min) {
            return Err(RuleFailure::violation(format!(
                "Vault password too short. Should be at least {min} characters."
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

pub struct DecryptionTime;

#[async_trait]
impl Rule<VaultContext> for DecryptionTime {
    fn name(&self) -> &'static str {
        "vault/decryption-time"
    }

    fn description(&self) -> &'static str {
        "Enforce a minimum time for opening the vault.\n\n\
         A slow key derivation costs a legitimate user a moment once, and costs an \
         attacker that moment for every password they try."
    }

    async fn enable(&self, ctx: &VaultContext) -> Activation {
        if ctx.config.vault_restrictions.min_decryption_time < 0 {
            return Activation::misconfigured(
                "Configuration error: Min decryption time can not be below 0",
            );
        }
        if ctx.vault.metadata().decryption_time_preference().is_none() {
            return Activation::disabled("Could not fetch decryption time from vault");
        }
        Activation::Enabled
    }

    async fn define(&self, ctx: &VaultContext) -> Verdict {
        let min = ctx.config.vault_restrictions.min_decryption_time;
        let Some(time) = ctx.vault.metadata().decryption_time_preference() else {
            return Ok(());
        };
        if time < min as f64 {
            return Err(RuleFailure::violation(format!(
                "Vault decryption time is too short. Should be at least {min}ms."
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Keyfile
// ---------------------------------------------------------------------------

pub struct KeyfileRequire;

#[async_trait]
impl Rule<VaultContext> for KeyfileRequire {
    fn name(&self) -> &'static str {
        "vault/keyfile/require"
    }

    fn description(&self) -> &'static str {
        "Require a keyfile as second authentication factor.\n\n\
         With a keyfile, knowing the master password alone no longer opens the vault."
    }

    async fn enable(&self, ctx: &VaultContext) -> Activation {
        if !ctx.config.vault_restrictions.require_keyfile {
            return disabled_by("require_keyfile");
        }
        Activation::Enabled
    }

    async fn define(&self, ctx: &VaultContext) -> Verdict {
        if ctx.vault_credential.keyfile_path.is_none() {
            return Err(RuleFailure::violation(
                "Vault requires keyfile as second authentication factor",
            ));
        }
        Ok(())
    }
}

pub struct KeyfileStoredWithCode;

#[async_trait]
impl Rule<VaultContext> for KeyfileStoredWithCode {
    fn name(&self) -> &'static str {
        "vault/keyfile/stored-with-code"
    }

    fn description(&self) -> &'static str {
        "Keep the keyfile out of the source code.\n\n\
         Whoever can read the repository or package would otherwise hold the second \
         factor as well. Ignored files and files outside the working directory's \
         repository or package are fine. Symlinks are resolved first."
    }

    async fn enable(&self, ctx: &VaultContext) -> Activation {
        if ctx.config.vault_restrictions.allow_keyfile_with_code {
            return disabled_by("allow_keyfile_with_code");
        }
        if ctx.vault_credential.keyfile_path.is_none() {
            return no_keyfile();
        }
        Activation::Enabled
    }

    async fn define(&self, ctx: &VaultContext) -> Verdict {
        let Some(keyfile) = &ctx.vault_credential.keyfile_path else {
            return Ok(());
        };
        let with_code = ctx
            .probe
            .stored_with_code(keyfile)
            .await
            .map_err(RuleFailure::collaborator)?;
        if with_code {
            return Err(RuleFailure::violation("Keyfile is stored with source code"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Non-secrets in the password
// ---------------------------------------------------------------------------

pub struct ForbidVaultName;

#[async_trait]
impl Rule<VaultContext> for ForbidVaultName {
    fn name(&self) -> &'static str {
        "vault/password/complexity/forbid-vault-name"
    }

    fn description(&self) -> &'static str {
        "Ensure that the vault password does not contain the vault name.\n\n\
         Detection uses fuzzy matching."
    }

    async fn enable(&self, ctx: &VaultContext) -> Activation {
        if !ctx.config.vault_restrictions.password_complexity.forbid_vault_name {
            return disabled_by("forbid_vault_name");
        }
        if ctx.vault.metadata().name.as_deref().is_none_or(str::is_empty) {
            return Activation::disabled("No vault name, nothing to check");
        }
        if ctx.vault_credential.password.is_empty() {
            return Activation::disabled("No vault password, nothing to check");
        }
        Activation::Enabled
    }

    async fn define(&self, ctx: &VaultContext) -> Verdict {
        let name = ctx.vault.metadata().name.as_deref().unwrap_or_default();
        let password = &ctx.vault_credential.password;
        if detect_partial_match(password, name, Strictness::Strict).is_some() {
            return Err(RuleFailure::violation(
                "Vault password contains (part of) the vault name",
            ));
        }
        Ok(())
    }
}

pub struct ForbidVaultPath;

#[async_trait]
impl Rule<VaultContext> for ForbidVaultPath {
    fn name(&self) -> &'static str {
        "vault/password/complexity/forbid-vault-path"
    }

    fn description(&self) -> &'static str {
        "Ensure that the vault password does not contain part of the vault file path.\n\n\
         Detection uses fuzzy matching against the path as it was given."
    }

    async fn enable(&self, ctx: &VaultContext) -> Activation {
        if !ctx.config.vault_restrictions.password_complexity.forbid_vault_path {
            return disabled_by("forbid_vault_path");
        }
        if ctx.vault_credential.password.is_empty() {
            return Activation::disabled("No vault password, nothing to check");
        }
        Activation::Enabled
    }

    async fn define(&self, ctx: &VaultContext) -> Verdict {
        let path = ctx.vault_credential.vault_path.to_string_lossy();
        let password = &ctx.vault_credential.password;
        if detect_partial_match(password, &*path, Strictness::Strict).is_some() {
            return Err(RuleFailure::violation(
                "Vault password contains (part of) the vault file path",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Storage location
// ---------------------------------------------------------------------------

pub struct StoredWithCode;

#[async_trait]
impl Rule<VaultContext> for StoredWithCode {
    fn name(&self) -> &'static str {
        "vault/stored-with-code"
    }

    fn description(&self) -> &'static str {
        "Keep the vault out of the source code.\n\n\
         A vault committed next to the code travels with every clone, backup and leak \
         of that code. Ignored files are fine. Symlinks are resolved first."
    }

    async fn enable(&self, ctx: &VaultContext) -> Activation {
        if ctx.config.vault_restrictions.allow_vault_with_code {
            return disabled_by("allow_vault_with_code");
        }
        Activation::Enabled
    }

    async fn define(&self, ctx: &VaultContext) -> Verdict {
        let with_code = ctx
            .probe
            .stored_with_code(&ctx.vault_credential.vault_path)
            .await
            .map_err(RuleFailure::collaborator)?;
        if with_code {
            return Err(RuleFailure::violation("Vault is stored with source code"));
        }
        Ok(())
    }
}

pub struct StoredWithKeyfile;

#[async_trait]
impl Rule<VaultContext> for StoredWithKeyfile {
    fn name(&self) -> &'static str {
        "vault/stored-with-keyfile"
    }

    fn description(&self) -> &'static str {
        "Keep the vault and its keyfile apart.\n\n\
         Anyone who gets hold of one location should not get both factors at once. \
         The vault and keyfile must not share:\n\
         1. a repository (unless one of them is ignored there)\n\
         2. a package\n\
         3. a directory\n\n\
         Symlinks are resolved first."
    }

    async fn enable(&self, ctx: &VaultContext) -> Activation {
        if ctx
            .config
            .vault_restrictions
            .allow_vault_and_keyfile_same_location
        {
            return disabled_by("allow_vault_and_keyfile_same_location");
        }
        if ctx.vault_credential.keyfile_path.is_none() {
            return no_keyfile();
        }
        Activation::Enabled
    }

    async fn define(&self, ctx: &VaultContext) -> Verdict {
        let Some(keyfile) = &ctx.vault_credential.keyfile_path else {
            return Ok(());
        };
        let probe = &ctx.probe;
        let vault_path = probe.resolve_symlink(&ctx.vault_credential.vault_path).await;
        let keyfile_path = probe.resolve_symlink(keyfile).await;
        let (vault_dir, keyfile_dir) = (parent_dir(&vault_path), parent_dir(&keyfile_path));

        let vault_repo = probe
            .repo_root(vault_dir)
            .await
            .map_err(RuleFailure::collaborator)?;
        let keyfile_repo = probe
            .repo_root(keyfile_dir)
            .await
            .map_err(RuleFailure::collaborator)?;
        if let Some(root) = vault_repo.filter(|r| keyfile_repo.as_ref() == Some(r)) {
            if is_ignored(ctx, &vault_path).await? || is_ignored(ctx, &keyfile_path).await? {
                return Ok(());
            }
            return Err(RuleFailure::violation(format!(
                "Vault and keyfile are in the same Git repository @ {}",
                root.display()
            )));
        }

        let vault_package = probe
            .package_root(vault_dir)
            .await
            .map_err(RuleFailure::collaborator)?;
        let keyfile_package = probe
            .package_root(keyfile_dir)
            .await
            .map_err(RuleFailure::collaborator)?;
        if let Some(root) = vault_package.filter(|r| keyfile_package.as_ref() == Some(r)) {
            return Err(RuleFailure::violation(format!(
                "Vault and keyfile are in the same package @ {}",
                root.display()
            )));
        }

        if vault_dir == keyfile_dir {
            return Err(RuleFailure::violation(format!(
                "Vault and keyfile are in the same directory @ {}",
                vault_dir.display()
            )));
        }
        Ok(())
    }
}

async fn is_ignored(ctx: &VaultContext, path: &Path) -> Result<bool, RuleFailure> {
    ctx.probe
        .is_ignored_by_repo(path)
        .await
        .map_err(RuleFailure::collaborator)
}
