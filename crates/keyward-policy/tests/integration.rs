//! Integration tests for the keyward-policy crate.
//!
//! Credentials and vaults come from an in-memory vault; storage locations
//! come from a fake probe so no test depends on the machine's git setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use keyward_kernel::RuleStatus;
use keyward_policy::{
    PolicyError, Preset, SecurityChecker, SecurityConfig, SecurityConfigInput, Strictness,
    StorageProbe, detect_partial_match,
};
use keyward_vault::{
    Credential, DECRYPTION_TIME_KEY, MemoryVault, Secret, VaultCredential, VaultEntry, VaultHandle,
    VaultMetadata,
};

// ═══════════════════════════════════════════════════════════════════════
//  Fixtures
// ═══════════════════════════════════════════════════════════════════════

/// Resolve `overrides` on top of the `none` preset, which enables nothing
/// that could fail.
fn config(overrides: &str) -> Arc<SecurityConfig> {
    let toml = format!("preset = \"none\"\n{overrides}");
    Arc::new(SecurityConfigInput::from_toml_str(&toml).unwrap().resolve())
}

fn vault_with(entries: Vec<VaultEntry>) -> (Arc<MemoryVault>, Vec<String>) {
    let mut vault = MemoryVault::new(VaultMetadata::default());
    let ids = entries
        .into_iter()
        .map(|e| vault.insert(e).unwrap())
        .collect();
    (Arc::new(vault), ids)
}

async fn check_credential(
    config: Arc<SecurityConfig>,
    vault: &Arc<MemoryVault>,
    id: &str,
) -> keyward_policy::Result<keyward_kernel::EnforcementReport> {
    let credential: Credential = vault.get(id).unwrap();
    let handle: Arc<dyn VaultHandle> = vault.clone();
    SecurityChecker::with_probe(Arc::new(FakeProbe::default()))
        .check_credential_security(config, Arc::new(credential), handle)
        .await
}

fn expect_credential_violation(
    result: keyward_policy::Result<keyward_kernel::EnforcementReport>,
) -> (String, String) {
    match result {
        Err(PolicyError::CredentialRule { rule, message, .. }) => (rule, message),
        other => panic!("expected a credential violation, got {other:?}"),
    }
}

#[derive(Default)]
struct FakeProbe {
    /// `(link, target)` pairs.
    links: Vec<(PathBuf, PathBuf)>,
    repos: Vec<PathBuf>,
    ignored: Vec<PathBuf>,
    packages: Vec<PathBuf>,
    cwd: PathBuf,
    repo_lookup_fails: bool,
}

#[async_trait]
impl StorageProbe for FakeProbe {
    async fn resolve_symlink(&self, path: &Path) -> PathBuf {
        self.links
            .iter()
            .find(|(link, _)| link == path)
            .map_or_else(|| path.to_path_buf(), |(_, target)| target.clone())
    }

    async fn repo_root(&self, dir: &Path) -> keyward_policy::Result<Option<PathBuf>> {
        if self.repo_lookup_fails {
            return Err(PolicyError::Probe {
                reason: "git exited with signal 9".into(),
            });
        }
        Ok(self.repos.iter().find(|r| dir.starts_with(r)).cloned())
    }

    async fn is_ignored_by_repo(&self, path: &Path) -> keyward_policy::Result<bool> {
        Ok(self.ignored.iter().any(|p| p == path))
    }

    async fn package_root(&self, dir: &Path) -> keyward_policy::Result<Option<PathBuf>> {
        Ok(self.packages.iter().find(|r| dir.starts_with(r)).cloned())
    }

    fn working_dir(&self) -> keyward_policy::Result<PathBuf> {
        Ok(self.cwd.clone())
    }
}

async fn check_vault(
    config: Arc<SecurityConfig>,
    meta: VaultMetadata,
    entries: Vec<VaultEntry>,
    credential: VaultCredential,
    probe: FakeProbe,
) -> keyward_policy::Result<keyward_kernel::EnforcementReport> {
    let mut vault = MemoryVault::new(meta);
    for e in entries {
        vault.insert(e).unwrap();
    }
    let handle: Arc<dyn VaultHandle> = Arc::new(vault);
    SecurityChecker::with_probe(Arc::new(probe))
        .check_vault_security(config, handle, Arc::new(credential))
        .await
}

fn expect_vault_violation(
    result: keyward_policy::Result<keyward_kernel::EnforcementReport>,
) -> (String, String, String) {
    match result {
        Err(PolicyError::VaultRule {
            vault_name,
            rule,
            message,
            ..
        }) => (vault_name, rule, message),
        other => panic!("expected a vault violation, got {other:?}"),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Credential rules
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn short_password_cites_the_minimum() {
    let (vault, ids) = vault_with(vec![VaultEntry::new(&["Root"], "Mail", "short")]);
    let cfg = config("[credential_restrictions]\nmin_password_length = 10\n");

    let (rule, message) = expect_credential_violation(check_credential(cfg, &vault, &ids[0]).await);
    assert_eq!(rule, "credential/password/length");
    assert_eq!(
        message,
        "Credential password too short. Should be at least 10 characters."
    );
}

#[tokio::test]
async fn too_few_categories_reports_the_count() {
    let (vault, ids) = vault_with(vec![VaultEntry::new(&["Root"], "Mail", "abc123")]);
    let cfg = config(
        "[credential_restrictions.password_complexity]\nmin_character_categories = 3\n",
    );

    let (rule, message) = expect_credential_violation(check_credential(cfg, &vault, &ids[0]).await);
    assert_eq!(rule, "credential/password/complexity/min-character-categories");
    assert!(message.contains("at least 3"), "{message}");
    assert!(message.contains("only contains 2"), "{message}");
}

#[tokio::test]
async fn username_inside_password_is_rejected() {
    let (vault, ids) = vault_with(vec![
        VaultEntry::new(&["Root"], "Forum", "lorum2024!").with_username("lorum@example.org"),
        VaultEntry::new(&["Root"], "Mail", "gmail").with_username("my-name@gmail.com"),
    ]);
    let cfg = config("[credential_restrictions.password_complexity]\nforbid_username = true\n");

    let (rule, message) =
        expect_credential_violation(check_credential(cfg.clone(), &vault, &ids[0]).await);
    assert_eq!(rule, "credential/password/complexity/forbid-username");
    assert_eq!(message, "Password contains (part of) username");

    // Only the email domain overlaps; that is not the username.
    let report = check_credential(cfg, &vault, &ids[1]).await.unwrap();
    assert_eq!(
        report.status_of("credential/password/complexity/forbid-username"),
        Some(&RuleStatus::Passed)
    );
}

#[tokio::test]
async fn url_domain_inside_password_is_rejected() {
    let (vault, ids) = vault_with(vec![
        VaultEntry::new(&["Root"], "Shop", "MegaStore#2024").with_url("https://www.megastore.com/login"),
        VaultEntry::new(&["Root"], "Bare", "x7!Qz@pL0v").with_url("megastore.com"),
        VaultEntry::new(&["Root"], "No URL", "whatever"),
    ]);
    let cfg = config("[credential_restrictions.password_complexity]\nforbid_url = true\n");

    let (rule, _) = expect_credential_violation(check_credential(cfg.clone(), &vault, &ids[0]).await);
    assert_eq!(rule, "credential/password/complexity/forbid-url");

    let report = check_credential(cfg.clone(), &vault, &ids[1]).await.unwrap();
    assert_eq!(
        report.status_of("credential/password/complexity/forbid-url"),
        Some(&RuleStatus::Passed)
    );

    let report = check_credential(cfg, &vault, &ids[2]).await.unwrap();
    assert_eq!(
        report.status_of("credential/password/complexity/forbid-url"),
        Some(&RuleStatus::Disabled("Credential has no URL".into()))
    );
}

#[tokio::test]
async fn reused_password_cites_the_other_credential() {
    let cfg = config("[credential_restrictions.password_complexity]\nforbid_reuse = true\n");

    let (vault, ids) = vault_with(vec![
        VaultEntry::new(&["Root", "Mail"], "Work", "correct horse battery"),
        VaultEntry::new(&["Root", "Bank"], "Savings", "correct horse battery"),
    ]);
    let (rule, message) =
        expect_credential_violation(check_credential(cfg.clone(), &vault, &ids[0]).await);
    assert_eq!(rule, "credential/password/complexity/forbid-reuse");
    assert_eq!(
        message,
        "Credential password is used by another credential: 'Root/Bank/Savings'"
    );

    let (vault, ids) = vault_with(vec![
        VaultEntry::new(&["Root", "Mail"], "Work", "correct horse battery"),
        VaultEntry::new(&["Root", "Bank"], "Savings", "correct horse batterY"),
    ]);
    assert!(check_credential(cfg, &vault, &ids[0]).await.is_ok());
}

#[tokio::test]
async fn zero_max_age_is_a_configuration_error() {
    let (vault, ids) = vault_with(vec![VaultEntry::new(&["Root"], "Mail", "pw")]);
    let cfg = config("[credential_restrictions]\nmax_password_age = 0\n");

    let report = check_credential(cfg, &vault, &ids[0]).await.unwrap();
    let misconfigured: Vec<_> = report.misconfigured().collect();
    assert_eq!(misconfigured.len(), 1);
    assert_eq!(misconfigured[0].0, "credential/password/age");
    assert!(misconfigured[0].1.starts_with("Configuration error: Max password age"));
}

#[tokio::test]
async fn old_password_is_rejected() {
    let entry = VaultEntry::new(&["Root"], "Mail", "pw")
        .with_last_modified(Utc::now() - Duration::hours(48));
    let (vault, ids) = vault_with(vec![entry]);
    let cfg = config("[credential_restrictions]\nmax_password_age = 24\n");

    let (rule, message) = expect_credential_violation(check_credential(cfg, &vault, &ids[0]).await);
    assert_eq!(rule, "credential/password/age");
    assert_eq!(message, "Credential password is too old, change it");
}

#[tokio::test]
async fn first_failing_rule_wins() {
    // Expired and far too short: expiry is registered first.
    let entry = VaultEntry::new(&["Root"], "Mail", "pw").with_expiry(Utc::now() - Duration::days(1));
    let (vault, ids) = vault_with(vec![entry]);
    let cfg = config(
        "[credential_restrictions]\nallow_expired = false\nmin_password_length = 30\n",
    );

    let (rule, message) = expect_credential_violation(check_credential(cfg, &vault, &ids[0]).await);
    assert_eq!(rule, "credential/expired");
    assert_eq!(message, "Credential expired");
}

#[tokio::test]
async fn violation_carries_credential_identity_and_description() {
    let (vault, ids) = vault_with(vec![VaultEntry::new(&["Root", "Mail"], "Work", "pw")]);
    let cfg = config("[credential_restrictions]\nrequire_expiration = true\n");

    match check_credential(cfg, &vault, &ids[0]).await {
        Err(err @ PolicyError::CredentialRule { .. }) => {
            assert!(err.is_violation());
            assert_eq!(err.rule(), Some("credential/require-expiration"));
            let PolicyError::CredentialRule {
                credential_id,
                path,
                description,
                ..
            } = &err
            else {
                unreachable!()
            };
            assert_eq!(credential_id, &ids[0]);
            assert_eq!(path, &["Root", "Mail", "Work"]);
            assert!(description.is_some());
            assert!(err.detailed_message().starts_with("Credential has no expiration date\n"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn none_preset_disables_or_passes_everything() {
    let (vault, ids) = vault_with(vec![VaultEntry::new(&["Root"], "Empty", "")]);
    let cfg = Arc::new(Preset::None.config());
    let report = check_credential(cfg, &vault, &ids[0]).await.unwrap();
    assert_eq!(report.len(), 8);
    assert_eq!(report.misconfigured().count(), 0);
}

#[tokio::test]
async fn all_credentials_are_checked_in_listing_order() {
    let (vault, _) = vault_with(vec![
        VaultEntry::new(&["Root"], "A", "short"),
        VaultEntry::new(&["Root"], "B", "long enough password"),
    ]);
    let cfg = config("[credential_restrictions]\nmin_password_length = 10\n");
    let handle: Arc<dyn VaultHandle> = vault;

    let results = SecurityChecker::with_probe(Arc::new(FakeProbe::default()))
        .check_all_credentials(cfg, handle)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0.title, "A");
    assert!(results[0].1.as_ref().is_err_and(PolicyError::is_violation));
    assert_eq!(results[1].0.title, "B");
    assert!(results[1].1.is_ok());
}

#[tokio::test]
async fn selector_limits_the_rules_run() {
    let (vault, ids) = vault_with(vec![VaultEntry::new(&["Root"], "Mail", "short")]);
    let cfg = config("[credential_restrictions]\nmin_password_length = 10\n");
    let handle: Arc<dyn VaultHandle> = vault.clone();

    let checker = SecurityChecker::with_probe(Arc::new(FakeProbe::default()))
        .with_selector("credential/password/complexity/*")
        .unwrap();
    let report = checker
        .check_credential_security(cfg, Arc::new(vault.get(&ids[0]).unwrap()), handle)
        .await
        .unwrap();
    assert_eq!(report.len(), 4);
    assert!(report.status_of("credential/password/length").is_none());

    assert!(matches!(
        SecurityChecker::new().with_selector("credential/[").map(|_| ()),
        Err(PolicyError::Kernel(_))
    ));
}

// ═══════════════════════════════════════════════════════════════════════
//  Vault rules
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn vault_without_keyfile_when_required() {
    let cfg = config("[vault_restrictions]\nrequire_keyfile = true\n");
    let cred = VaultCredential::new("/vaults/team.kdbx", Secret::text("pw"));

    let (name, rule, message) = expect_vault_violation(
        check_vault(cfg, VaultMetadata::default(), vec![], cred, FakeProbe::default()).await,
    );
    assert_eq!(name, "???");
    assert_eq!(rule, "vault/keyfile/require");
    assert_eq!(message, "Vault requires keyfile as second authentication factor");
}

#[tokio::test]
async fn vault_age_requires_a_key_change_date() {
    let cfg = config("[vault_restrictions]\nmax_password_age = 24\n");
    let cred = VaultCredential::new("/vaults/team.kdbx", Secret::text("pw"));

    let (_, rule, message) = expect_vault_violation(
        check_vault(cfg.clone(), VaultMetadata::default(), vec![], cred.clone(), FakeProbe::default())
            .await,
    );
    assert_eq!(rule, "vault/password/age");
    assert!(message.starts_with("Could not find when the vault password was last changed"));

    let meta = VaultMetadata {
        key_changed: Some(Utc::now() - Duration::hours(30)),
        ..Default::default()
    };
    let (_, _, message) =
        expect_vault_violation(check_vault(cfg, meta, vec![], cred, FakeProbe::default()).await);
    assert_eq!(message, "Vault password is too old, change it");
}

#[tokio::test]
async fn decryption_time_needs_a_recorded_preference() {
    let cfg = config("[vault_restrictions]\nmin_decryption_time = 1000\n");
    let cred = VaultCredential::new("/vaults/team.kdbx", Secret::text("pw"));

    let report = check_vault(
        cfg.clone(),
        VaultMetadata::default(),
        vec![],
        cred.clone(),
        FakeProbe::default(),
    )
    .await
    .unwrap();
    assert_eq!(
        report.status_of("vault/decryption-time"),
        Some(&RuleStatus::Disabled(
            "Could not fetch decryption time from vault".into()
        ))
    );

    let mut meta = VaultMetadata {
        name: Some("Team".into()),
        ..Default::default()
    };
    meta.custom_data.insert(DECRYPTION_TIME_KEY.into(), "250".into());
    let (name, rule, message) =
        expect_vault_violation(check_vault(cfg, meta, vec![], cred, FakeProbe::default()).await);
    assert_eq!(name, "Team");
    assert_eq!(rule, "vault/decryption-time");
    assert_eq!(message, "Vault decryption time is too short. Should be at least 1000ms.");
}

#[tokio::test]
async fn vault_password_reused_by_a_credential() {
    let cfg = config("[vault_restrictions.password_complexity]\nforbid_reuse = true\n");
    let cred = VaultCredential::new("/vaults/team.kdbx", Secret::text("hunter22"));
    let entries = vec![VaultEntry::new(&["Root", "Infra"], "Router", "hunter22")];

    let (_, rule, message) = expect_vault_violation(
        check_vault(cfg, VaultMetadata::default(), entries, cred, FakeProbe::default()).await,
    );
    assert_eq!(rule, "vault/password/complexity/forbid-reuse");
    assert_eq!(message, "Vault password is used by a credential: 'Root/Infra/Router'");
}

#[tokio::test]
async fn vault_name_inside_password() {
    let cfg = config("[vault_restrictions.password_complexity]\nforbid_vault_name = true\n");
    let cred = VaultCredential::new("/vaults/team.kdbx", Secret::text("AcmeVault2024!"));
    let meta = VaultMetadata {
        name: Some("Acme".into()),
        ..Default::default()
    };

    let (name, rule, _) =
        expect_vault_violation(check_vault(cfg, meta, vec![], cred, FakeProbe::default()).await);
    assert_eq!(name, "Acme");
    assert_eq!(rule, "vault/password/complexity/forbid-vault-name");
}

#[tokio::test]
async fn vault_password_needs_enough_categories() {
    let cfg = config(
        "[vault_restrictions.password_complexity]\nmin_character_categories = 3\n",
    );
    let weak = VaultCredential::new("/vaults/team.kdbx", Secret::text("abc123"));

    let (_, rule, message) = expect_vault_violation(
        check_vault(cfg.clone(), VaultMetadata::default(), vec![], weak, FakeProbe::default())
            .await,
    );
    assert_eq!(rule, "vault/password/complexity/min-character-categories");
    assert_eq!(
        message,
        "Vault password not complex enough. \
         Should contain at least 3 characters categories but only contains 2."
    );

    let mixed = VaultCredential::new("/vaults/team.kdbx", Secret::text("abc123!"));
    let report = check_vault(cfg, VaultMetadata::default(), vec![], mixed, FakeProbe::default())
        .await
        .unwrap();
    assert_eq!(
        report.status_of("vault/password/complexity/min-character-categories"),
        Some(&RuleStatus::Passed)
    );
}

#[tokio::test]
async fn short_vault_password_cites_the_minimum() {
    let cfg = config("[vault_restrictions]\nmin_password_length = 12\n");
    let short = VaultCredential::new("/vaults/team.kdbx", Secret::text("pw-1"));

    let (_, rule, message) = expect_vault_violation(
        check_vault(cfg.clone(), VaultMetadata::default(), vec![], short, FakeProbe::default())
            .await,
    );
    assert_eq!(rule, "vault/password/length");
    assert_eq!(message, "Vault password too short. Should be at least 12 characters.");

    let long = VaultCredential::new("/vaults/team.kdbx", Secret::text("correct-horse-battery"));
    let report = check_vault(cfg, VaultMetadata::default(), vec![], long, FakeProbe::default())
        .await
        .unwrap();
    assert_eq!(
        report.status_of("vault/password/length"),
        Some(&RuleStatus::Passed)
    );
}

#[tokio::test]
async fn vault_path_inside_password() {
    let cfg = config("[vault_restrictions.password_complexity]\nforbid_vault_path = true\n");
    let leaky = VaultCredential::new("/vaults/team.kdbx", Secret::text("/vaults/team.kdbx"));

    let (_, rule, message) = expect_vault_violation(
        check_vault(cfg.clone(), VaultMetadata::default(), vec![], leaky, FakeProbe::default())
            .await,
    );
    assert_eq!(rule, "vault/password/complexity/forbid-vault-path");
    assert_eq!(message, "Vault password contains (part of) the vault file path");

    let unrelated = VaultCredential::new(
        "/srv/vaults/payments.kdbx",
        Secret::text("Tq8#wZ!r2Lm@9vXc$4Nb&7Hy^1Jp*6Ks"),
    );
    let report = check_vault(cfg, VaultMetadata::default(), vec![], unrelated, FakeProbe::default())
        .await
        .unwrap();
    assert_eq!(
        report.status_of("vault/password/complexity/forbid-vault-path"),
        Some(&RuleStatus::Passed)
    );
}

#[tokio::test]
async fn vault_and_keyfile_in_one_directory() {
    let cfg = config("[vault_restrictions]\nallow_vault_and_keyfile_same_location = false\n");
    let cred = VaultCredential::new("/secure/team.kdbx", Secret::text("pw"))
        .with_keyfile("/secure/team.key");

    let (_, rule, message) = expect_vault_violation(
        check_vault(cfg, VaultMetadata::default(), vec![], cred, FakeProbe::default()).await,
    );
    assert_eq!(rule, "vault/stored-with-keyfile");
    assert_eq!(message, "Vault and keyfile are in the same directory @ /secure");
}

#[tokio::test]
async fn vault_and_keyfile_in_one_repository() {
    let cfg = config("[vault_restrictions]\nallow_vault_and_keyfile_same_location = false\n");
    let cred = VaultCredential::new("/work/app/secrets/team.kdbx", Secret::text("pw"))
        .with_keyfile("/work/app/keys/team.key");
    let probe = FakeProbe {
        repos: vec!["/work/app".into()],
        ..Default::default()
    };

    let (_, _, message) = expect_vault_violation(
        check_vault(cfg.clone(), VaultMetadata::default(), vec![], cred.clone(), probe).await,
    );
    assert_eq!(message, "Vault and keyfile are in the same Git repository @ /work/app");

    // An ignored keyfile never leaves the machine with the repository.
    let probe = FakeProbe {
        repos: vec!["/work/app".into()],
        ignored: vec!["/work/app/keys/team.key".into()],
        ..Default::default()
    };
    let report = check_vault(cfg, VaultMetadata::default(), vec![], cred, probe)
        .await
        .unwrap();
    assert_eq!(
        report.status_of("vault/stored-with-keyfile"),
        Some(&RuleStatus::Passed)
    );
}

#[tokio::test]
async fn vault_and_keyfile_in_one_package() {
    let cfg = config("[vault_restrictions]\nallow_vault_and_keyfile_same_location = false\n");
    let cred = VaultCredential::new("/work/tool/data/team.kdbx", Secret::text("pw"))
        .with_keyfile("/work/tool/keys/team.key");
    let probe = FakeProbe {
        packages: vec!["/work/tool".into()],
        ..Default::default()
    };

    let (_, _, message) = expect_vault_violation(
        check_vault(cfg, VaultMetadata::default(), vec![], cred, probe).await,
    );
    assert_eq!(message, "Vault and keyfile are in the same package @ /work/tool");
}

#[tokio::test]
async fn vault_stored_with_code() {
    let cfg = config("[vault_restrictions]\nallow_vault_with_code = false\n");
    let cred = VaultCredential::new("/work/app/team.kdbx", Secret::text("pw"));

    let in_repo = FakeProbe {
        repos: vec!["/work/app".into()],
        cwd: "/work/app/src".into(),
        ..Default::default()
    };
    let (_, rule, message) = expect_vault_violation(
        check_vault(cfg.clone(), VaultMetadata::default(), vec![], cred.clone(), in_repo).await,
    );
    assert_eq!(rule, "vault/stored-with-code");
    assert_eq!(message, "Vault is stored with source code");

    let ignored = FakeProbe {
        repos: vec!["/work/app".into()],
        ignored: vec!["/work/app/team.kdbx".into()],
        cwd: "/work/app".into(),
        ..Default::default()
    };
    assert!(
        check_vault(cfg.clone(), VaultMetadata::default(), vec![], cred.clone(), ignored)
            .await
            .is_ok()
    );

    let other_repo = FakeProbe {
        repos: vec!["/work/app".into(), "/work/other".into()],
        cwd: "/work/other".into(),
        ..Default::default()
    };
    assert!(
        check_vault(cfg, VaultMetadata::default(), vec![], cred, other_repo)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn locations_are_judged_after_following_links() {
    let cfg = config("[vault_restrictions]\nallow_vault_and_keyfile_same_location = false\n");

    // Side by side as given, but the keyfile link points at a USB stick.
    let cred = VaultCredential::new("/secure/team.kdbx", Secret::text("pw"))
        .with_keyfile("/secure/team.key");
    let probe = FakeProbe {
        links: vec![("/secure/team.key".into(), "/media/usb/team.key".into())],
        ..Default::default()
    };
    let report = check_vault(cfg.clone(), VaultMetadata::default(), vec![], cred, probe)
        .await
        .unwrap();
    assert_eq!(
        report.status_of("vault/stored-with-keyfile"),
        Some(&RuleStatus::Passed)
    );

    // Apart as given, but the keyfile link lands next to the vault.
    let cred = VaultCredential::new("/home/me/team.kdbx", Secret::text("pw"))
        .with_keyfile("/media/usb/team.key");
    let probe = FakeProbe {
        links: vec![("/media/usb/team.key".into(), "/home/me/team.key".into())],
        ..Default::default()
    };
    let (_, rule, message) = expect_vault_violation(
        check_vault(cfg, VaultMetadata::default(), vec![], cred, probe).await,
    );
    assert_eq!(rule, "vault/stored-with-keyfile");
    assert_eq!(message, "Vault and keyfile are in the same directory @ /home/me");

    // A link outside any repository whose target sits in the working repository.
    let cfg = config("[vault_restrictions]\nallow_vault_with_code = false\n");
    let cred = VaultCredential::new("/home/me/team.kdbx", Secret::text("pw"));
    let probe = FakeProbe {
        links: vec![("/home/me/team.kdbx".into(), "/work/app/secrets/team.kdbx".into())],
        repos: vec!["/work/app".into()],
        cwd: "/work/app".into(),
        ..Default::default()
    };
    let (_, rule, message) = expect_vault_violation(
        check_vault(cfg.clone(), VaultMetadata::default(), vec![], cred, probe).await,
    );
    assert_eq!(rule, "vault/stored-with-code");
    assert_eq!(message, "Vault is stored with source code");

    // And the reverse: a link inside the repository pointing out of it.
    let cred = VaultCredential::new("/work/app/team.kdbx", Secret::text("pw"));
    let probe = FakeProbe {
        links: vec![("/work/app/team.kdbx".into(), "/home/me/team.kdbx".into())],
        repos: vec!["/work/app".into()],
        cwd: "/work/app".into(),
        ..Default::default()
    };
    let report = check_vault(cfg, VaultMetadata::default(), vec![], cred, probe)
        .await
        .unwrap();
    assert_eq!(
        report.status_of("vault/stored-with-code"),
        Some(&RuleStatus::Passed)
    );
}

#[tokio::test]
async fn keyfile_in_the_working_package() {
    let cfg = config("[vault_restrictions]\nallow_keyfile_with_code = false\n");
    let cred = VaultCredential::new("/safe/team.kdbx", Secret::text("pw"))
        .with_keyfile("/work/tool/team.key");
    let probe = FakeProbe {
        packages: vec!["/work/tool".into()],
        cwd: "/work/tool".into(),
        ..Default::default()
    };

    let (_, rule, message) = expect_vault_violation(
        check_vault(cfg, VaultMetadata::default(), vec![], cred, probe).await,
    );
    assert_eq!(rule, "vault/keyfile/stored-with-code");
    assert_eq!(message, "Keyfile is stored with source code");
}

#[tokio::test]
async fn probe_failure_is_not_a_violation() {
    let cfg = config("[vault_restrictions]\nallow_vault_with_code = false\n");
    let cred = VaultCredential::new("/work/app/team.kdbx", Secret::text("pw"));
    let probe = FakeProbe {
        repo_lookup_fails: true,
        ..Default::default()
    };

    match check_vault(cfg, VaultMetadata::default(), vec![], cred, probe).await {
        Err(err @ PolicyError::Collaborator { .. }) => {
            assert!(!err.is_violation());
            assert_eq!(err.rule(), Some("vault/stored-with-code"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn better_preset_on_a_strong_vault() {
    let cfg = Arc::new(SecurityConfig::default());
    let mut meta = VaultMetadata {
        name: Some("Payments".into()),
        key_changed: Some(Utc::now() - Duration::hours(1)),
        ..Default::default()
    };
    meta.custom_data.insert(DECRYPTION_TIME_KEY.into(), "2500".into());
    let cred = VaultCredential::new(
        "/srv/vaults/payments.kdbx",
        Secret::text("Tq8#wZ!r2Lm@9vXc$4Nb&7Hy^1Jp*6Ks"),
    )
    .with_keyfile("/media/usb/payments.key");

    let report = check_vault(cfg, meta, vec![], cred, FakeProbe::default())
        .await
        .unwrap();
    assert_eq!(report.len(), 11);
    assert_eq!(report.passed().count(), 10);
    let disabled: Vec<_> = report.disabled().collect();
    assert_eq!(
        disabled,
        vec![(
            "vault/keyfile/stored-with-code",
            "Disabled by security config `allow_keyfile_with_code`"
        )]
    );
}

// ═══════════════════════════════════════════════════════════════════════
//  Fuzzy matching properties
// ═══════════════════════════════════════════════════════════════════════

proptest::proptest! {
    #[test]
    fn identical_inputs_match_exactly(s in "[a-zA-Z0-9]{1,40}") {
        for strictness in [Strictness::Loose, Strictness::Normal, Strictness::Strict] {
            let hit = detect_partial_match(s.as_str(), s.as_str(), strictness);
            proptest::prop_assert!(hit.is_some());
            proptest::prop_assert_eq!(hit.map(|m| m.score), Some(0.0));
        }
    }
}
