//! Subcommand handlers.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use keyward_kernel::EnforcementReport;
use keyward_policy::{PolicyError, SecurityChecker, UNNAMED_VAULT, credential_rules, vault_rules};
use keyward_vault::{MemoryVault, Secret, VaultCredential, VaultHandle};
use serde_json::json;
use tracing::info;

use crate::cli::{ConfigSource, Format};
use crate::helpers::{env_non_empty, load_config, summary_line};

// ═══════════════════════════════════════════════════════════════════════
//  config / rules
// ═══════════════════════════════════════════════════════════════════════

pub fn cmd_config(source: &ConfigSource, format: Format) -> Result<ExitCode> {
    let config = load_config(source)?;
    let rendered = match format {
        Format::Toml => config.to_toml()?,
        Format::Json => config.to_json()?,
    };
    println!("{rendered}");
    Ok(ExitCode::SUCCESS)
}

pub fn cmd_rules() -> Result<ExitCode> {
    for book in [credential_rules().describe(), vault_rules().describe()] {
        println!();
        for (name, description) in book {
            println!("  {name:<56} {}", summary_line(description));
        }
    }
    println!();
    Ok(ExitCode::SUCCESS)
}

// ═══════════════════════════════════════════════════════════════════════
//  check credentials
// ═══════════════════════════════════════════════════════════════════════

pub async fn cmd_check_credentials(
    snapshot: &Path,
    source: &ConfigSource,
    as_json: bool,
) -> Result<ExitCode> {
    let config = Arc::new(load_config(source)?);
    let vault: Arc<dyn VaultHandle> = Arc::new(open_snapshot(snapshot).await?);

    let results = SecurityChecker::new()
        .check_all_credentials(config, vault)
        .await
        .context("failed to list credentials")?;

    let mut violations = 0usize;
    let mut rows = Vec::with_capacity(results.len());

    if !as_json {
        println!();
    }
    for (summary, result) in &results {
        let path = summary.path.join("/");
        match result {
            Ok(report) => {
                if as_json {
                    rows.push(json!({ "id": summary.id, "path": path, "status": "ok" }));
                } else {
                    println!("  [ok] {path}");
                    print_misconfigured(report);
                }
            }
            Err(err @ PolicyError::CredentialRule { rule, message, .. }) => {
                violations += 1;
                if as_json {
                    rows.push(json!({
                        "id": summary.id,
                        "path": path,
                        "status": "violation",
                        "rule": rule,
                        "message": message,
                    }));
                } else {
                    println!("  [!!] {path}");
                    println!("       {rule}");
                    for line in err.detailed_message().lines() {
                        println!("       {line}");
                    }
                }
            }
            Err(err) => bail!("failed to check {path}: {err}"),
        }
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!();
        println!(
            "  {} credential(s) checked, {violations} violation(s)",
            results.len()
        );
        println!();
    }

    info!(checked = results.len(), violations, "credential check finished");
    Ok(if violations > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

// ═══════════════════════════════════════════════════════════════════════
//  check vault
// ═══════════════════════════════════════════════════════════════════════

pub async fn cmd_check_vault(
    snapshot: &Path,
    vault_path: &Path,
    keyfile: Option<&Path>,
    password_env: &str,
    source: &ConfigSource,
) -> Result<ExitCode> {
    let config = Arc::new(load_config(source)?);
    let vault = open_snapshot(snapshot).await?;

    let Some(password) = env_non_empty(password_env) else {
        bail!("master password not found: set {password_env}");
    };
    let mut credential = VaultCredential::new(vault_path, Secret::text(password));
    if let Some(keyfile) = keyfile {
        credential = credential.with_keyfile(keyfile);
    }

    let name = vault.metadata().name.clone().unwrap_or_else(|| UNNAMED_VAULT.into());
    let vault: Arc<dyn VaultHandle> = Arc::new(vault);

    println!();
    let code = match SecurityChecker::new()
        .check_vault_security(config, vault, Arc::new(credential))
        .await
    {
        Ok(report) => {
            println!("  [ok] vault {name}: {} rule(s) passed", report.passed().count());
            for (rule, reason) in report.disabled() {
                println!("       skipped {rule}: {reason}");
            }
            print_misconfigured(&report);
            ExitCode::SUCCESS
        }
        Err(err @ PolicyError::VaultRule { .. }) => {
            println!("  [!!] vault {name}");
            if let Some(rule) = err.rule() {
                println!("       {rule}");
            }
            for line in err.detailed_message().lines() {
                println!("       {line}");
            }
            ExitCode::FAILURE
        }
        Err(err) => return Err(err).context("vault check could not complete"),
    };
    println!();
    Ok(code)
}

// ═══════════════════════════════════════════════════════════════════════
//  Helpers
// ═══════════════════════════════════════════════════════════════════════

async fn open_snapshot(path: &Path) -> Result<MemoryVault> {
    MemoryVault::load(path)
        .await
        .with_context(|| format!("failed to open vault snapshot {}", path.display()))
}

fn print_misconfigured(report: &EnforcementReport) {
    for (rule, message) in report.misconfigured() {
        println!("       warning {rule}: {message}");
    }
}
