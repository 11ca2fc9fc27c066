//! CLI entry point for Keyward.
//!
//! This binary provides the `keyward` command with subcommands for
//! inspecting security configurations, listing rules and checking vault
//! snapshots.

mod cli;
mod commands;
mod helpers;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use crate::cli::{CheckTarget, Cli, Commands};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    helpers::init_tracing(&cli.log_level);

    match cli.command {
        Commands::Config { source, format } => commands::cmd_config(&source, format),
        Commands::Rules => commands::cmd_rules(),
        Commands::Check { target } => match target {
            CheckTarget::Credentials {
                snapshot,
                source,
                json,
            } => commands::cmd_check_credentials(&snapshot, &source, json).await,
            CheckTarget::Vault {
                snapshot,
                vault_path,
                keyfile,
                password_env,
                source,
            } => {
                commands::cmd_check_vault(
                    &snapshot,
                    &vault_path,
                    keyfile.as_deref(),
                    &password_env,
                    &source,
                )
                .await
            }
        },
    }
}
