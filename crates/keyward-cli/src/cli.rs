//! CLI argument definitions for Keyward.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Keyward -- security policy checks for password vaults.
#[derive(Parser)]
#[command(
    name = "keyward",
    version,
    about = "Keyward -- security policy checks for password vaults",
    long_about = "Resolves security configurations and checks vaults and their credentials \
                  against them: password strength, reuse, expiry, keyfiles and where files \
                  are stored relative to source code."
)]
pub struct Cli {
    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the fully resolved security configuration.
    Config {
        #[command(flatten)]
        source: ConfigSource,

        /// Output format.
        #[arg(long, value_enum, default_value_t = Format::Toml)]
        format: Format,
    },

    /// List every vault and credential rule with its description.
    Rules,

    /// Check a vault snapshot against the security configuration.
    Check {
        #[command(subcommand)]
        target: CheckTarget,
    },
}

/// What to check.
#[derive(Subcommand)]
pub enum CheckTarget {
    /// Check every credential in the snapshot. Exits with status 1 when any
    /// credential violates a rule.
    Credentials {
        /// JSON vault snapshot.
        #[arg(long)]
        snapshot: PathBuf,

        #[command(flatten)]
        source: ConfigSource,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check the vault itself: master password, keyfile and storage location.
    Vault {
        /// JSON vault snapshot holding the vault metadata and entries.
        #[arg(long)]
        snapshot: PathBuf,

        /// Where the real vault file lives.
        #[arg(long)]
        vault_path: PathBuf,

        /// Keyfile used as second factor.
        #[arg(long)]
        keyfile: Option<PathBuf>,

        /// Environment variable holding the master password.
        #[arg(long, default_value = "KEYWARD_VAULT_PASSWORD")]
        password_env: String,

        #[command(flatten)]
        source: ConfigSource,
    },
}

/// Where the security configuration comes from. Without either flag the
/// file named by `KEYWARD_CONFIG` is used, else the default preset.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigSource {
    /// Named preset: none, basic, good or better.
    #[arg(long, conflicts_with = "config")]
    pub preset: Option<String>,

    /// TOML or JSON configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Toml,
    Json,
}
