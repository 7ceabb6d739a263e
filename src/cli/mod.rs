//! CLI entry point for the gateway.

pub mod auth;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// QuickBooks gateway CLI
#[derive(Parser, Debug)]
#[command(name = "qbo-gateway", version, about = "QuickBooks Online OAuth gateway")]
pub struct Cli {
    /// TOML config file; `QBO_*` environment variables override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Credential management
    Auth(AuthArgs),
}

/// Arguments for the `auth` subcommand group.
#[derive(Parser, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommands,
}

/// Auth subcommands.
#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Print the authorize URL and the state to expect back
    Url,
    /// Exchange the code from the redirect and store the credential
    Complete(CompleteArgs),
    /// Show the stored credential's status
    Status,
    /// Refresh the access token now
    Refresh,
    /// Revoke and delete the stored credential
    Disconnect,
}

/// Arguments for `qbo-gateway auth complete`.
#[derive(Parser, Debug)]
pub struct CompleteArgs {
    /// `code` query parameter from the redirect
    #[arg(long)]
    pub code: String,

    /// `realmId` query parameter from the redirect
    #[arg(long)]
    pub realm_id: String,

    /// `state` query parameter from the redirect
    #[arg(long)]
    pub state: Option<String>,

    /// State printed by `auth url`
    #[arg(long)]
    pub expected_state: Option<String>,
}
