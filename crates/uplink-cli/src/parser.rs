//! Main CLI parser and top-level argument handling.
//!
//! This module defines the root CLI structure with global options. Backend
//! settings are global so every subcommand sees the same configuration.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Command-line interface for the resumable upload queue.
#[derive(Parser, Debug)]
#[command(name = "uplink")]
#[command(about = "Upload files to object storage with retry and live progress")]
#[command(version)]
pub struct Cli {
    /// Supabase project URL
    #[arg(long, env = "UPLINK_SUPABASE_URL", global = true)]
    pub supabase_url: Option<String>,

    /// Supabase public (anon) API key
    #[arg(long, env = "UPLINK_SUPABASE_ANON_KEY", global = true, hide_env_values = true)]
    pub anon_key: Option<String>,

    /// Storage bucket
    #[arg(long, env = "UPLINK_BUCKET", global = true, default_value = uplink_storage::DEFAULT_BUCKET)]
    pub bucket: String,

    /// Access token of the signed-in user
    #[arg(long, env = "UPLINK_ACCESS_TOKEN", global = true, hide_env_values = true)]
    pub access_token: Option<String>,

    /// User id (looked up from the access token when omitted)
    #[arg(long, env = "UPLINK_USER_ID", global = true)]
    pub user_id: Option<String>,

    /// Store objects and records under a local directory instead of Supabase
    #[arg(long, env = "UPLINK_LOCAL_ROOT", global = true)]
    pub local_root: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}
