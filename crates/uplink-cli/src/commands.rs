//! Available subcommands.

use std::path::PathBuf;

use clap::Subcommand;

/// Operations the CLI can perform.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload one or more files, one at a time, with live progress
    Upload {
        /// Files to upload, in queue order
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Destination folder id
        #[arg(long)]
        folder: Option<String>,
        /// Attempt budget per file
        #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
        max_attempts: u32,
        /// Upload images as-is instead of recompressing them
        #[arg(long)]
        no_transform: bool,
    },

    /// Print a time-limited download URL for an uploaded object
    Sign {
        /// Remote path of the object (as stored in the file record)
        path: String,
        /// Validity in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: u64,
    },
}
