//! CLI entry point - the composition root.
//!
//! Configuration is resolved once, adapters are wired in `bootstrap`, and
//! each command is routed to its handler.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use uplink_cli::{Cli, CliConfig, CliError, Commands, bootstrap, handlers};
use uplink_core::{TransformConfig, UploadManagerConfig};

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = CliConfig::from_cli(&cli)?;

    match cli.command {
        Commands::Upload {
            files,
            folder,
            max_attempts,
            no_transform,
        } => {
            let mut upload = UploadManagerConfig::new()
                .with_max_attempts(max_attempts)
                .with_default_folder(folder);
            if no_transform {
                upload = upload.with_transform(TransformConfig::disabled());
            }
            let ctx = bootstrap(&config, upload)?;
            handlers::upload::execute(&ctx, &files).await
        }
        Commands::Sign { path, ttl } => {
            let ctx = bootstrap(&config, UploadManagerConfig::new())?;
            handlers::sign::execute(&ctx, &path, ttl).await
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before clap reads them
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {err}");
        std::process::exit(err.exit_code());
    }
    Ok(())
}
