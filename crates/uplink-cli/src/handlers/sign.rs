//! `uplink sign` - print a signed download URL.

use std::time::Duration;

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Create a signed URL for `path` valid for `ttl_secs`.
pub async fn signed_url(ctx: &CliContext, path: &str, ttl_secs: u64) -> Result<String, CliError> {
    let token = ctx.identity.current_auth_token().await.ok_or_else(|| {
        CliError::Config("No active session: set UPLINK_ACCESS_TOKEN".to_string())
    })?;

    let url = ctx
        .objects
        .signed_download_url(path, Duration::from_secs(ttl_secs), &token)
        .await?;
    Ok(url)
}

/// Execute the sign command.
pub async fn execute(ctx: &CliContext, path: &str, ttl_secs: u64) -> Result<(), CliError> {
    let url = signed_url(ctx, path, ttl_secs).await?;
    println!("{url}");
    Ok(())
}
