//! `uplink upload` - enqueue files and follow them to a terminal state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use uplink_core::{UploadId, UploadItem, UploadPayload, UploadStatus};

use crate::bootstrap::CliContext;
use crate::content_type::content_type_for;
use crate::error::CliError;
use crate::presentation::ProgressView;

/// Countdown refresh interval.
const TICK: Duration = Duration::from_secs(1);

/// Final state of every enqueued item, in queue order.
#[derive(Debug, Clone)]
pub struct UploadSummary {
    /// Item snapshots.
    pub items: Vec<UploadItem>,
}

impl UploadSummary {
    /// Items that completed.
    pub fn completed(&self) -> usize {
        self.count(UploadStatus::Completed)
    }

    /// Items that failed.
    pub fn failed(&self) -> usize {
        self.count(UploadStatus::Failed)
    }

    fn count(&self, status: UploadStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }
}

/// Read files into payloads; the content type comes from the extension.
pub async fn read_payloads(files: &[PathBuf]) -> Result<Vec<UploadPayload>, CliError> {
    let mut payloads = Vec::with_capacity(files.len());
    for path in files {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| CliError::Io(format!("{}: {e}", path.display())))?;
        payloads.push(UploadPayload::new(
            display_name(path),
            content_type_for(path),
            bytes,
        ));
    }
    Ok(payloads)
}

fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

/// Enqueue payloads and drive `view` until every item is terminal.
pub async fn run(
    ctx: &CliContext,
    payloads: Vec<UploadPayload>,
    view: &mut ProgressView,
) -> Result<UploadSummary, CliError> {
    // Subscribe first so no event between enqueue and tracking is lost.
    let mut events = ctx.events.subscribe();
    let ids = ctx.uploads.enqueue(payloads).await?;

    for id in &ids {
        if let Some(item) = ctx.uploads.get(id).await {
            view.track(&item);
        }
    }

    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    while !view.all_terminal(&ids) {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => view.apply(&event),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Progress monitor lagged, resyncing");
                    view.sync(&ctx.uploads.snapshot().await);
                }
                Err(RecvError::Closed) => {
                    warn!("Upload event stream closed early");
                    break;
                }
            },
            _ = ticker.tick() => view.tick(),
        }
    }

    Ok(UploadSummary {
        items: collect(ctx, &ids).await,
    })
}

async fn collect(ctx: &CliContext, ids: &[UploadId]) -> Vec<UploadItem> {
    let mut items = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(item) = ctx.uploads.get(id).await {
            items.push(item);
        }
    }
    items
}

/// Execute the upload command.
pub async fn execute(ctx: &CliContext, files: &[PathBuf]) -> Result<(), CliError> {
    let payloads = read_payloads(files).await?;
    let total = payloads.len();

    let mut view = ProgressView::new();
    let summary = run(ctx, payloads, &mut view).await?;
    view.finish();

    for item in summary.items.iter().filter(|i| i.status == UploadStatus::Failed) {
        eprintln!(
            "{}: {}",
            item.name,
            item.last_error.as_deref().unwrap_or("upload failed")
        );
    }
    println!("{} of {total} uploaded", summary.completed());

    match summary.failed() {
        0 => Ok(()),
        failed => Err(CliError::UploadsFailed { failed, total }),
    }
}
