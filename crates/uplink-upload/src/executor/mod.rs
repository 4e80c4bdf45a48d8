//! Transfer executor.
//!
//! Performs one transfer of one prepared payload: resolve the session,
//! name the remote object, choose a strategy, and stream progress to the
//! caller. Knows nothing about the queue; the scheduler decides what a
//! failure means.

mod paths;

pub use paths::remote_path;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use uplink_core::{
    IdentityPort, ObjectStorePort, ProgressCallback, PutObject, TransferStrategy, UploadError,
    UploadManagerConfig,
};

use crate::progress::SimulatedProgress;

/// One progress observation from a running transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferProgress {
    /// Cumulative bytes sent (or estimated).
    pub transferred: u64,
    /// Bytes this transfer will send in total.
    pub total: u64,
    /// Whether `transferred` comes from the simulated estimator.
    pub simulated: bool,
}

/// Receiver for transfer progress.
pub type ProgressSink = Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// Credentials captured at the start of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Current user id.
    pub owner_id: String,
    /// Bearer token.
    pub auth_token: String,
}

/// A transfer that passed the session check and has a remote path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTransfer {
    /// Namespaced remote path.
    pub remote_path: String,
    /// Session used for the put and the metadata commit.
    pub session: Session,
    /// Strategy chosen for the payload size.
    pub strategy: TransferStrategy,
}

/// Executes transfers against an object store.
pub struct TransferExecutor {
    store: Arc<dyn ObjectStorePort>,
    identity: Arc<dyn IdentityPort>,
    chunk_threshold: u64,
    tick: Duration,
}

impl TransferExecutor {
    /// Create an executor.
    pub fn new(
        store: Arc<dyn ObjectStorePort>,
        identity: Arc<dyn IdentityPort>,
        config: &UploadManagerConfig,
    ) -> Self {
        Self {
            store,
            identity,
            chunk_threshold: config.chunk_threshold,
            tick: config.progress_interval.max(Duration::from_millis(1)),
        }
    }

    /// Resolve the current user and token.
    ///
    /// # Errors
    ///
    /// `AuthenticationMissing` when either is absent.
    pub async fn session(&self) -> Result<Session, UploadError> {
        let user = self
            .identity
            .current_user()
            .await
            .ok_or_else(|| UploadError::authentication_missing("You must be logged in to upload files"))?;
        let auth_token = self
            .identity
            .current_auth_token()
            .await
            .ok_or_else(|| UploadError::authentication_missing("No active session"))?;
        Ok(Session {
            owner_id: user.id,
            auth_token,
        })
    }

    /// Check the session and name the remote object. Sends nothing.
    ///
    /// # Errors
    ///
    /// `AuthenticationMissing` when no user or session is available.
    pub async fn prepare(&self, file_name: &str, len: u64) -> Result<PreparedTransfer, UploadError> {
        let session = self.session().await?;
        let remote_path = remote_path(&session.owner_id, file_name, Utc::now());
        Ok(PreparedTransfer {
            remote_path,
            session,
            strategy: TransferStrategy::for_len(len, self.chunk_threshold),
        })
    }

    /// Put `body` at the prepared path.
    ///
    /// Progress is reported through `sink`, ending with `transferred == total`
    /// on success. When the store cannot report progress for the chosen
    /// strategy, a simulated estimate is ticked out instead.
    ///
    /// # Errors
    ///
    /// `Cancelled` when `cancel` fires first; otherwise whatever the store
    /// returned.
    pub async fn execute(
        &self,
        prepared: &PreparedTransfer,
        body: Bytes,
        content_type: &str,
        cancel: &CancellationToken,
        sink: &ProgressSink,
    ) -> Result<(), UploadError> {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let total = body.len() as u64;
        let native = self.store.reports_progress(prepared.strategy);
        let request = PutObject {
            path: prepared.remote_path.clone(),
            body,
            content_type: content_type.to_string(),
            strategy: prepared.strategy,
            auth_token: prepared.session.auth_token.clone(),
        };

        tracing::debug!(
            target: "uplink.upload",
            path = %prepared.remote_path,
            bytes = total,
            strategy = ?prepared.strategy,
            native_progress = native,
            "Starting transfer"
        );

        sink(TransferProgress {
            transferred: 0,
            total,
            simulated: !native,
        });

        if native {
            self.put_with_progress(request, total, cancel, sink).await?;
        } else {
            self.put_simulated(request, total, cancel, sink).await?;
        }

        sink(TransferProgress {
            transferred: total,
            total,
            simulated: !native,
        });
        Ok(())
    }

    async fn put_with_progress(
        &self,
        request: PutObject,
        total: u64,
        cancel: &CancellationToken,
        sink: &ProgressSink,
    ) -> Result<(), UploadError> {
        let forward = Arc::clone(sink);
        let callback: ProgressCallback = Arc::new(move |sent| {
            forward(TransferProgress {
                transferred: sent.min(total),
                total,
                simulated: false,
            });
        });

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(UploadError::Cancelled),
            result = self.store.put_object(request, callback) => result,
        }
    }

    async fn put_simulated(
        &self,
        request: PutObject,
        total: u64,
        cancel: &CancellationToken,
        sink: &ProgressSink,
    ) -> Result<(), UploadError> {
        let model = SimulatedProgress::new(total);
        let started = Instant::now();
        let mut put = self.store.put_object(request, Arc::new(|_| {}));

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(UploadError::Cancelled),
                result = &mut put => return result,
                _ = ticker.tick() => {
                    sink(TransferProgress {
                        transferred: model.bytes_at(started.elapsed()),
                        total,
                        simulated: true,
                    });
                }
            }
        }
    }
}
