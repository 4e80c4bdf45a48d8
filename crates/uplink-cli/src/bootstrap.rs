//! CLI bootstrap - the composition root.
//!
//! This module is the ONLY place where infrastructure is wired together
//! for the CLI adapter. Concrete adapters come from `uplink-storage`, the
//! queue from `uplink-upload`; handlers only see the ports.

use std::path::PathBuf;
use std::sync::Arc;

use uplink_core::{
    BroadcastUploadEmitter, IdentityPort, MetadataStorePort, ObjectStorePort, StaticIdentity,
    UploadManagerConfig, UploadManagerPort,
};
use uplink_storage::{
    JsonlMetadataStore, LocalObjectStore, SessionIdentity, SupabaseBackend, SupabaseConfig,
    SupabaseMetadataStore, SupabaseObjectStore,
};
use uplink_upload::{UploadManagerDeps, build_upload_manager};

use crate::error::CliError;
use crate::parser::Cli;

/// Events buffered per subscriber before the monitor is told it lagged.
const EVENT_CAPACITY: usize = 1024;

/// Identity used by the local backend when none is configured.
const LOCAL_USER: &str = "local";

/// Where uploads go.
#[derive(Debug, Clone)]
pub enum Backend {
    /// A directory on disk: objects under `objects/`, records in `files.jsonl`.
    Local {
        /// Root directory.
        root: PathBuf,
        /// Namespace for remote paths.
        user_id: String,
    },
    /// A Supabase project.
    Supabase {
        /// Adapter configuration.
        config: SupabaseConfig,
        /// Session token, if signed in.
        access_token: Option<String>,
        /// Known user id, if any.
        user_id: Option<String>,
    },
}

/// Bootstrap configuration for the CLI.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Selected backend.
    pub backend: Backend,
}

impl CliConfig {
    /// Resolve the backend from flags and environment.
    ///
    /// A local root wins; otherwise the Supabase URL and key are required.
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        if let Some(root) = &cli.local_root {
            return Ok(Self {
                backend: Backend::Local {
                    root: root.clone(),
                    user_id: cli.user_id.clone().unwrap_or_else(|| LOCAL_USER.to_string()),
                },
            });
        }

        let url = cli.supabase_url.clone().ok_or_else(|| {
            CliError::Config(
                "UPLINK_SUPABASE_URL is not set (or pass --local-root to upload locally)"
                    .to_string(),
            )
        })?;
        let anon_key = cli
            .anon_key
            .clone()
            .ok_or_else(|| CliError::Config("UPLINK_SUPABASE_ANON_KEY is not set".to_string()))?;

        Ok(Self {
            backend: Backend::Supabase {
                config: SupabaseConfig::new(url, anon_key).with_bucket(cli.bucket.clone()),
                access_token: cli.access_token.clone(),
                user_id: cli.user_id.clone(),
            },
        })
    }
}

/// Fully composed context for CLI commands.
pub struct CliContext {
    /// The upload queue.
    pub uploads: Arc<dyn UploadManagerPort>,
    /// Event fan-out the progress monitor subscribes to.
    pub events: BroadcastUploadEmitter,
    /// Object store, for commands that bypass the queue.
    pub objects: Arc<dyn ObjectStorePort>,
    /// Session provider.
    pub identity: Arc<dyn IdentityPort>,
}

/// Wire adapters and the upload queue together.
pub fn bootstrap(config: &CliConfig, upload: UploadManagerConfig) -> Result<CliContext, CliError> {
    match &config.backend {
        Backend::Local { root, user_id } => Ok(compose(
            Arc::new(LocalObjectStore::new(root.join("objects"))),
            Arc::new(JsonlMetadataStore::new(root.join("files.jsonl"))),
            Arc::new(StaticIdentity::new(user_id.clone(), LOCAL_USER)),
            upload,
        )),
        Backend::Supabase {
            config,
            access_token,
            user_id,
        } => {
            let backend = SupabaseBackend::connect(config.clone())
                .map_err(|e| CliError::Config(e.to_string()))?;
            let mut identity = SessionIdentity::new(backend.clone(), access_token.clone());
            if let Some(user_id) = user_id {
                identity = identity.with_user_id(user_id.clone());
            }
            Ok(compose(
                Arc::new(SupabaseObjectStore::new(backend.clone())),
                Arc::new(SupabaseMetadataStore::new(backend)),
                Arc::new(identity),
                upload,
            ))
        }
    }
}

fn compose<S, M, I>(
    objects: Arc<S>,
    metadata: Arc<M>,
    identity: Arc<I>,
    upload: UploadManagerConfig,
) -> CliContext
where
    S: ObjectStorePort + 'static,
    M: MetadataStorePort + 'static,
    I: IdentityPort + 'static,
{
    let events = BroadcastUploadEmitter::new(EVENT_CAPACITY);
    let uploads = build_upload_manager(UploadManagerDeps {
        object_store: Arc::clone(&objects),
        metadata_store: metadata,
        identity: Arc::clone(&identity),
        event_emitter: Arc::new(events.clone()),
        config: upload,
    });

    CliContext {
        uploads,
        events,
        objects,
        identity,
    }
}
