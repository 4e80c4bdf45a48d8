#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

mod config;
mod error;
pub mod local;
pub mod supabase;

// ============================================================================
// Public API
// ============================================================================

pub use config::{DEFAULT_BUCKET, DEFAULT_FILES_TABLE, SupabaseConfig};
pub use error::{StorageError, StorageResult};
pub use local::{JsonlMetadataStore, LocalObjectStore};
pub use supabase::{
    RESUMABLE_CHUNK, SessionIdentity, SupabaseBackend, SupabaseMetadataStore, SupabaseObjectStore,
};

// Silence unused dev-dependency warnings
#[cfg(test)]
use mockito as _;
#[cfg(test)]
use tempfile as _;
#[cfg(test)]
use tokio_test as _;
