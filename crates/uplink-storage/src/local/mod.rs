//! Adapters backed by the local filesystem.
//!
//! Useful for offline runs and as a stand-in object store in tests.

mod metadata;
mod object_store;

pub use metadata::JsonlMetadataStore;
pub use object_store::LocalObjectStore;
