//! Adapters for a Supabase project: Storage for objects, PostgREST for
//! file records, and the auth endpoint for the signed-in user.

mod client;
mod identity;
mod metadata;
mod object_store;

pub use client::SupabaseBackend;
pub use identity::SessionIdentity;
pub use metadata::SupabaseMetadataStore;
pub use object_store::{RESUMABLE_CHUNK, SupabaseObjectStore};
