//! Public configuration for the Supabase-style adapters.

use std::time::Duration;

/// Default storage bucket for user uploads.
pub const DEFAULT_BUCKET: &str = "user-files";

/// Table holding one row per uploaded file.
pub const DEFAULT_FILES_TABLE: &str = "files";

/// Configuration for the HTTP adapters.
///
/// # Example
///
/// ```
/// use uplink_storage::SupabaseConfig;
/// use std::time::Duration;
///
/// let config = SupabaseConfig::new("https://project.supabase.co", "anon-key")
///     .with_bucket("avatars")
///     .with_timeout(Duration::from_secs(120));
/// ```
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://<ref>.supabase.co`.
    pub(crate) base_url: String,
    /// Public API key sent as `apikey` on every request.
    pub(crate) anon_key: String,
    /// Storage bucket.
    pub(crate) bucket: String,
    /// Table the metadata store inserts into.
    pub(crate) files_table: String,
    /// Timeout for control requests; transfers are never time-limited.
    pub(crate) timeout: Duration,
    /// Timeout for establishing a connection.
    pub(crate) connect_timeout: Duration,
    /// User agent string for HTTP requests.
    pub(crate) user_agent: String,
    /// Use the resumable (TUS) endpoint for multi-part transfers.
    pub(crate) resumable: bool,
    /// `cache-control` max-age sent with new objects, in seconds.
    pub(crate) cache_control_secs: u32,
}

impl SupabaseConfig {
    /// Create a config for a project.
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            anon_key: anon_key.into(),
            bucket: DEFAULT_BUCKET.to_string(),
            files_table: DEFAULT_FILES_TABLE.to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: concat!("uplink-storage/", env!("CARGO_PKG_VERSION")).to_string(),
            resumable: true,
            cache_control_secs: 3600,
        }
    }

    /// Set the storage bucket.
    ///
    /// Defaults to `user-files`.
    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Set the metadata table.
    #[must_use]
    pub fn with_files_table(mut self, table: impl Into<String>) -> Self {
        self.files_table = table.into();
        self
    }

    /// Set the timeout for control requests (existence checks, signing,
    /// metadata inserts, user lookups).
    ///
    /// Object uploads are not bound by it. Defaults to 30 seconds.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the TCP/TLS connect timeout. Defaults to 10 seconds.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Enable or disable the resumable endpoint for multi-part transfers.
    ///
    /// When disabled, large payloads go up in one opaque request and the
    /// queue falls back to simulated progress.
    #[must_use]
    pub const fn with_resumable(mut self, resumable: bool) -> Self {
        self.resumable = resumable;
        self
    }

    /// Set the `cache-control` max-age for new objects.
    #[must_use]
    pub const fn with_cache_control_secs(mut self, secs: u32) -> Self {
        self.cache_control_secs = secs;
        self
    }

    /// Storage bucket.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}
