//! Shared HTTP plumbing for the Supabase adapters.

use reqwest::{Method, RequestBuilder, Response};
use url::Url;

use crate::config::SupabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Connection to one Supabase project.
///
/// Cheap to clone; the object store, metadata store and identity adapters
/// share one connection pool.
#[derive(Debug, Clone)]
pub struct SupabaseBackend {
    http: reqwest::Client,
    base_url: Url,
    config: SupabaseConfig,
}

impl SupabaseBackend {
    /// Validate the config and build the HTTP client.
    pub fn connect(config: SupabaseConfig) -> StorageResult<Self> {
        let base_url = Url::parse(&config.base_url)?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(StorageError::InvalidResponse {
                message: format!("unsupported project URL: {base_url}"),
            });
        }

        // No overall timeout: transfers run as long as bytes keep moving.
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    /// Adapter configuration.
    pub const fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    /// Project URL.
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an endpoint URL from path segments.
    ///
    /// Each segment is percent-encoded on its own; segments containing `/`
    /// are split first so object paths keep their hierarchy.
    pub(crate) fn endpoint<'a>(
        &self,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> StorageResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| StorageError::InvalidResponse {
                    message: format!("project URL cannot be a base: {}", self.base_url),
                })?;
            path.pop_if_empty();
            for segment in segments {
                path.extend(segment.split('/').filter(|s| !s.is_empty()));
            }
        }
        Ok(url)
    }

    /// Start a transfer request carrying the project key and a bearer token.
    ///
    /// Only cancellation or a transport failure ends it.
    pub(crate) fn request(&self, method: Method, url: Url, auth_token: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(auth_token)
    }

    /// Start a short control request (lookups, inserts, signing), bounded by
    /// the configured request timeout.
    pub(crate) fn control(&self, method: Method, url: Url, auth_token: &str) -> RequestBuilder {
        self.request(method, url, auth_token).timeout(self.config.timeout)
    }

    /// Send a request, turning non-success statuses into `StorageError::Http`.
    pub(crate) async fn send(request: RequestBuilder) -> StorageResult<Response> {
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(StorageError::from_response(response).await)
        }
    }
}
