//! Session-backed implementation of `IdentityPort`.
//!
//! Holds a pre-issued access token. When no user id is configured it is
//! resolved once from the auth endpoint and cached.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::warn;

use uplink_core::{IdentityPort, UserIdentity};

use super::client::SupabaseBackend;
use crate::error::StorageResult;

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
}

/// Identity derived from an access token.
#[derive(Debug)]
pub struct SessionIdentity {
    backend: SupabaseBackend,
    token: Option<String>,
    user: Mutex<Option<UserIdentity>>,
}

impl SessionIdentity {
    /// Identity for `token`; the user id is looked up on first use.
    pub fn new(backend: SupabaseBackend, token: Option<String>) -> Self {
        Self {
            backend,
            token: token.filter(|t| !t.trim().is_empty()),
            user: Mutex::new(None),
        }
    }

    /// Identity with a known user id; no lookup is performed.
    #[must_use]
    pub fn with_user_id(self, user_id: impl Into<String>) -> Self {
        Self {
            user: Mutex::new(Some(UserIdentity::new(user_id))),
            ..self
        }
    }

    async fn fetch_user(&self, token: &str) -> StorageResult<UserIdentity> {
        let url = self.backend.endpoint(["auth/v1/user"])?;
        let response =
            SupabaseBackend::send(self.backend.control(Method::GET, url, token)).await?;
        let user: AuthUser = serde_json::from_str(&response.text().await?)?;
        Ok(UserIdentity::new(user.id))
    }
}

#[async_trait]
impl IdentityPort for SessionIdentity {
    async fn current_user(&self) -> Option<UserIdentity> {
        let mut cached = self.user.lock().await;
        if cached.is_some() {
            return cached.clone();
        }

        let token = self.token.as_deref()?;
        match self.fetch_user(token).await {
            Ok(user) => {
                *cached = Some(user.clone());
                Some(user)
            }
            Err(e) => {
                // Not cached: the next transfer tries again.
                warn!(target: "uplink.storage", error = %e, "Could not resolve the signed-in user");
                None
            }
        }
    }

    async fn current_auth_token(&self) -> Option<String> {
        self.token.clone()
    }
}
