//! Identity/session provider port.
//!
//! The queue never authenticates on its own; it asks this port for the
//! current user and token at the start of every transfer and fails fast when
//! either is missing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The signed-in user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Stable user id; used as the remote namespace.
    pub id: String,
}

impl UserIdentity {
    /// Create an identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Port for the identity/session provider.
#[async_trait]
pub trait IdentityPort: Send + Sync {
    /// The current user, or `None` when signed out.
    async fn current_user(&self) -> Option<UserIdentity>;

    /// The current bearer token, or `None` when there is no session.
    async fn current_auth_token(&self) -> Option<String>;
}

/// An identity fixed at construction time.
///
/// Suitable for CLI use with a pre-issued token, local adapters, and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticIdentity {
    user: Option<UserIdentity>,
    token: Option<String>,
}

impl StaticIdentity {
    /// Signed-in identity.
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: Some(UserIdentity::new(user_id)),
            token: Some(token.into()),
        }
    }

    /// No user and no session.
    #[must_use]
    pub const fn signed_out() -> Self {
        Self {
            user: None,
            token: None,
        }
    }
}

#[async_trait]
impl IdentityPort for StaticIdentity {
    async fn current_user(&self) -> Option<UserIdentity> {
        self.user.clone()
    }

    async fn current_auth_token(&self) -> Option<String> {
        self.token.clone()
    }
}
