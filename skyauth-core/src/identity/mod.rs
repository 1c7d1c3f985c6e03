//! Identity resolution and the store/side-effect interfaces it consumes.
//!
//! Storage, hooks, task dispatch and transactions belong to the host server;
//! this module only sequences calls against these traits.

pub mod memory;
pub mod resolver;

pub use memory::MemoryIdentityStore;
pub use resolver::{IdentityCollaborators, IdentityResolver, Resolution, ResolutionOutcome};

use async_trait::async_trait;

use crate::models::{Event, OAuthPrincipal, Principal, ProviderKeys, ProviderKind, TaskSpec, User, UserId, UserProfile};
use crate::Result;

/// Lookup key of an OAuth principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetByProviderOptions {
    pub provider_type: ProviderKind,
    pub provider_keys: ProviderKeys,
    pub provider_user_id: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Principals of any kind carrying `claim_name == value`
    async fn list_principals_by_claim(&self, claim_name: &str, value: &str) -> Result<Vec<Principal>>;
}

#[async_trait]
pub trait OAuthPrincipalStore: Send + Sync {
    /// [`crate::Error::IdentityNotFound`] when no principal matches
    async fn get_principal_by_provider(&self, options: &GetByProviderOptions) -> Result<OAuthPrincipal>;

    async fn create_principal(&self, principal: &OAuthPrincipal) -> Result<()>;

    async fn update_principal(&self, principal: &OAuthPrincipal) -> Result<()>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: &User) -> Result<()>;

    /// [`crate::Error::NotFound`] when the user does not exist
    async fn get_user(&self, user_id: &UserId) -> Result<User>;
}

#[async_trait]
pub trait UserProfileStore: Send + Sync {
    async fn create_user_profile(&self, profile: &UserProfile) -> Result<()>;

    async fn get_user_profile(&self, user_id: &UserId) -> Result<UserProfile>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    /// Dispatch a domain event; an error aborts the surrounding transaction.
    async fn dispatch_event(&self, event: Event, user: &User) -> Result<()>;
}

/// Fire-and-forget background work
#[cfg_attr(test, mockall::automock)]
pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, task: TaskSpec);
}

/// Transaction boundary supplied by the host datastore
#[async_trait]
pub trait TxContext: Send + Sync {
    async fn begin_tx(&self) -> Result<()>;

    async fn commit_tx(&self) -> Result<()>;

    async fn rollback_tx(&self) -> Result<()>;
}
