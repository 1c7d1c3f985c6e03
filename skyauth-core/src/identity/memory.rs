//! In-memory identity storage.
//!
//! Implements every store trait plus [`TxContext`] over plain maps. Meant for
//! single-instance development setups and tests; only one transaction may be
//! open at a time.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{GetByProviderOptions, IdentityProvider, OAuthPrincipalStore, TxContext, UserProfileStore, UserStore};
use crate::models::{OAuthPrincipal, Principal, User, UserId, UserProfile};
use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    profiles: HashMap<UserId, UserProfile>,
    principals: Vec<Principal>,
}

#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    tables: RwLock<Tables>,
    snapshot: RwLock<Option<Tables>>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user together with an empty profile
    pub async fn insert_user(&self, user: User) {
        let mut tables = self.tables.write().await;
        tables
            .profiles
            .insert(user.id.clone(), UserProfile::empty(user.id.clone(), user.created_at));
        tables.users.insert(user.id.clone(), user);
    }

    /// Seed a principal of any kind
    pub async fn insert_principal(&self, principal: Principal) {
        self.tables.write().await.principals.push(principal);
    }

    pub async fn users(&self) -> Vec<User> {
        self.tables.read().await.users.values().cloned().collect()
    }

    pub async fn oauth_principals(&self) -> Vec<OAuthPrincipal> {
        self.tables
            .read()
            .await
            .principals
            .iter()
            .filter_map(|p| match p {
                Principal::OAuth(p) => Some(p.clone()),
                Principal::Password(_) => None,
            })
            .collect()
    }
}

fn claim<'a>(principal: &'a Principal, name: &str) -> Option<&'a str> {
    let claims = match principal {
        Principal::Password(p) => &p.claims,
        Principal::OAuth(p) => &p.claims,
    };
    claims.get(name).map(String::as_str)
}

#[async_trait]
impl IdentityProvider for MemoryIdentityStore {
    async fn list_principals_by_claim(&self, claim_name: &str, value: &str) -> Result<Vec<Principal>> {
        Ok(self
            .tables
            .read()
            .await
            .principals
            .iter()
            .filter(|p| claim(p, claim_name) == Some(value))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OAuthPrincipalStore for MemoryIdentityStore {
    async fn get_principal_by_provider(&self, options: &GetByProviderOptions) -> Result<OAuthPrincipal> {
        self.tables
            .read()
            .await
            .principals
            .iter()
            .find_map(|p| match p {
                Principal::OAuth(p)
                    if p.provider_type == options.provider_type
                        && p.provider_keys == options.provider_keys
                        && p.provider_user_id == options.provider_user_id =>
                {
                    Some(p.clone())
                }
                _ => None,
            })
            .ok_or(Error::IdentityNotFound)
    }

    async fn create_principal(&self, principal: &OAuthPrincipal) -> Result<()> {
        self.tables
            .write()
            .await
            .principals
            .push(Principal::OAuth(principal.clone()));
        Ok(())
    }

    async fn update_principal(&self, principal: &OAuthPrincipal) -> Result<()> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .principals
            .iter_mut()
            .find_map(|p| match p {
                Principal::OAuth(p) if p.id == principal.id => Some(p),
                _ => None,
            })
            .ok_or_else(|| Error::NotFound(format!("principal {}", principal.id)))?;
        *existing = principal.clone();
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryIdentityStore {
    async fn create_user(&self, user: &User) -> Result<()> {
        self.tables.write().await.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get_user(&self, user_id: &UserId) -> Result<User> {
        self.tables
            .read()
            .await
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("user {user_id}")))
    }
}

#[async_trait]
impl UserProfileStore for MemoryIdentityStore {
    async fn create_user_profile(&self, profile: &UserProfile) -> Result<()> {
        self.tables
            .write()
            .await
            .profiles
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn get_user_profile(&self, user_id: &UserId) -> Result<UserProfile> {
        self.tables
            .read()
            .await
            .profiles
            .get(user_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("user profile {user_id}")))
    }
}

#[async_trait]
impl TxContext for MemoryIdentityStore {
    async fn begin_tx(&self) -> Result<()> {
        let mut snapshot = self.snapshot.write().await;
        if snapshot.is_some() {
            return Err(Error::Internal("transaction already in progress".to_string()));
        }
        *snapshot = Some(self.tables.read().await.clone());
        Ok(())
    }

    async fn commit_tx(&self) -> Result<()> {
        self.snapshot
            .write()
            .await
            .take()
            .map(|_| ())
            .ok_or_else(|| Error::Internal("no transaction in progress".to_string()))
    }

    async fn rollback_tx(&self) -> Result<()> {
        let snapshot = self
            .snapshot
            .write()
            .await
            .take()
            .ok_or_else(|| Error::Internal("no transaction in progress".to_string()))?;
        *self.tables.write().await = snapshot;
        Ok(())
    }
}
