use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{PrincipalId, ProviderKind, UserId};

/// Provider-specific keys that scope a provider user ID, e.g. the Azure tenant.
pub type ProviderKeys = BTreeMap<String, String>;

/// A binding between one authentication method instance and a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Principal {
    Password(PasswordPrincipal),
    #[serde(rename = "oauth")]
    OAuth(OAuthPrincipal),
}

impl Principal {
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        match self {
            Self::Password(p) => &p.user_id,
            Self::OAuth(p) => &p.user_id,
        }
    }
}

/// Login-ID/password principal. Only its realm matters to SSO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPrincipal {
    pub id: PrincipalId,
    pub user_id: UserId,
    pub login_id_key: String,
    pub login_id: String,
    pub realm: String,
    #[serde(default)]
    pub claims: BTreeMap<String, String>,
}

/// Durable record binding a provider identity to a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthPrincipal {
    pub id: PrincipalId,
    pub user_id: UserId,
    pub provider_type: ProviderKind,
    #[serde(default)]
    pub provider_keys: ProviderKeys,
    pub provider_user_id: String,
    pub access_token_resp: serde_json::Value,
    pub user_profile: serde_json::Value,
    #[serde(default)]
    pub claims: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OAuthPrincipal {
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.claims.get("email").map(String::as_str)
    }
}
