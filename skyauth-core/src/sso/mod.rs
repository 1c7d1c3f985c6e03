//! Federated login protocol layer.
//!
//! # Provider capabilities
//!
//! Every provider implements [`OAuthProvider`]. On top of that a provider
//! exposes zero or more capabilities through the `as_*` accessors:
//!
//! - [`NonOpenIdConnectProvider`]: exchange the code for an access token, then
//!   call a profile endpoint (Google, Facebook, Instagram, LinkedIn)
//! - [`OpenIdConnectProvider`]: exchange the code for a signed ID token and
//!   validate it against the provider JWKS (Azure AD v2, Apple)
//! - [`ExternalAccessTokenFlowProvider`]: the caller already holds a provider
//!   access token, typically from a mobile SDK
//!
//! Capabilities are resolved through these accessors, never by inspecting the
//! concrete type, so adding a [`ProviderKind`] is checked at compile time.

pub mod auth_code;
pub mod callback;
pub mod factory;
pub mod http;
pub mod login_id;
pub mod nonce;
pub mod oidc;
pub mod pkce;
pub mod providers;
pub mod state;
pub mod user_info;

pub use auth_code::{AuthorizationCodeStore, SessionCreateReason, SkygearAuthorizationCode};
pub use callback::{validate_callback_url, CallbackResponse};
pub use factory::{OAuthProviderFactory, OAuthProviderSource, ProviderContext};
pub use pkce::CodeVerifier;
pub use state::{Action, LinkState, LoginState, OnUserDuplicate, State, StateCodec, UxMode};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{ProviderConfig, ProviderKeys, ProviderKind};
use crate::{Error, Result};

/// Canonical identity fact extracted from a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUserInfo {
    /// Provider scoped, opaque
    pub id: String,
    /// Normalized; `None` when the provider did not return one
    pub email: Option<String>,
}

/// Token endpoint response, kept verbatim for the principal snapshot
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenResp {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl std::fmt::Debug for AccessTokenResp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenResp")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("has_id_token", &self.id_token.is_some())
            .finish_non_exhaustive()
    }
}

impl AccessTokenResp {
    #[must_use]
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: Some("Bearer".to_string()),
            ..Self::default()
        }
    }
}

/// Query or form parameters the provider sends back to the redirect URI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Everything learnt about the user from one provider round-trip
#[derive(Debug, Clone)]
pub struct AuthInfo {
    pub provider_config: ProviderConfig,
    pub provider_raw_profile: Value,
    pub provider_access_token_resp: AccessTokenResp,
    pub provider_user_info: ProviderUserInfo,
}

impl AuthInfo {
    #[must_use]
    pub fn provider_keys(&self) -> ProviderKeys {
        provider_keys(&self.provider_config)
    }
}

/// Keys that scope a provider user ID. Only Azure AD v2 has any.
#[must_use]
pub fn provider_keys(config: &ProviderConfig) -> ProviderKeys {
    let mut keys = ProviderKeys::new();
    if config.kind == ProviderKind::Azureadv2 {
        if let Some(tenant) = &config.tenant {
            keys.insert("tenant".to_string(), tenant.clone());
        }
    }
    keys
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn config(&self) -> &ProviderConfig;

    /// Provider authorization URL carrying `encoded_state`
    async fn get_auth_url(&self, state: &State, encoded_state: &str) -> Result<String>;

    /// Exchange the authorization response for user information
    async fn get_auth_info(&self, response: &AuthorizationResponse, state: &State) -> Result<AuthInfo>;

    fn as_non_open_id_connect(&self) -> Option<&dyn NonOpenIdConnectProvider> {
        None
    }

    fn as_open_id_connect(&self) -> Option<&dyn OpenIdConnectProvider> {
        None
    }

    fn as_external_access_token_flow(&self) -> Option<&dyn ExternalAccessTokenFlowProvider> {
        None
    }
}

/// Access token plus profile endpoint
#[async_trait]
pub trait NonOpenIdConnectProvider: OAuthProvider {
    async fn exchange_code(&self, code: &str) -> Result<AccessTokenResp>;

    async fn fetch_raw_profile(&self, token: &AccessTokenResp) -> Result<Value>;
}

/// Signed ID token validated against the provider JWKS
#[async_trait]
pub trait OpenIdConnectProvider: OAuthProvider {
    /// Verified ID token claims plus the token response they came in
    async fn exchange_code_for_claims(
        &self,
        response: &AuthorizationResponse,
        state: &State,
    ) -> Result<(serde_json::Map<String, Value>, AccessTokenResp)>;
}

#[async_trait]
pub trait ExternalAccessTokenFlowProvider: OAuthProvider {
    async fn external_access_token_get_auth_info(&self, token: AccessTokenResp) -> Result<AuthInfo>;
}

/// Shared `get_auth_info` for access-token-then-profile providers
pub(crate) async fn non_oidc_auth_info<P>(provider: &P, decoder: &user_info::UserInfoDecoder, code: &str) -> Result<AuthInfo>
where
    P: NonOpenIdConnectProvider + ?Sized,
{
    if code.is_empty() {
        return Err(Error::sso_invalid_params("missing authorization code"));
    }
    let token = provider.exchange_code(code).await?;
    profile_auth_info(provider, decoder, token).await
}

/// Fetch and decode the profile for an access token we already hold
pub(crate) async fn profile_auth_info<P>(
    provider: &P,
    decoder: &user_info::UserInfoDecoder,
    token: AccessTokenResp,
) -> Result<AuthInfo>
where
    P: NonOpenIdConnectProvider + ?Sized,
{
    let raw = provider.fetch_raw_profile(&token).await?;
    let user_info = decoder.decode(provider.kind(), &raw)?;
    Ok(AuthInfo {
        provider_config: provider.config().clone(),
        provider_raw_profile: raw,
        provider_access_token_resp: token,
        provider_user_info: user_info,
    })
}
