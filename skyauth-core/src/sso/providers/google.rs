//! Google `OAuth2` provider

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::scope_or;
use crate::models::{ProviderConfig, ProviderKind};
use crate::sso::http::{self, make_auth_url, AuthUrlParams};
use crate::sso::{
    non_oidc_auth_info, profile_auth_info, AccessTokenResp, AuthInfo, AuthorizationResponse,
    ExternalAccessTokenFlowProvider, NonOpenIdConnectProvider, OAuthProvider, ProviderContext, State,
};
use crate::Result;

const DEFAULT_SCOPE: &str = "openid profile email";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleEndpoints {
    pub authorization: String,
    pub token: String,
    pub user_info: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            authorization: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token: "https://www.googleapis.com/oauth2/v4/token".to_string(),
            user_info: "https://www.googleapis.com/oauth2/v1/userinfo".to_string(),
        }
    }
}

pub struct GoogleProvider {
    config: ProviderConfig,
    ctx: Arc<ProviderContext>,
    endpoints: GoogleEndpoints,
}

impl GoogleProvider {
    #[must_use]
    pub fn new(config: ProviderConfig, ctx: Arc<ProviderContext>) -> Self {
        Self {
            config,
            ctx,
            endpoints: GoogleEndpoints::default(),
        }
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: GoogleEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn get_auth_url(&self, _state: &State, encoded_state: &str) -> Result<String> {
        let redirect_uri = self.ctx.redirect_uri(&self.config.id);
        make_auth_url(
            &self.endpoints.authorization,
            &AuthUrlParams {
                client_id: &self.config.client_id,
                redirect_uri: &redirect_uri,
                scope: scope_or(&self.config.scope, DEFAULT_SCOPE),
                state: encoded_state,
                access_type: Some("offline"),
                prompt: Some("select_account"),
                ..AuthUrlParams::default()
            },
        )
    }

    async fn get_auth_info(&self, response: &AuthorizationResponse, _state: &State) -> Result<AuthInfo> {
        non_oidc_auth_info(self, &self.ctx.user_info_decoder, &response.code).await
    }

    fn as_non_open_id_connect(&self) -> Option<&dyn NonOpenIdConnectProvider> {
        Some(self)
    }

    fn as_external_access_token_flow(&self) -> Option<&dyn ExternalAccessTokenFlowProvider> {
        Some(self)
    }
}

#[async_trait]
impl NonOpenIdConnectProvider for GoogleProvider {
    async fn exchange_code(&self, code: &str) -> Result<AccessTokenResp> {
        http::exchange_code(
            &self.ctx.http,
            &self.endpoints.token,
            code,
            &self.config.client_id,
            &self.config.client_secret,
            &self.ctx.redirect_uri(&self.config.id),
        )
        .await
    }

    async fn fetch_raw_profile(&self, token: &AccessTokenResp) -> Result<Value> {
        http::get_json(&self.ctx.http, &self.endpoints.user_info, Some(&token.access_token)).await
    }
}

#[async_trait]
impl ExternalAccessTokenFlowProvider for GoogleProvider {
    async fn external_access_token_get_auth_info(&self, token: AccessTokenResp) -> Result<AuthInfo> {
        profile_auth_info(self, &self.ctx.user_info_decoder, token).await
    }
}
