//! Facebook `OAuth2` provider (Graph API v3.3)

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::scope_or;
use crate::models::{ProviderConfig, ProviderKind};
use crate::sso::http::{self, make_auth_url, AuthUrlParams};
use crate::sso::{
    non_oidc_auth_info, profile_auth_info, AccessTokenResp, AuthInfo, AuthorizationResponse,
    ExternalAccessTokenFlowProvider, NonOpenIdConnectProvider, OAuthProvider, ProviderContext, State, UxMode,
};
use crate::Result;

const DEFAULT_SCOPE: &str = "email public_profile";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacebookEndpoints {
    pub authorization: String,
    pub token: String,
    pub user_info: String,
}

impl Default for FacebookEndpoints {
    fn default() -> Self {
        Self {
            authorization: "https://www.facebook.com/v3.3/dialog/oauth".to_string(),
            token: "https://graph.facebook.com/v3.3/oauth/access_token".to_string(),
            user_info: "https://graph.facebook.com/v3.3/me?fields=id,email,first_name,last_name,middle_name,name,name_format,picture,short_name".to_string(),
        }
    }
}

pub struct FacebookProvider {
    config: ProviderConfig,
    ctx: Arc<ProviderContext>,
    endpoints: FacebookEndpoints,
}

impl FacebookProvider {
    #[must_use]
    pub fn new(config: ProviderConfig, ctx: Arc<ProviderContext>) -> Self {
        Self {
            config,
            ctx,
            endpoints: FacebookEndpoints::default(),
        }
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: FacebookEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}

#[async_trait]
impl OAuthProvider for FacebookProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Facebook
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn get_auth_url(&self, state: &State, encoded_state: &str) -> Result<String> {
        let redirect_uri = self.ctx.redirect_uri(&self.config.id);
        let display = if state.ux_mode == UxMode::WebPopup { "popup" } else { "page" };
        make_auth_url(
            &self.endpoints.authorization,
            &AuthUrlParams {
                client_id: &self.config.client_id,
                redirect_uri: &redirect_uri,
                scope: scope_or(&self.config.scope, DEFAULT_SCOPE),
                state: encoded_state,
                display: Some(display),
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
impl NonOpenIdConnectProvider for FacebookProvider {
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
impl ExternalAccessTokenFlowProvider for FacebookProvider {
    async fn external_access_token_get_auth_info(&self, token: AccessTokenResp) -> Result<AuthInfo> {
        profile_auth_info(self, &self.ctx.user_info_decoder, token).await
    }
}
