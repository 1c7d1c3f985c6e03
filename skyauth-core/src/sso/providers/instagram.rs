//! Instagram `OAuth2` provider

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

use super::scope_or;
use crate::models::{ProviderConfig, ProviderKind};
use crate::sso::http::{self, make_auth_url, AuthUrlParams};
use crate::sso::{
    non_oidc_auth_info, profile_auth_info, AccessTokenResp, AuthInfo, AuthorizationResponse,
    ExternalAccessTokenFlowProvider, NonOpenIdConnectProvider, OAuthProvider, ProviderContext, State,
};
use crate::{Error, Result};

const DEFAULT_SCOPE: &str = "basic";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstagramEndpoints {
    pub authorization: String,
    pub token: String,
    pub user_info: String,
}

impl Default for InstagramEndpoints {
    fn default() -> Self {
        Self {
            authorization: "https://api.instagram.com/oauth/authorize".to_string(),
            token: "https://api.instagram.com/oauth/access_token".to_string(),
            user_info: "https://api.instagram.com/v1/users/self".to_string(),
        }
    }
}

pub struct InstagramProvider {
    config: ProviderConfig,
    ctx: Arc<ProviderContext>,
    endpoints: InstagramEndpoints,
}

impl InstagramProvider {
    #[must_use]
    pub fn new(config: ProviderConfig, ctx: Arc<ProviderContext>) -> Self {
        Self {
            config,
            ctx,
            endpoints: InstagramEndpoints::default(),
        }
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: InstagramEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}

#[async_trait]
impl OAuthProvider for InstagramProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Instagram
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
impl NonOpenIdConnectProvider for InstagramProvider {
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

    /// The v1 API takes the token as a query parameter.
    async fn fetch_raw_profile(&self, token: &AccessTokenResp) -> Result<Value> {
        let mut url = Url::parse(&self.endpoints.user_info)
            .map_err(|e| Error::Internal(format!("Invalid Instagram user info URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("access_token", &token.access_token);
        http::get_json(&self.ctx.http, url.as_str(), None).await
    }
}

#[async_trait]
impl ExternalAccessTokenFlowProvider for InstagramProvider {
    async fn external_access_token_get_auth_info(&self, token: AccessTokenResp) -> Result<AuthInfo> {
        profile_auth_info(self, &self.ctx.user_info_decoder, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{provider_config, provider_context};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_profile_uses_query_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/users/self"))
            .and(query_param("access_token", "ig-at"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"id": "17841", "username": "jane"}
            })))
            .mount(&server)
            .await;

        let provider = InstagramProvider::new(provider_config("ig", ProviderKind::Instagram), provider_context())
            .with_endpoints(InstagramEndpoints {
                user_info: format!("{}/v1/users/self", server.uri()),
                ..InstagramEndpoints::default()
            });

        let info = provider
            .external_access_token_get_auth_info(AccessTokenResp::bearer("ig-at"))
            .await
            .unwrap();
        assert_eq!(info.provider_user_info.id, "17841");
        assert_eq!(info.provider_raw_profile["data"]["username"], "jane");
    }
}
