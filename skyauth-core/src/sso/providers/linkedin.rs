//! LinkedIn `OAuth2` provider (API v2)
//!
//! The profile and the primary contact come from two endpoints and are stored
//! together as `{"profile": ..., "primary_contact": ...}`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::scope_or;
use crate::models::{ProviderConfig, ProviderKind};
use crate::sso::http::{self, make_auth_url, AuthUrlParams};
use crate::sso::{
    non_oidc_auth_info, profile_auth_info, AccessTokenResp, AuthInfo, AuthorizationResponse,
    ExternalAccessTokenFlowProvider, NonOpenIdConnectProvider, OAuthProvider, ProviderContext, State,
};
use crate::Result;

const DEFAULT_SCOPE: &str = "r_liteprofile r_emailaddress";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedInEndpoints {
    pub authorization: String,
    pub token: String,
    pub me: String,
    pub contact: String,
}

impl Default for LinkedInEndpoints {
    fn default() -> Self {
        Self {
            authorization: "https://www.linkedin.com/oauth/v2/authorization".to_string(),
            token: "https://www.linkedin.com/oauth/v2/accessToken".to_string(),
            me: "https://api.linkedin.com/v2/me?projection=(id,localizedFirstName,localizedLastName,profilePicture(displayImage~digitalmediaAsset:playableStreams))".to_string(),
            contact: "https://api.linkedin.com/v2/clientAwareMemberHandles?q=members&projection=(elements*(primary,type,handle~))".to_string(),
        }
    }
}

pub struct LinkedInProvider {
    config: ProviderConfig,
    ctx: Arc<ProviderContext>,
    endpoints: LinkedInEndpoints,
}

impl LinkedInProvider {
    #[must_use]
    pub fn new(config: ProviderConfig, ctx: Arc<ProviderContext>) -> Self {
        Self {
            config,
            ctx,
            endpoints: LinkedInEndpoints::default(),
        }
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: LinkedInEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}

#[async_trait]
impl OAuthProvider for LinkedInProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Linkedin
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
impl NonOpenIdConnectProvider for LinkedInProvider {
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
        let profile = http::get_json(&self.ctx.http, &self.endpoints.me, Some(&token.access_token)).await?;
        let primary_contact =
            http::get_json(&self.ctx.http, &self.endpoints.contact, Some(&token.access_token)).await?;
        Ok(json!({
            "profile": profile,
            "primary_contact": primary_contact,
        }))
    }
}

#[async_trait]
impl ExternalAccessTokenFlowProvider for LinkedInProvider {
    async fn external_access_token_get_auth_info(&self, token: AccessTokenResp) -> Result<AuthInfo> {
        profile_auth_info(self, &self.ctx.user_info_decoder, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sso::state::Action;
    use crate::test_helpers::{provider_config, provider_context, sample_state};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_two_step_profile() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/v2/accessToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "li-at",
                "expires_in": 5_184_000
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "li-member",
                "localizedFirstName": "Jane"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/clientAwareMemberHandles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "elements": [
                    {"primary": true, "type": "EMAIL", "handle~": {"emailAddress": "jane@example.com"}}
                ]
            })))
            .mount(&server)
            .await;

        let provider = LinkedInProvider::new(provider_config("li", ProviderKind::Linkedin), provider_context())
            .with_endpoints(LinkedInEndpoints {
                authorization: format!("{}/oauth/v2/authorization", server.uri()),
                token: format!("{}/oauth/v2/accessToken", server.uri()),
                me: format!("{}/v2/me", server.uri()),
                contact: format!("{}/v2/clientAwareMemberHandles", server.uri()),
            });

        let response = AuthorizationResponse {
            code: "c".to_string(),
            ..AuthorizationResponse::default()
        };
        let info = provider
            .get_auth_info(&response, &sample_state(Action::Login))
            .await
            .unwrap();
        assert_eq!(info.provider_user_info.id, "li-member");
        assert_eq!(info.provider_user_info.email.as_deref(), Some("jane@example.com"));
        assert_eq!(info.provider_raw_profile["profile"]["localizedFirstName"], "Jane");
    }
}
