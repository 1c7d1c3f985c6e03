//! Azure AD v2 OpenID Connect provider

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::scope_or;
use crate::models::{ProviderConfig, ProviderKind};
use crate::sso::http::{make_auth_url, AuthUrlParams};
use crate::sso::oidc::{fetch_discovery_document, CodeExchange, IdTokenClaims, OidcDiscoveryDocument};
use crate::sso::{
    AccessTokenResp, AuthInfo, AuthorizationResponse, OAuthProvider, OpenIdConnectProvider, ProviderContext, State,
};
use crate::{Error, Result};

const DEFAULT_SCOPE: &str = "openid profile email";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureAdV2Endpoints {
    pub discovery: String,
}

impl AzureAdV2Endpoints {
    #[must_use]
    pub fn for_tenant(tenant: &str) -> Self {
        Self {
            discovery: format!("https://login.microsoftonline.com/{tenant}/v2.0/.well-known/openid-configuration"),
        }
    }
}

pub struct AzureAdV2Provider {
    config: ProviderConfig,
    ctx: Arc<ProviderContext>,
    endpoints: AzureAdV2Endpoints,
}

impl AzureAdV2Provider {
    #[must_use]
    pub fn new(config: ProviderConfig, ctx: Arc<ProviderContext>) -> Self {
        let endpoints = AzureAdV2Endpoints::for_tenant(config.tenant.as_deref().unwrap_or("common"));
        Self { config, ctx, endpoints }
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: AzureAdV2Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    async fn discovery_document(&self) -> Result<OidcDiscoveryDocument> {
        fetch_discovery_document(&self.ctx.http, &self.endpoints.discovery).await
    }
}

#[async_trait]
impl OAuthProvider for AzureAdV2Provider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azureadv2
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn get_auth_url(&self, state: &State, encoded_state: &str) -> Result<String> {
        let doc = self.discovery_document().await?;
        let redirect_uri = self.ctx.redirect_uri(&self.config.id);
        make_auth_url(
            &doc.authorization_endpoint,
            &AuthUrlParams {
                client_id: &self.config.client_id,
                redirect_uri: &redirect_uri,
                scope: scope_or(&self.config.scope, DEFAULT_SCOPE),
                state: encoded_state,
                nonce: Some(&state.hashed_nonce),
                response_mode: Some("form_post"),
                prompt: Some("select_account"),
                ..AuthUrlParams::default()
            },
        )
    }

    async fn get_auth_info(&self, response: &AuthorizationResponse, state: &State) -> Result<AuthInfo> {
        let (claims, token) = self.exchange_code_for_claims(response, state).await?;
        let raw = Value::Object(claims);
        let user_info = self.ctx.user_info_decoder.decode(ProviderKind::Azureadv2, &raw)?;
        Ok(AuthInfo {
            provider_config: self.config.clone(),
            provider_raw_profile: raw,
            provider_access_token_resp: token,
            provider_user_info: user_info,
        })
    }

    fn as_open_id_connect(&self) -> Option<&dyn OpenIdConnectProvider> {
        Some(self)
    }
}

#[async_trait]
impl OpenIdConnectProvider for AzureAdV2Provider {
    async fn exchange_code_for_claims(
        &self,
        response: &AuthorizationResponse,
        state: &State,
    ) -> Result<(IdTokenClaims, AccessTokenResp)> {
        if response.code.is_empty() {
            return Err(Error::sso_invalid_params("missing authorization code"));
        }

        let doc = self.discovery_document().await?;
        let redirect_uri = self.ctx.redirect_uri(&self.config.id);
        doc.exchange_code(
            &self.ctx.http,
            CodeExchange {
                code: &response.code,
                client_id: &self.config.client_id,
                client_secret: &self.config.client_secret,
                redirect_uri: &redirect_uri,
                nonce: &state.hashed_nonce,
            },
            self.ctx.clock.now_utc(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sso::state::Action;
    use crate::test_helpers::{fixed_now, provider_config, provider_context, sample_state, TestSigningKey};
    use crate::SsoFailedCause;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_discovery(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/contoso/v2.0/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "authorization_endpoint": format!("{}/authorize", server.uri()),
                "token_endpoint": format!("{}/token", server.uri()),
                "jwks_uri": format!("{}/keys", server.uri()),
                "issuer": "https://login.microsoftonline.com/contoso/v2.0"
            })))
            .mount(server)
            .await;
    }

    fn provider(server: &MockServer) -> AzureAdV2Provider {
        let mut config = provider_config("azure", ProviderKind::Azureadv2);
        config.tenant = Some("contoso".to_string());
        AzureAdV2Provider::new(config, provider_context()).with_endpoints(AzureAdV2Endpoints {
            discovery: format!("{}/contoso/v2.0/.well-known/openid-configuration", server.uri()),
        })
    }

    #[test]
    fn test_default_discovery_uses_tenant() {
        let mut config = provider_config("azure", ProviderKind::Azureadv2);
        config.tenant = Some("contoso".to_string());
        let provider = AzureAdV2Provider::new(config, provider_context());
        assert_eq!(
            provider.endpoints.discovery,
            "https://login.microsoftonline.com/contoso/v2.0/.well-known/openid-configuration"
        );
    }

    #[tokio::test]
    async fn test_auth_url_from_discovery() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;

        let state = sample_state(Action::Login);
        let url = provider(&server).get_auth_url(&state, "enc").await.unwrap();
        let url = url::Url::parse(&url).unwrap();
        assert_eq!(url.path(), "/authorize");
        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["response_mode"], "form_post");
        assert_eq!(query["nonce"], state.hashed_nonce);
        assert_eq!(query["prompt"], "select_account");
    }

    #[tokio::test]
    async fn test_get_auth_info_uses_oid() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        let key = TestSigningKey::generate("azure-kid");
        let state = sample_state(Action::Login);
        let id_token = key.sign(&json!({
            "iss": "https://login.microsoftonline.com/contoso/v2.0",
            "sub": "pairwise-sub",
            "oid": "object-id",
            "email": "Jane@Contoso.com",
            "aud": "client-azure",
            "nonce": state.hashed_nonce,
            "exp": fixed_now().timestamp() + 600,
        }));
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at",
                "id_token": id_token
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(key.jwks_json()))
            .mount(&server)
            .await;

        let response = AuthorizationResponse {
            code: "code".to_string(),
            ..AuthorizationResponse::default()
        };
        let info = provider(&server).get_auth_info(&response, &state).await.unwrap();
        assert_eq!(info.provider_user_info.id, "object-id");
        assert_eq!(info.provider_user_info.email.as_deref(), Some("jane@contoso.com"));
        assert_eq!(info.provider_keys().get("tenant").map(String::as_str), Some("contoso"));
    }

    #[tokio::test]
    async fn test_discovery_failure_is_network_failed() {
        let server = MockServer::start().await;
        let err = provider(&server)
            .get_auth_url(&sample_state(Action::Login), "enc")
            .await
            .unwrap_err();
        assert_eq!(err.sso_cause(), Some(SsoFailedCause::NetworkFailed));
    }
}
