//! Sign in with Apple
//!
//! Apple has no discovery document and no static client secret: the secret
//! is an ES256 JWT minted per token request from the configured private key.

use async_trait::async_trait;
use chrono::Duration;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use super::scope_or;
use crate::models::{ProviderConfig, ProviderKind};
use crate::sso::http::{make_auth_url, AuthUrlParams};
use crate::sso::oidc::{CodeExchange, IdTokenClaims, OidcDiscoveryDocument};
use crate::sso::{
    AccessTokenResp, AuthInfo, AuthorizationResponse, OAuthProvider, OpenIdConnectProvider, ProviderContext, State,
};
use crate::{Error, Result};

/// Expected issuer of Apple ID tokens; also the client secret audience
pub const APPLE_ISSUER: &str = "https://appleid.apple.com";

const DEFAULT_SCOPE: &str = "name email";
const CLIENT_SECRET_TTL_MINUTES: i64 = 5;

fn default_endpoints() -> OidcDiscoveryDocument {
    OidcDiscoveryDocument {
        authorization_endpoint: "https://appleid.apple.com/auth/authorize".to_string(),
        token_endpoint: "https://appleid.apple.com/auth/token".to_string(),
        jwks_uri: "https://appleid.apple.com/auth/keys".to_string(),
        issuer: Some(APPLE_ISSUER.to_string()),
        userinfo_endpoint: None,
    }
}

#[derive(Debug, Serialize)]
struct ClientSecretClaims<'a> {
    iss: &'a str,
    iat: i64,
    exp: i64,
    aud: &'a str,
    sub: &'a str,
}

pub struct AppleProvider {
    config: ProviderConfig,
    ctx: Arc<ProviderContext>,
    endpoints: OidcDiscoveryDocument,
}

impl AppleProvider {
    #[must_use]
    pub fn new(config: ProviderConfig, ctx: Arc<ProviderContext>) -> Self {
        Self {
            config,
            ctx,
            endpoints: default_endpoints(),
        }
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: OidcDiscoveryDocument) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Fresh 5-minute client secret signed with the team's private key
    fn client_secret(&self) -> Result<String> {
        let key_id = self.config.key_id.as_deref().unwrap_or_default();
        let team_id = self.config.team_id.as_deref().unwrap_or_default();

        let key = EncodingKey::from_ec_pem(self.config.client_secret.as_bytes())
            .map_err(|e| Error::Internal(format!("Invalid Apple private key: {e}")))?;

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(key_id.to_string());

        let now = self.ctx.clock.now_utc();
        let claims = ClientSecretClaims {
            iss: team_id,
            iat: now.timestamp(),
            exp: (now + Duration::minutes(CLIENT_SECRET_TTL_MINUTES)).timestamp(),
            aud: APPLE_ISSUER,
            sub: &self.config.client_id,
        };

        encode(&header, &claims, &key).map_err(|e| Error::Internal(format!("Failed to sign Apple client secret: {e}")))
    }
}

#[async_trait]
impl OAuthProvider for AppleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Apple
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn get_auth_url(&self, state: &State, encoded_state: &str) -> Result<String> {
        let redirect_uri = self.ctx.redirect_uri(&self.config.id);
        make_auth_url(
            &self.endpoints.authorization_endpoint,
            &AuthUrlParams {
                client_id: &self.config.client_id,
                redirect_uri: &redirect_uri,
                scope: scope_or(&self.config.scope, DEFAULT_SCOPE),
                state: encoded_state,
                nonce: Some(&state.hashed_nonce),
                response_mode: Some("form_post"),
                ..AuthUrlParams::default()
            },
        )
    }

    async fn get_auth_info(&self, response: &AuthorizationResponse, state: &State) -> Result<AuthInfo> {
        let (claims, token) = self.exchange_code_for_claims(response, state).await?;

        // Apple documents the issuer loosely, so only require it to be contained.
        let iss = claims.get("iss").and_then(Value::as_str).unwrap_or("");
        if !iss.contains(APPLE_ISSUER) {
            warn!(iss, "unexpected Apple id token issuer");
            return Err(Error::sso_unauthorized("invalid issuer"));
        }
        if claims.get("sub").and_then(Value::as_str).map_or(true, str::is_empty) {
            return Err(Error::sso_unauthorized("missing sub"));
        }

        let raw = Value::Object(claims);
        let user_info = self.ctx.user_info_decoder.decode(ProviderKind::Apple, &raw)?;
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
impl OpenIdConnectProvider for AppleProvider {
    async fn exchange_code_for_claims(
        &self,
        response: &AuthorizationResponse,
        state: &State,
    ) -> Result<(IdTokenClaims, AccessTokenResp)> {
        if response.code.is_empty() {
            return Err(Error::sso_invalid_params("missing authorization code"));
        }

        let client_secret = self.client_secret()?;
        let redirect_uri = self.ctx.redirect_uri(&self.config.id);
        self.endpoints
            .exchange_code(
                &self.ctx.http,
                CodeExchange {
                    code: &response.code,
                    client_id: &self.config.client_id,
                    client_secret: &client_secret,
                    redirect_uri: &redirect_uri,
                    nonce: &state.hashed_nonce,
                },
                self.ctx.clock.now_utc(),
            )
            .await
    }
}
