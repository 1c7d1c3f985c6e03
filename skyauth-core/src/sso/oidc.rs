//! OpenID Connect discovery, JWKS and ID token validation.

use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::http;
use super::AccessTokenResp;
use crate::{Error, Result};

pub type IdTokenClaims = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcDiscoveryDocument {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
}

/// Client credentials and redirect URI used for the code exchange
#[derive(Debug, Clone, Copy)]
pub struct CodeExchange<'a> {
    pub code: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub redirect_uri: &'a str,
    /// The nonce value sent to the provider, i.e. the hashed nonce
    pub nonce: &'a str,
}

/// GET and decode a discovery document. Any non-200 answer is a failure.
pub async fn fetch_discovery_document(http: &Client, endpoint: &str) -> Result<OidcDiscoveryDocument> {
    let resp = http.get(endpoint).send().await.map_err(|e| {
        warn!(error = %e, endpoint, "fail to fetch discovery document");
        Error::sso_network_failed("fail to fetch discovery document")
    })?;

    if resp.status() != reqwest::StatusCode::OK {
        warn!(status = %resp.status(), endpoint, "unexpected discovery document status");
        return Err(Error::sso_network_failed("unexpected discovery document status"));
    }

    resp.json().await.map_err(|e| {
        warn!(error = %e, endpoint, "malformed discovery document");
        Error::sso_network_failed("malformed discovery document")
    })
}

impl OidcDiscoveryDocument {
    pub async fn fetch_jwks(&self, http: &Client) -> Result<JwkSet> {
        let raw = http::get_json(http, &self.jwks_uri, None).await?;
        serde_json::from_value(raw).map_err(|e| {
            warn!(error = %e, jwks_uri = %self.jwks_uri, "malformed JWKS");
            Error::sso_network_failed("malformed JWKS")
        })
    }

    /// Exchange the code, then validate and return the ID token claims.
    pub async fn exchange_code(
        &self,
        http: &Client,
        exchange: CodeExchange<'_>,
        now: DateTime<Utc>,
    ) -> Result<(IdTokenClaims, AccessTokenResp)> {
        let token = http::exchange_code(
            http,
            &self.token_endpoint,
            exchange.code,
            exchange.client_id,
            exchange.client_secret,
            exchange.redirect_uri,
        )
        .await?;

        let id_token = token
            .id_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::sso_invalid_params("missing id_token"))?;

        let jwks = self.fetch_jwks(http).await?;
        let claims = verify_id_token(id_token, &jwks, exchange.client_id, exchange.nonce, now)?;
        Ok((claims, token))
    }
}

/// Verify signature, audience, expiry and nonce of an ID token.
///
/// The signing key must be the single JWKS entry whose `kid` matches the
/// token header.
pub fn verify_id_token(
    id_token: &str,
    jwks: &JwkSet,
    client_id: &str,
    expected_nonce: &str,
    now: DateTime<Utc>,
) -> Result<IdTokenClaims> {
    let header = decode_header(id_token).map_err(|e| {
        debug!(error = %e, "malformed id token header");
        Error::sso_unauthorized("invalid id token")
    })?;

    if matches!(header.alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
        return Err(Error::sso_unauthorized("invalid id token"));
    }

    let kid = header
        .kid
        .as_deref()
        .ok_or_else(|| Error::sso_unauthorized("failed to find signing key"))?;
    let mut candidates = jwks
        .keys
        .iter()
        .filter(|jwk| jwk.common.key_id.as_deref() == Some(kid));
    let jwk = match (candidates.next(), candidates.next()) {
        (Some(jwk), None) => jwk,
        _ => return Err(Error::sso_unauthorized("failed to find signing key")),
    };

    let key = DecodingKey::from_jwk(jwk).map_err(|e| {
        debug!(error = %e, kid, "unusable signing key");
        Error::sso_unauthorized("failed to find signing key")
    })?;

    let mut validation = Validation::new(header.alg);
    validation.set_audience(&[client_id]);
    validation.set_required_spec_claims(&["exp", "aud"]);
    validation.validate_exp = false;
    validation.validate_nbf = false;

    let claims = decode::<IdTokenClaims>(id_token, &key, &validation)
        .map_err(|e| {
            debug!(error = %e, kid, "id token rejected");
            Error::sso_unauthorized("invalid id token")
        })?
        .claims;

    let exp = claims.get("exp").and_then(Value::as_i64).unwrap_or(0);
    if exp < now.timestamp() {
        return Err(Error::sso_unauthorized("id token expired"));
    }

    let nonce = claims.get("nonce").and_then(Value::as_str).unwrap_or("");
    if !bool::from(nonce.as_bytes().ct_eq(expected_nonce.as_bytes())) {
        return Err(Error::sso_unauthorized("invalid nonce"));
    }

    Ok(claims)
}
