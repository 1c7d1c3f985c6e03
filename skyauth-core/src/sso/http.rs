//! Provider HTTP plumbing: authorization URLs, token exchange, profile fetch.
//!
//! Authorization URLs and the code exchange go through the `oauth2` client;
//! its requests are sent with the shared reqwest client.
//!
//! No request is retried. Connectivity failures map to `NetworkFailed`,
//! rejected codes and tokens to `Unauthorized` or `InvalidParams`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use oauth2::basic::{
    BasicErrorResponse, BasicErrorResponseType, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::{
    AccessToken, AsyncHttpClient, AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, HttpRequest, HttpResponse, RedirectUrl, RefreshToken, RequestTokenError, Scope,
    StandardRevocableToken, TokenResponse, TokenUrl,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::AccessTokenResp;
use crate::{Error, Result};

/// Query parameters of a provider authorization URL
#[derive(Debug, Default)]
pub struct AuthUrlParams<'a> {
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub scope: &'a str,
    pub state: &'a str,
    pub nonce: Option<&'a str>,
    pub response_mode: Option<&'a str>,
    pub display: Option<&'a str>,
    pub access_type: Option<&'a str>,
    pub prompt: Option<&'a str>,
}

/// Token endpoint response.
///
/// `token_type` defaults to bearer since LinkedIn and Facebook omit it, and
/// `id_token` is kept for OpenID Connect providers.
#[derive(Clone, Serialize, Deserialize)]
struct ProviderTokenResponse {
    access_token: AccessToken,
    #[serde(default = "bearer")]
    token_type: BasicTokenType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<RefreshToken>,
    #[serde(
        rename = "scope",
        default,
        deserialize_with = "oauth2::helpers::deserialize_space_delimited_vec",
        serialize_with = "oauth2::helpers::serialize_space_delimited_vec",
        skip_serializing_if = "Option::is_none"
    )]
    scopes: Option<Vec<Scope>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_token: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

fn bearer() -> BasicTokenType {
    BasicTokenType::Bearer
}

impl std::fmt::Debug for ProviderTokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderTokenResponse")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("has_id_token", &self.id_token.is_some())
            .finish_non_exhaustive()
    }
}

impl TokenResponse for ProviderTokenResponse {
    type TokenType = BasicTokenType;

    fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    fn token_type(&self) -> &BasicTokenType {
        &self.token_type
    }

    fn expires_in(&self) -> Option<Duration> {
        self.expires_in.map(Duration::from_secs)
    }

    fn refresh_token(&self) -> Option<&RefreshToken> {
        self.refresh_token.as_ref()
    }

    fn scopes(&self) -> Option<&Vec<Scope>> {
        self.scopes.as_ref()
    }
}

type ProviderClient<HasAuthUrl, HasTokenUrl> = oauth2::Client<
    BasicErrorResponse,
    ProviderTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    HasAuthUrl,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    HasTokenUrl,
>;

#[derive(Debug, thiserror::Error)]
enum OAuthHttpError {
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error(transparent)]
    Response(#[from] http::Error),
}

/// Runs `oauth2` requests on our reqwest client so timeouts and TLS settings
/// are shared with the profile calls.
struct OAuthHttp<'a>(&'a Client);

impl<'c> AsyncHttpClient<'c> for OAuthHttp<'_> {
    type Error = OAuthHttpError;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<HttpResponse, Self::Error>> + Send + Sync + 'c>>;

    fn call(&'c self, request: HttpRequest) -> Self::Future {
        Box::pin(async move {
            let response = self.0.execute(reqwest::Request::try_from(request)?).await?;

            let mut builder = http::Response::builder()
                .status(response.status())
                .version(response.version());
            for (name, value) in response.headers() {
                builder = builder.header(name, value);
            }
            let body = response.bytes().await?;
            Ok::<_, OAuthHttpError>(builder.body(body.to_vec())?)
        })
    }
}

fn redirect_url(redirect_uri: &str) -> Result<RedirectUrl> {
    RedirectUrl::new(redirect_uri.to_string())
        .map_err(|e| Error::Internal(format!("Invalid redirect URI {redirect_uri}: {e}")))
}

pub fn make_auth_url(base: &str, params: &AuthUrlParams<'_>) -> Result<String> {
    let auth_url = AuthUrl::new(base.to_string())
        .map_err(|e| Error::Internal(format!("Invalid authorization endpoint {base}: {e}")))?;
    let client: ProviderClient<EndpointSet, EndpointNotSet> = oauth2::Client::new(ClientId::new(params.client_id.to_string()))
        .set_auth_uri(auth_url)
        .set_redirect_uri(redirect_url(params.redirect_uri)?);

    let state = params.state.to_string();
    let mut request = client
        .authorize_url(move || CsrfToken::new(state))
        .add_scopes(params.scope.split_whitespace().map(|s| Scope::new(s.to_string())));

    let optional = [
        ("nonce", params.nonce),
        ("response_mode", params.response_mode),
        ("display", params.display),
        ("access_type", params.access_type),
        ("prompt", params.prompt),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            request = request.add_extra_param(key, value);
        }
    }

    let (url, _) = request.url();
    Ok(url.to_string())
}

fn network_error(context: &str, e: &dyn std::error::Error) -> Error {
    warn!(error = %e, "{context}");
    Error::sso_network_failed(context.to_string())
}

/// Map a failed code exchange onto the SSO error taxonomy.
fn token_error(err: RequestTokenError<OAuthHttpError, BasicErrorResponse>) -> Error {
    match err {
        RequestTokenError::ServerResponse(resp) => {
            warn!(
                error = %resp.error(),
                description = resp.error_description().map_or("", String::as_str),
                "token endpoint rejected code"
            );
            match resp.error() {
                BasicErrorResponseType::InvalidGrant => Error::sso_invalid_params("code was already redeemed"),
                _ => Error::sso_unauthorized("fail to exchange authorization code"),
            }
        }
        RequestTokenError::Request(e) => network_error("fail to reach token endpoint", &e),
        RequestTokenError::Parse(e, _) => {
            warn!(error = %e, "token endpoint returned unexpected body");
            Error::sso_unauthorized("fail to exchange authorization code")
        }
        RequestTokenError::Other(message) => {
            warn!(error = %message, "token exchange failed");
            Error::sso_unauthorized("fail to exchange authorization code")
        }
    }
}

/// Redeem `code` at the token endpoint with the client credentials in the
/// request body.
pub async fn exchange_code(
    http: &Client,
    token_url: &str,
    code: &str,
    client_id: &str,
    client_secret: &str,
    redirect_uri: &str,
) -> Result<AccessTokenResp> {
    let token_uri = TokenUrl::new(token_url.to_string())
        .map_err(|e| Error::Internal(format!("Invalid token endpoint {token_url}: {e}")))?;
    let client: ProviderClient<EndpointNotSet, EndpointSet> = oauth2::Client::new(ClientId::new(client_id.to_string()))
        .set_client_secret(ClientSecret::new(client_secret.to_string()))
        .set_token_uri(token_uri)
        .set_redirect_uri(redirect_url(redirect_uri)?)
        .set_auth_type(AuthType::RequestBody);

    let token = client
        .exchange_code(AuthorizationCode::new(code.to_string()))
        .request_async(&OAuthHttp(http))
        .await
        .map_err(token_error)?;

    serde_json::to_value(&token)
        .and_then(serde_json::from_value::<AccessTokenResp>)
        .map_err(|_| Error::sso_invalid_params("unexpected token response"))
}

/// GET a JSON document, optionally with a bearer token.
pub async fn get_json(http: &Client, url: &str, access_token: Option<&str>) -> Result<Value> {
    let mut request = http
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json");
    if let Some(token) = access_token {
        request = request.bearer_auth(token);
    }

    let resp = request
        .send()
        .await
        .map_err(|e| network_error("fail to reach provider", &e))?;

    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        warn!(status = %status, url, "provider rejected access token");
        return Err(Error::sso_unauthorized("invalid access token"));
    }
    if !status.is_success() {
        warn!(status = %status, url, "provider request failed");
        return Err(Error::sso_network_failed(format!("unexpected status {status}")));
    }

    resp.json::<Value>()
        .await
        .map_err(|_| Error::sso_invalid_params("unexpected provider response"))
}
