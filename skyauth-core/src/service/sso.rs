//! SSO flow orchestration
//!
//! Sequences one federated login end to end: build the provider redirect,
//! validate the provider callback, resolve the identity and issue the
//! single-use authorization code the client later redeems with its PKCE
//! verifier.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, SsoConfig};
use crate::identity::{IdentityCollaborators, IdentityResolver, Resolution};
use crate::models::UserId;
use crate::sso::auth_code::{generate_authorization_code, hash_authorization_code};
use crate::sso::login_id::DefaultLoginIdNormalizerFactory;
use crate::sso::user_info::UserInfoDecoder;
use crate::sso::{
    nonce, validate_callback_url, AccessTokenResp, Action, AuthInfo, AuthorizationCodeStore, AuthorizationResponse,
    CallbackResponse, CodeVerifier, LinkState, LoginState, OAuthProvider, OAuthProviderFactory, OAuthProviderSource,
    OnUserDuplicate, SkygearAuthorizationCode, State, StateCodec, UxMode,
};
use crate::{Clock, Error, Result};

/// Client supplied parameters of a new flow
#[derive(Debug, Clone)]
pub struct BeginParams {
    pub ux_mode: UxMode,
    pub callback_url: String,
    pub action: Action,
    /// Required for [`Action::Link`]
    pub user_id: Option<UserId>,
    pub merge_realm: Option<String>,
    pub on_user_duplicate: Option<OnUserDuplicate>,
    pub api_client_id: String,
}

#[derive(Debug, Clone)]
pub struct BeginResult {
    pub auth_url: String,
    /// Raw nonce. The caller binds it to the browser (usually a cookie) and
    /// hands it back to [`SsoService::handle_callback`].
    pub nonce: String,
}

/// Parameters of the external access token flow
#[derive(Debug, Clone)]
pub struct ExternalFlowParams {
    pub action: Action,
    pub user_id: Option<UserId>,
    pub merge_realm: Option<String>,
    pub on_user_duplicate: Option<OnUserDuplicate>,
    pub code_challenge: String,
}

/// Result of a callback whose state could be decoded.
///
/// Failures after state decoding live in `result` so the response can still
/// honour the state's callback URL and UX mode.
#[derive(Debug)]
pub struct CallbackOutcome {
    pub state: State,
    /// The authorization code as a JSON string on success
    pub result: Result<Value>,
}

impl CallbackOutcome {
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.result.as_ref().ok().and_then(Value::as_str)
    }
}

enum Intent {
    Login(LoginState),
    Link(LinkState),
}

#[derive(Clone)]
pub struct SsoService {
    sso: Arc<SsoConfig>,
    providers: Arc<dyn OAuthProviderSource>,
    state_codec: StateCodec,
    codes: AuthorizationCodeStore,
    resolver: IdentityResolver,
}

impl std::fmt::Debug for SsoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsoService")
            .field("sso", &self.sso)
            .field("codes", &self.codes)
            .finish_non_exhaustive()
    }
}

impl SsoService {
    #[must_use]
    pub fn new(
        sso: Arc<SsoConfig>,
        providers: Arc<dyn OAuthProviderSource>,
        state_codec: StateCodec,
        codes: AuthorizationCodeStore,
        resolver: IdentityResolver,
    ) -> Self {
        Self {
            sso,
            providers,
            state_codec,
            codes,
            resolver,
        }
    }

    /// Wire the service from configuration with Redis backed codes
    pub fn from_config(config: &Config, deps: IdentityCollaborators, clock: Arc<dyn Clock>) -> Result<Self> {
        let sso = Arc::new(config.sso.clone());
        let decoder = UserInfoDecoder::new(Arc::new(DefaultLoginIdNormalizerFactory::new(
            config.login_id.email.clone(),
        )));
        let factory = OAuthProviderFactory::new(sso.clone(), decoder, clock.clone())?;
        let state_codec = StateCodec::new(config.app.id.clone(), &sso.state_jwt_secret, clock.clone());

        let codes = if config.redis.url.is_empty() {
            info!("no redis url configured, authorization codes are kept in memory");
            AuthorizationCodeStore::with_memory(clock.clone())
        } else {
            let client = redis::Client::open(config.redis.url.as_str())?;
            AuthorizationCodeStore::with_redis(client, config.redis.key_prefix.clone(), clock.clone())
        };
        let resolver = IdentityResolver::new(deps, clock, config.welcome_email.enabled);

        info!(
            app_id = %config.app.id,
            providers = sso.providers.len(),
            "SSO service initialized"
        );
        Ok(Self::new(sso, Arc::new(factory), state_codec, codes, resolver))
    }

    fn provider(&self, provider_id: &str) -> Result<Box<dyn OAuthProvider>> {
        self.providers
            .new_oauth_provider(provider_id)
            .ok_or_else(|| Error::ProviderNotFound(provider_id.to_string()))
    }

    fn check_on_user_duplicate(&self, policy: Option<OnUserDuplicate>) -> Result<()> {
        match policy {
            Some(policy) if !self.sso.is_allowed_on_user_duplicate(policy) => Err(Error::InvalidInput(format!(
                "on_user_duplicate {policy:?} is not allowed"
            ))),
            _ => Ok(()),
        }
    }

    /// Start a flow: returns the provider URL and the raw nonce to bind.
    pub async fn begin(&self, provider_id: &str, params: BeginParams) -> Result<BeginResult> {
        let provider = self.provider(provider_id)?;
        validate_callback_url(&self.sso.allowed_callback_urls, &params.callback_url)?;
        self.check_on_user_duplicate(params.on_user_duplicate)?;
        if params.action == Action::Link && params.user_id.is_none() {
            return Err(Error::InvalidInput("user_id is required to link".to_string()));
        }

        let raw_nonce = nonce::generate_nonce();
        let state = State {
            ux_mode: params.ux_mode,
            callback_url: params.callback_url,
            action: params.action,
            user_id: params.user_id,
            merge_realm: params.merge_realm,
            on_user_duplicate: params.on_user_duplicate,
            hashed_nonce: nonce::hash_nonce(&raw_nonce),
            api_client_id: params.api_client_id,
        };
        let encoded_state = self.state_codec.encode(&state)?;
        let auth_url = provider.get_auth_url(&state, &encoded_state).await?;

        debug!(provider = %provider_id, action = state.action.as_str(), "sso flow started");
        Ok(BeginResult {
            auth_url,
            nonce: raw_nonce,
        })
    }

    /// Handle the provider redirect.
    ///
    /// Only an undecodable state is returned as `Err`.
    pub async fn handle_callback(
        &self,
        provider_id: &str,
        response: &AuthorizationResponse,
        raw_nonce: &str,
        code_challenge: &str,
    ) -> Result<CallbackOutcome> {
        let state = self.state_codec.decode(&response.state)?;

        let result = self
            .callback_code(provider_id, response, &state, raw_nonce, code_challenge)
            .await;
        if let Err(err) = &result {
            warn!(provider = %provider_id, reason = err.reason(), error = %err, "sso callback failed");
        }

        Ok(CallbackOutcome {
            state,
            result: result.map(Value::String),
        })
    }

    /// Response for the browser or app, per the state's UX mode
    #[must_use]
    pub fn callback_response(&self, outcome: &CallbackOutcome) -> CallbackResponse {
        CallbackResponse::for_state(&self.sso.allowed_callback_urls, &outcome.state, &outcome.result)
    }

    async fn callback_code(
        &self,
        provider_id: &str,
        response: &AuthorizationResponse,
        state: &State,
        raw_nonce: &str,
        code_challenge: &str,
    ) -> Result<String> {
        if let Some(error) = &response.error {
            let description = response.error_description.as_deref().unwrap_or(error);
            return Err(Error::sso_unauthorized(format!("login failed: {description}")));
        }

        let provider = self.provider(provider_id)?;
        state.verify_nonce(raw_nonce)?;

        let intent = match state.action {
            Action::Login => Intent::Login(state.login_state()),
            Action::Link => Intent::Link(state.link_state()?),
        };
        let auth_info = provider.get_auth_info(response, state).await?;
        self.resolve_and_issue(&auth_info, intent, code_challenge).await
    }

    /// Log in with a provider access token the client already holds.
    pub async fn login_with_access_token(
        &self,
        provider_id: &str,
        access_token: &str,
        params: ExternalFlowParams,
    ) -> Result<String> {
        if !self.sso.external_access_token_flow_enabled {
            return Err(Error::InvalidInput("external access token flow is disabled".to_string()));
        }

        let provider = self.provider(provider_id)?;
        let flow = provider.as_external_access_token_flow().ok_or_else(|| {
            Error::InvalidInput(format!("provider {provider_id} does not support access token login"))
        })?;
        self.check_on_user_duplicate(params.on_user_duplicate)?;

        let intent = match params.action {
            Action::Login => Intent::Login(LoginState::new(params.merge_realm, params.on_user_duplicate)),
            Action::Link => Intent::Link(LinkState {
                user_id: params
                    .user_id
                    .ok_or_else(|| Error::InvalidInput("user_id is required to link".to_string()))?,
            }),
        };

        let auth_info = flow
            .external_access_token_get_auth_info(AccessTokenResp::bearer(access_token))
            .await?;
        self.resolve_and_issue(&auth_info, intent, &params.code_challenge).await
    }

    async fn resolve_and_issue(&self, auth_info: &AuthInfo, intent: Intent, code_challenge: &str) -> Result<String> {
        if code_challenge.is_empty() {
            return Err(Error::sso_invalid_params("code_challenge is required"));
        }

        let resolution: Resolution = match intent {
            Intent::Login(state) => self.resolver.login(auth_info, &state).await?,
            Intent::Link(state) => self.resolver.link(auth_info, &state).await?,
        };

        let code = generate_authorization_code();
        let record = resolution.into_authorization_code(hash_authorization_code(&code), code_challenge.to_string());
        self.codes.set(&record).await?;
        Ok(code)
    }

    /// Exchange an authorization code for the decision it carries.
    pub async fn redeem(&self, code: &str, verifier: &CodeVerifier) -> Result<SkygearAuthorizationCode> {
        self.codes.redeem(code, verifier).await
    }
}
