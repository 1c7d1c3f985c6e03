//! Signed SSO state carried through the provider redirect.
//!
//! The state is never stored server side. Its integrity comes from the HMAC
//! signature and its lifetime from the `exp` claim, which is checked against
//! the injected clock rather than the system clock.

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::nonce;
use crate::models::UserId;
use crate::{Clock, Error, Result};

/// State token lifetime
pub const STATE_TTL_MINUTES: i64 = 5;

/// Default realm used for email based account matching
pub const DEFAULT_MERGE_REALM: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UxMode {
    WebRedirect,
    WebPopup,
    Ios,
    Android,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Login,
    Link,
}

impl Action {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Link => "link",
        }
    }
}

/// What to do when the provider email already belongs to a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnUserDuplicate {
    #[default]
    Abort,
    Merge,
    Create,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub ux_mode: UxMode,
    pub callback_url: String,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_realm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_user_duplicate: Option<OnUserDuplicate>,
    pub hashed_nonce: String,
    pub api_client_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginState {
    pub merge_realm: String,
    pub on_user_duplicate: OnUserDuplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkState {
    pub user_id: UserId,
}

impl LoginState {
    /// Missing or empty realm means [`DEFAULT_MERGE_REALM`]; missing policy means abort.
    #[must_use]
    pub fn new(merge_realm: Option<String>, on_user_duplicate: Option<OnUserDuplicate>) -> Self {
        Self {
            merge_realm: merge_realm
                .filter(|realm| !realm.is_empty())
                .unwrap_or_else(|| DEFAULT_MERGE_REALM.to_string()),
            on_user_duplicate: on_user_duplicate.unwrap_or_default(),
        }
    }
}

impl State {
    #[must_use]
    pub fn login_state(&self) -> LoginState {
        LoginState::new(self.merge_realm.clone(), self.on_user_duplicate)
    }

    pub fn link_state(&self) -> Result<LinkState> {
        self.user_id
            .clone()
            .map(|user_id| LinkState { user_id })
            .ok_or_else(|| Error::sso_invalid_params("link state is missing user id"))
    }

    /// Check the raw nonce echoed by the client against the signed hash.
    pub fn verify_nonce(&self, raw_nonce: &str) -> Result<()> {
        if nonce::verify_nonce(raw_nonce, &self.hashed_nonce) {
            Ok(())
        } else {
            Err(Error::sso_unauthorized("nonce mismatch"))
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
    #[serde(flatten)]
    state: State,
    aud: String,
    exp: i64,
}

/// Encodes and decodes [`State`] as an HMAC signed JWT
#[derive(Clone)]
pub struct StateCodec {
    app_id: String,
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    algorithm: Algorithm,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for StateCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCodec")
            .field("app_id", &self.app_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl StateCodec {
    /// HS256 codec for `app_id` signed with `secret`
    pub fn new(app_id: impl Into<String>, secret: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            app_id: app_id.into(),
            encoding_key: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding_key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            algorithm: Algorithm::HS256,
            clock,
        }
    }

    /// Use another member of the HMAC family.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Result<Self> {
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                self.algorithm = algorithm;
                Ok(self)
            }
            other => Err(Error::InvalidInput(format!(
                "state algorithm must be HMAC, got {other:?}"
            ))),
        }
    }

    pub fn encode(&self, state: &State) -> Result<String> {
        let claims = StateClaims {
            state: state.clone(),
            aud: self.app_id.clone(),
            exp: (self.clock.now_utc() + Duration::minutes(STATE_TTL_MINUTES)).timestamp(),
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| Error::Internal(format!("Failed to sign sso state: {e}")))
    }

    /// Every rejection collapses to [`Error::invalid_state`].
    pub fn decode(&self, token: &str) -> Result<State> {
        let mut validation = Validation::new(self.algorithm);
        validation.algorithms = vec![self.algorithm];
        validation.set_audience(&[self.app_id.as_str()]);
        validation.set_required_spec_claims(&["exp", "aud"]);
        validation.validate_exp = false;
        validation.validate_nbf = false;

        let data = decode::<StateClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            debug!(error = %e, "sso state rejected");
            Error::invalid_state()
        })?;

        if data.claims.exp < self.clock.now_utc().timestamp() {
            debug!(exp = data.claims.exp, "sso state expired");
            return Err(Error::invalid_state());
        }

        Ok(data.claims.state)
    }
}
