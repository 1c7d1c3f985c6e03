//! Domain events and background tasks emitted by identity resolution.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{OAuthPrincipal, PrincipalId, User};

/// Task name for the welcome email sent after SSO signup
pub const WELCOME_EMAIL_SEND_TASK: &str = "WelcomeEmailSendTask";

/// Identity as exposed in event payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: PrincipalId,
    #[serde(rename = "type")]
    pub kind: String,
    pub claims: BTreeMap<String, String>,
}

impl From<&OAuthPrincipal> for Identity {
    fn from(principal: &OAuthPrincipal) -> Self {
        Self {
            id: principal.id.clone(),
            kind: "oauth".to_string(),
            claims: principal.claims.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    #[serde(rename = "user.create")]
    UserCreate { user: User, identities: Vec<Identity> },
    #[serde(rename = "identity.create")]
    IdentityCreate { user: User, identity: Identity },
    #[serde(rename = "user.sync")]
    UserSync { user: User },
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::UserCreate { .. } => "user.create",
            Self::IdentityCreate { .. } => "identity.create",
            Self::UserSync { .. } => "user.sync",
        }
    }
}

/// Fire-and-forget unit of background work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub param: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WelcomeEmailParam {
    pub email: String,
    pub user: User,
}
