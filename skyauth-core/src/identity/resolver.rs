//! Identity resolution state machine.
//!
//! Login path:
//!
//! 1. A principal for `(provider, keys, provider user id)` exists: refresh it
//!    and log its user in. Duplicate handling never runs in this branch.
//! 2. Otherwise collect users that already own the provider email. Password
//!    principals outside the merge realm are ignored.
//! 3. No candidate: sign up a new user.
//! 4. Candidates: `abort` fails, `create` signs up anyway, `merge` attaches
//!    the principal to the single candidate and fails if there are several.
//!
//! Link path attaches the principal to the given user unless the provider
//! identity is already linked to anyone.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    EventDispatcher, GetByProviderOptions, IdentityProvider, OAuthPrincipalStore, TaskQueue, TxContext, UserProfileStore,
    UserStore,
};
use crate::models::{
    Event, Identity, OAuthPrincipal, PrincipalId, Principal, TaskSpec, User, UserId, UserProfile, WelcomeEmailParam,
    WELCOME_EMAIL_SEND_TASK,
};
use crate::sso::auth_code::{SessionCreateReason, SkygearAuthorizationCode};
use crate::sso::state::{Action, LinkState, LoginState, OnUserDuplicate};
use crate::sso::AuthInfo;
use crate::{Clock, Error, Result};

/// Terminal state of a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// New user created
    Signup,
    /// Existing principal refreshed
    Login,
    /// New principal attached to an existing user by email
    Merged,
    /// New principal attached to the caller's user
    Linked,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub user: User,
    pub principal: OAuthPrincipal,
    pub outcome: ResolutionOutcome,
}

impl Resolution {
    /// `None` for link, which does not create a session
    #[must_use]
    pub const fn session_create_reason(&self) -> Option<SessionCreateReason> {
        match self.outcome {
            ResolutionOutcome::Signup => Some(SessionCreateReason::Signup),
            ResolutionOutcome::Login | ResolutionOutcome::Merged => Some(SessionCreateReason::Login),
            ResolutionOutcome::Linked => None,
        }
    }

    #[must_use]
    pub fn into_authorization_code(self, code_hash: String, code_challenge: String) -> SkygearAuthorizationCode {
        let session_create_reason = self.session_create_reason();
        let action = if self.outcome == ResolutionOutcome::Linked {
            Action::Link
        } else {
            Action::Login
        };
        SkygearAuthorizationCode {
            code_hash,
            action,
            code_challenge,
            user_id: self.user.id,
            principal_id: self.principal.id,
            session_create_reason,
        }
    }
}

/// Everything the resolver talks to
#[derive(Clone)]
pub struct IdentityCollaborators {
    pub identities: Arc<dyn IdentityProvider>,
    pub principals: Arc<dyn OAuthPrincipalStore>,
    pub users: Arc<dyn UserStore>,
    pub profiles: Arc<dyn UserProfileStore>,
    pub events: Arc<dyn EventDispatcher>,
    pub tasks: Arc<dyn TaskQueue>,
    pub tx: Arc<dyn TxContext>,
}

#[derive(Clone)]
pub struct IdentityResolver {
    deps: IdentityCollaborators,
    clock: Arc<dyn Clock>,
    welcome_email_enabled: bool,
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("welcome_email_enabled", &self.welcome_email_enabled)
            .finish_non_exhaustive()
    }
}

impl IdentityResolver {
    #[must_use]
    pub fn new(deps: IdentityCollaborators, clock: Arc<dyn Clock>, welcome_email_enabled: bool) -> Self {
        Self {
            deps,
            clock,
            welcome_email_enabled,
        }
    }

    /// Resolve a login. All writes share one transaction.
    pub async fn login(&self, auth_info: &AuthInfo, state: &LoginState) -> Result<Resolution> {
        let resolution = self.in_tx(self.login_in_tx(auth_info, state)).await?;

        info!(
            user_id = %resolution.user.id,
            provider = %auth_info.provider_config.id,
            outcome = ?resolution.outcome,
            "sso login resolved"
        );

        if resolution.outcome == ResolutionOutcome::Signup && self.welcome_email_enabled {
            if let Some(email) = &auth_info.provider_user_info.email {
                self.enqueue_welcome_email(email, &resolution.user)?;
            }
        }

        Ok(resolution)
    }

    /// Attach the provider identity to `state.user_id`.
    pub async fn link(&self, auth_info: &AuthInfo, state: &LinkState) -> Result<Resolution> {
        let resolution = self.in_tx(self.link_in_tx(auth_info, state)).await?;
        info!(
            user_id = %resolution.user.id,
            provider = %auth_info.provider_config.id,
            "sso identity linked"
        );
        Ok(resolution)
    }

    async fn in_tx<F>(&self, work: F) -> Result<Resolution>
    where
        F: std::future::Future<Output = Result<Resolution>>,
    {
        self.deps.tx.begin_tx().await?;
        match work.await {
            Ok(resolution) => {
                self.deps.tx.commit_tx().await?;
                Ok(resolution)
            }
            Err(err) => {
                if let Err(rollback_err) = self.deps.tx.rollback_tx().await {
                    warn!(error = %rollback_err, "failed to roll back identity resolution");
                }
                Err(err)
            }
        }
    }

    fn lookup_options(auth_info: &AuthInfo) -> GetByProviderOptions {
        GetByProviderOptions {
            provider_type: auth_info.provider_config.kind,
            provider_keys: auth_info.provider_keys(),
            provider_user_id: auth_info.provider_user_info.id.clone(),
        }
    }

    async fn find_principal(&self, auth_info: &AuthInfo) -> Result<Option<OAuthPrincipal>> {
        match self
            .deps
            .principals
            .get_principal_by_provider(&Self::lookup_options(auth_info))
            .await
        {
            Ok(principal) => Ok(Some(principal)),
            Err(Error::IdentityNotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn login_in_tx(&self, auth_info: &AuthInfo, state: &LoginState) -> Result<Resolution> {
        if let Some(principal) = self.find_principal(auth_info).await? {
            return self.refresh_principal(principal, auth_info).await;
        }

        let candidates = self.users_with_email(auth_info, &state.merge_realm).await?;
        debug!(
            candidates = candidates.len(),
            on_user_duplicate = ?state.on_user_duplicate,
            "no principal for provider identity"
        );

        match (candidates.as_slice(), state.on_user_duplicate) {
            ([], _) | (_, OnUserDuplicate::Create) => self.sign_up(auth_info).await,
            (_, OnUserDuplicate::Abort) => Err(Error::LoginIdAlreadyUsed),
            ([user_id], OnUserDuplicate::Merge) => self.merge_into(user_id, auth_info).await,
            (_, OnUserDuplicate::Merge) => Err(Error::LoginIdAlreadyUsed),
        }
    }

    async fn link_in_tx(&self, auth_info: &AuthInfo, state: &LinkState) -> Result<Resolution> {
        if self.find_principal(auth_info).await?.is_some() {
            return Err(Error::AlreadyLinked);
        }

        let user = self.deps.users.get_user(&state.user_id).await?;
        let principal = self.new_principal(user.id.clone(), auth_info)?;
        self.deps.principals.create_principal(&principal).await?;

        self.deps
            .events
            .dispatch_event(
                Event::IdentityCreate {
                    user: user.clone(),
                    identity: Identity::from(&principal),
                },
                &user,
            )
            .await?;

        Ok(Resolution {
            user,
            principal,
            outcome: ResolutionOutcome::Linked,
        })
    }

    /// Distinct owners of the provider email, in first-seen order
    async fn users_with_email(&self, auth_info: &AuthInfo, merge_realm: &str) -> Result<Vec<UserId>> {
        let Some(email) = auth_info.provider_user_info.email.as_deref() else {
            return Ok(Vec::new());
        };

        let principals = self.deps.identities.list_principals_by_claim("email", email).await?;

        let mut user_ids: Vec<UserId> = Vec::new();
        for principal in &principals {
            if let Principal::Password(password) = principal {
                if password.realm != merge_realm {
                    continue;
                }
            }
            let user_id = principal.user_id();
            if !user_ids.contains(user_id) {
                user_ids.push(user_id.clone());
            }
        }
        Ok(user_ids)
    }

    async fn refresh_principal(&self, mut principal: OAuthPrincipal, auth_info: &AuthInfo) -> Result<Resolution> {
        principal.access_token_resp = serde_json::to_value(&auth_info.provider_access_token_resp)?;
        principal.user_profile = auth_info.provider_raw_profile.clone();
        principal.claims = Self::claims(auth_info);
        principal.updated_at = self.clock.now_utc();
        self.deps.principals.update_principal(&principal).await?;

        let user = self.deps.users.get_user(&principal.user_id).await?;
        self.deps.profiles.get_user_profile(&user.id).await?;

        self.deps
            .events
            .dispatch_event(Event::UserSync { user: user.clone() }, &user)
            .await?;

        Ok(Resolution {
            user,
            principal,
            outcome: ResolutionOutcome::Login,
        })
    }

    async fn sign_up(&self, auth_info: &AuthInfo) -> Result<Resolution> {
        let now = self.clock.now_utc();
        let user = User::new(now);
        self.deps.users.create_user(&user).await?;
        self.deps
            .profiles
            .create_user_profile(&UserProfile::empty(user.id.clone(), now))
            .await?;

        let principal = self.new_principal(user.id.clone(), auth_info)?;
        self.deps.principals.create_principal(&principal).await?;

        self.deps
            .events
            .dispatch_event(
                Event::UserCreate {
                    user: user.clone(),
                    identities: vec![Identity::from(&principal)],
                },
                &user,
            )
            .await?;

        Ok(Resolution {
            user,
            principal,
            outcome: ResolutionOutcome::Signup,
        })
    }

    async fn merge_into(&self, user_id: &UserId, auth_info: &AuthInfo) -> Result<Resolution> {
        let user = self.deps.users.get_user(user_id).await?;
        self.deps.profiles.get_user_profile(&user.id).await?;

        let principal = self.new_principal(user.id.clone(), auth_info)?;
        self.deps.principals.create_principal(&principal).await?;

        self.deps
            .events
            .dispatch_event(
                Event::IdentityCreate {
                    user: user.clone(),
                    identity: Identity::from(&principal),
                },
                &user,
            )
            .await?;

        Ok(Resolution {
            user,
            principal,
            outcome: ResolutionOutcome::Merged,
        })
    }

    fn claims(auth_info: &AuthInfo) -> std::collections::BTreeMap<String, String> {
        auth_info
            .provider_user_info
            .email
            .iter()
            .map(|email| ("email".to_string(), email.clone()))
            .collect()
    }

    fn new_principal(&self, user_id: UserId, auth_info: &AuthInfo) -> Result<OAuthPrincipal> {
        let now = self.clock.now_utc();
        Ok(OAuthPrincipal {
            id: PrincipalId::new(),
            user_id,
            provider_type: auth_info.provider_config.kind,
            provider_keys: auth_info.provider_keys(),
            provider_user_id: auth_info.provider_user_info.id.clone(),
            access_token_resp: serde_json::to_value(&auth_info.provider_access_token_resp)?,
            user_profile: auth_info.provider_raw_profile.clone(),
            claims: Self::claims(auth_info),
            created_at: now,
            updated_at: now,
        })
    }

    fn enqueue_welcome_email(&self, email: &str, user: &User) -> Result<()> {
        let param = serde_json::to_value(WelcomeEmailParam {
            email: email.to_string(),
            user: user.clone(),
        })?;
        self.deps.tasks.enqueue(TaskSpec {
            name: WELCOME_EMAIL_SEND_TASK.to_string(),
            param,
        });
        debug!(user_id = %user.id, "welcome email enqueued");
        Ok(())
    }
}
