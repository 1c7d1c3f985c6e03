//! Provider registry: resolves a configured provider ID into a concrete
//! protocol implementation.

use std::sync::Arc;
use std::time::Duration;

use super::providers::{
    AppleProvider, AzureAdV2Provider, FacebookProvider, GoogleProvider, InstagramProvider, LinkedInProvider,
};
use super::user_info::UserInfoDecoder;
use super::OAuthProvider;
use crate::config::SsoConfig;
use crate::models::ProviderKind;
use crate::{Clock, Error, Result};

/// Provider HTTP requests time out after this long
const PROVIDER_HTTP_TIMEOUT_SECS: u64 = 10;

/// Collaborators shared by every provider instance
pub struct ProviderContext {
    pub sso: Arc<SsoConfig>,
    pub http: reqwest::Client,
    pub clock: Arc<dyn Clock>,
    pub user_info_decoder: UserInfoDecoder,
}

impl std::fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderContext")
            .field("url_prefix", &self.sso.url_prefix)
            .finish_non_exhaustive()
    }
}

impl ProviderContext {
    #[must_use]
    pub fn redirect_uri(&self, provider_id: &str) -> String {
        self.sso.redirect_uri(provider_id)
    }
}

/// Looks up providers by ID.
///
/// `None` means the ID is not configured and must be answered as "unknown
/// provider", never by panicking.
pub trait OAuthProviderSource: Send + Sync {
    fn new_oauth_provider(&self, provider_id: &str) -> Option<Box<dyn OAuthProvider>>;
}

#[derive(Debug, Clone)]
pub struct OAuthProviderFactory {
    ctx: Arc<ProviderContext>,
}

impl OAuthProviderFactory {
    /// Factory with a default HTTP client
    pub fn new(sso: Arc<SsoConfig>, user_info_decoder: UserInfoDecoder, clock: Arc<dyn Clock>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(PROVIDER_HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(sso, user_info_decoder, clock, http))
    }

    #[must_use]
    pub fn with_http_client(
        sso: Arc<SsoConfig>,
        user_info_decoder: UserInfoDecoder,
        clock: Arc<dyn Clock>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            ctx: Arc::new(ProviderContext {
                sso,
                http,
                clock,
                user_info_decoder,
            }),
        }
    }

    #[must_use]
    pub fn context(&self) -> Arc<ProviderContext> {
        Arc::clone(&self.ctx)
    }
}

impl OAuthProviderSource for OAuthProviderFactory {
    fn new_oauth_provider(&self, provider_id: &str) -> Option<Box<dyn OAuthProvider>> {
        let config = self.ctx.sso.provider(provider_id)?.clone();
        let ctx = Arc::clone(&self.ctx);

        let provider: Box<dyn OAuthProvider> = match config.kind {
            ProviderKind::Google => Box::new(GoogleProvider::new(config, ctx)),
            ProviderKind::Facebook => Box::new(FacebookProvider::new(config, ctx)),
            ProviderKind::Instagram => Box::new(InstagramProvider::new(config, ctx)),
            ProviderKind::Linkedin => Box::new(LinkedInProvider::new(config, ctx)),
            ProviderKind::Azureadv2 => Box::new(AzureAdV2Provider::new(config, ctx)),
            ProviderKind::Apple => Box::new(AppleProvider::new(config, ctx)),
        };
        Some(provider)
    }
}
