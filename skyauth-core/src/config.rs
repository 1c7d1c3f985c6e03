use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::models::{ProviderConfig, ProviderKind};
use crate::sso::state::OnUserDuplicate;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub redis: RedisConfig,
    pub logging: LoggingConfig,
    pub sso: SsoConfig,
    pub welcome_email: WelcomeEmailConfig,
    pub login_id: LoginIdConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// App ID; used as the audience of state tokens
    pub id: String,
    pub name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            id: "skyauth".to_string(),
            name: "Skyauth".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Empty URL selects the in-memory authorization code store
    pub url: String,
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            key_prefix: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "json" or "pretty"
    pub format: String,
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Tenant SSO configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SsoConfig {
    /// Public base URL; redirect URIs are derived from it
    pub url_prefix: String,
    pub state_jwt_secret: String,
    pub allowed_callback_urls: Vec<String>,
    pub external_access_token_flow_enabled: bool,
    pub on_user_duplicate_allow_merge: bool,
    pub on_user_duplicate_allow_create: bool,
    pub providers: Vec<ProviderConfig>,
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            url_prefix: "http://localhost:3000".to_string(),
            state_jwt_secret: String::new(),
            allowed_callback_urls: Vec::new(),
            external_access_token_flow_enabled: false,
            on_user_duplicate_allow_merge: false,
            on_user_duplicate_allow_create: false,
            providers: Vec::new(),
        }
    }
}

impl std::fmt::Debug for SsoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsoConfig")
            .field("url_prefix", &self.url_prefix)
            .field("state_jwt_secret", &"[REDACTED]")
            .field("allowed_callback_urls", &self.allowed_callback_urls)
            .field(
                "external_access_token_flow_enabled",
                &self.external_access_token_flow_enabled,
            )
            .field("on_user_duplicate_allow_merge", &self.on_user_duplicate_allow_merge)
            .field("on_user_duplicate_allow_create", &self.on_user_duplicate_allow_create)
            .field("providers", &self.providers)
            .finish()
    }
}

impl SsoConfig {
    #[must_use]
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Redirect URI registered with the provider for `provider_id`
    #[must_use]
    pub fn redirect_uri(&self, provider_id: &str) -> String {
        format!(
            "{}/sso/{provider_id}/auth_handler",
            self.url_prefix.trim_end_matches('/')
        )
    }

    /// `abort` is always allowed; the other policies must be enabled.
    #[must_use]
    pub const fn is_allowed_on_user_duplicate(&self, policy: OnUserDuplicate) -> bool {
        match policy {
            OnUserDuplicate::Abort => true,
            OnUserDuplicate::Merge => self.on_user_duplicate_allow_merge,
            OnUserDuplicate::Create => self.on_user_duplicate_allow_create,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WelcomeEmailConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginIdConfig {
    pub email: EmailNormalizationConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailNormalizationConfig {
    pub case_sensitive: bool,
    pub block_plus_sign: bool,
    pub ignore_dot_sign: bool,
}

impl Config {
    /// Load configuration from file and environment variables
    ///
    /// Priority (highest first):
    /// 1. Environment variables (`SKYAUTH_SSO__STATE_JWT_SECRET`, ...)
    /// 2. Config file
    /// 3. Defaults
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("SKYAUTH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate().map_err(ConfigError::Message)?;
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Reject configurations that would otherwise fail at request time.
    pub fn validate(&self) -> Result<(), String> {
        if self.app.id.is_empty() {
            return Err("app.id must not be empty".to_string());
        }

        if !self.sso.providers.is_empty() && self.sso.state_jwt_secret.is_empty() {
            return Err("sso.state_jwt_secret must be set when providers are configured".to_string());
        }

        let mut seen = HashSet::new();
        for provider in &self.sso.providers {
            if provider.id.is_empty() {
                return Err("sso provider id must not be empty".to_string());
            }
            if !seen.insert(provider.id.as_str()) {
                return Err(format!("duplicated sso provider id: {}", provider.id));
            }
            if provider.client_id.is_empty() {
                return Err(format!("sso provider {} is missing client_id", provider.id));
            }
            match provider.kind {
                ProviderKind::Azureadv2 if provider.tenant.as_deref().unwrap_or("").is_empty() => {
                    return Err(format!("sso provider {} requires tenant", provider.id));
                }
                ProviderKind::Apple
                    if provider.key_id.as_deref().unwrap_or("").is_empty()
                        || provider.team_id.as_deref().unwrap_or("").is_empty() =>
                {
                    return Err(format!(
                        "sso provider {} requires key_id and team_id",
                        provider.id
                    ));
                }
                _ => {}
            }
        }

        Ok(())
    }
}
