//! Login ID normalization.

use serde::{Deserialize, Serialize};

use crate::config::EmailNormalizationConfig;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginIdType {
    Email,
    Username,
    Phone,
    Raw,
}

pub trait LoginIdNormalizer: Send + Sync {
    fn normalize(&self, login_id: &str) -> Result<String>;
}

pub trait LoginIdNormalizerFactory: Send + Sync {
    fn normalizer_with_login_id_type(&self, login_id_type: LoginIdType) -> Box<dyn LoginIdNormalizer>;
}

#[derive(Debug, Clone, Default)]
pub struct EmailNormalizer {
    config: EmailNormalizationConfig,
}

impl EmailNormalizer {
    #[must_use]
    pub const fn new(config: EmailNormalizationConfig) -> Self {
        Self { config }
    }
}

impl LoginIdNormalizer for EmailNormalizer {
    fn normalize(&self, login_id: &str) -> Result<String> {
        let trimmed = login_id.trim();
        let (local, domain) = match trimmed.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
                (local, domain)
            }
            _ => return Err(Error::InvalidInput(format!("invalid email: {trimmed}"))),
        };

        let mut local = if self.config.case_sensitive {
            local.to_string()
        } else {
            local.to_lowercase()
        };

        if self.config.block_plus_sign {
            if let Some(idx) = local.find('+') {
                local.truncate(idx);
            }
        }

        if self.config.ignore_dot_sign {
            local.retain(|c| c != '.');
        }

        Ok(format!("{local}@{}", domain.to_lowercase()))
    }
}

/// Trims surrounding whitespace only
#[derive(Debug, Clone, Copy, Default)]
pub struct RawNormalizer;

impl LoginIdNormalizer for RawNormalizer {
    fn normalize(&self, login_id: &str) -> Result<String> {
        Ok(login_id.trim().to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DefaultLoginIdNormalizerFactory {
    email: EmailNormalizationConfig,
}

impl DefaultLoginIdNormalizerFactory {
    #[must_use]
    pub const fn new(email: EmailNormalizationConfig) -> Self {
        Self { email }
    }
}

impl LoginIdNormalizerFactory for DefaultLoginIdNormalizerFactory {
    fn normalizer_with_login_id_type(&self, login_id_type: LoginIdType) -> Box<dyn LoginIdNormalizer> {
        match login_id_type {
            LoginIdType::Email => Box::new(EmailNormalizer::new(self.email.clone())),
            LoginIdType::Username | LoginIdType::Phone | LoginIdType::Raw => Box::new(RawNormalizer),
        }
    }
}
