use http::StatusCode;
use thiserror::Error;

/// Classification of an SSO failure.
///
/// Only the cause is ever exposed to clients; the provider-specific reason
/// stays in the message, which is logged but not returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsoFailedCause {
    Unauthorized,
    NetworkFailed,
    InvalidParams,
}

impl SsoFailedCause {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized",
            Self::NetworkFailed => "NetworkFailed",
            Self::InvalidParams => "InvalidParams",
        }
    }
}

impl std::fmt::Display for SsoFailedCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("SSO failed ({cause}): {message}")]
    SsoFailed {
        cause: SsoFailedCause,
        message: String,
    },

    #[error("authorization code not found")]
    CodeNotFound,

    #[error("duplicated authorization code")]
    DuplicatedCode,

    #[error("user is already linked to this provider")]
    AlreadyLinked,

    #[error("login ID already used")]
    LoginIdAlreadyUsed,

    #[error("identity not found")]
    IdentityNotFound,

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn sso_unauthorized(message: impl Into<String>) -> Self {
        Self::SsoFailed {
            cause: SsoFailedCause::Unauthorized,
            message: message.into(),
        }
    }

    pub fn sso_network_failed(message: impl Into<String>) -> Self {
        Self::SsoFailed {
            cause: SsoFailedCause::NetworkFailed,
            message: message.into(),
        }
    }

    pub fn sso_invalid_params(message: impl Into<String>) -> Self {
        Self::SsoFailed {
            cause: SsoFailedCause::InvalidParams,
            message: message.into(),
        }
    }

    /// The single opaque error returned for any state token rejection.
    #[must_use]
    pub fn invalid_state() -> Self {
        Self::sso_invalid_params("invalid sso state")
    }

    /// SSO failure cause, if this is an SSO failure.
    #[must_use]
    pub const fn sso_cause(&self) -> Option<SsoFailedCause> {
        match self {
            Self::SsoFailed { cause, .. } => Some(*cause),
            _ => None,
        }
    }

    /// Stable machine-readable reason used in callback error payloads.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::SsoFailed { .. } => "SSOFailed",
            Self::CodeNotFound => "CodeNotFound",
            Self::DuplicatedCode => "DuplicatedCode",
            Self::AlreadyLinked => "AlreadyLinked",
            Self::LoginIdAlreadyUsed => "LoginIDAlreadyUsed",
            Self::IdentityNotFound | Self::ProviderNotFound(_) | Self::NotFound(_) => "NotFound",
            Self::InvalidInput(_) => "InvalidArgument",
            Self::Redis(_) | Self::Serialization(_) | Self::Internal(_) => "UnexpectedError",
        }
    }

    /// Message that is safe to hand back to a client.
    ///
    /// SSO failures only expose their cause; internal errors are logged here
    /// and replaced by a generic message.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::SsoFailed { cause, .. } => format!("SSO failed: {cause}"),
            Self::Redis(_) | Self::Serialization(_) | Self::Internal(_) => {
                tracing::error!("Internal error: {self}");
                "unexpected error".to_string()
            }
            other => other.to_string(),
        }
    }

    /// HTTP status the handler layer should answer with.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::SsoFailed { cause, .. } => match cause {
                SsoFailedCause::Unauthorized => StatusCode::UNAUTHORIZED,
                SsoFailedCause::NetworkFailed => StatusCode::BAD_GATEWAY,
                SsoFailedCause::InvalidParams => StatusCode::BAD_REQUEST,
            },
            Self::CodeNotFound
            | Self::IdentityNotFound
            | Self::ProviderNotFound(_)
            | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::DuplicatedCode | Self::AlreadyLinked | Self::LoginIdAlreadyUsed => {
                StatusCode::CONFLICT
            }
            Self::Redis(_) | Self::Serialization(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
