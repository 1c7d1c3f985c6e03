//! Federated-login (SSO) engine for a multi-tenant identity server.
//!
//! The crate speaks OAuth2/OIDC to third-party identity providers, protects the
//! redirect round-trip with a signed state token, a hashed nonce and PKCE,
//! resolves the provider identity against the local user/principal store and
//! issues a single-use authorization code bound to that decision.

pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod models;
pub mod service;
pub mod sso;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result, SsoFailedCause};
pub use service::SsoService;
