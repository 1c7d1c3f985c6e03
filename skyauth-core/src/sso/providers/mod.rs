//! Concrete provider variants, one per [`crate::models::ProviderKind`].

pub mod apple;
pub mod azureadv2;
pub mod facebook;
pub mod google;
pub mod instagram;
pub mod linkedin;

pub use apple::{AppleProvider, APPLE_ISSUER};
pub use azureadv2::{AzureAdV2Endpoints, AzureAdV2Provider};
pub use facebook::{FacebookEndpoints, FacebookProvider};
pub use google::{GoogleEndpoints, GoogleProvider};
pub use instagram::{InstagramEndpoints, InstagramProvider};
pub use linkedin::{LinkedInEndpoints, LinkedInProvider};

/// Configured scope, or the provider default when none is set
fn scope_or<'a>(configured: &'a str, default: &'a str) -> &'a str {
    if configured.trim().is_empty() {
        default
    } else {
        configured
    }
}
