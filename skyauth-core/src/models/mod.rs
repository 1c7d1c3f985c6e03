pub mod event;
pub mod id;
pub mod principal;
pub mod provider;
pub mod user;

pub use event::{Event, Identity, TaskSpec, WelcomeEmailParam, WELCOME_EMAIL_SEND_TASK};
pub use id::{generate_id, PrincipalId, UserId};
pub use principal::{OAuthPrincipal, PasswordPrincipal, Principal, ProviderKeys};
pub use provider::{ProviderConfig, ProviderKind};
pub use user::{User, UserProfile};
