pub mod sso;

pub use sso::{BeginParams, BeginResult, CallbackOutcome, ExternalFlowParams, SsoService};
