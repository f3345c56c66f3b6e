pub mod account;
pub mod authenticator;
pub mod authorization;
pub mod context;
pub mod error;
pub mod filters;
pub mod gatekeeper;
pub mod movie;
pub mod principal;
pub mod rate_limiter;
pub mod token;
pub mod validator;

pub use authenticator::Authenticator;
pub use authorization::{AuthorizationChain, Gate};
pub use context::{ContextError, CurrentPrincipal};
pub use error::ApiError;
pub use filters::{Metadata, MovieFilters};
pub use gatekeeper::Gatekeeper;
pub use principal::{Permissions, Principal};
pub use rate_limiter::TokenBucketLimiter;
