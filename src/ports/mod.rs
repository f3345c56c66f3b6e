//! Ports: the traits the gatekeeping core depends on.
//!
//! Adapters in [`crate::adapters`] provide the concrete implementations.
pub mod http_server;
pub mod movie_store;
pub mod notifier;
pub mod principal_store;
pub mod store;

pub use movie_store::MovieStore;
pub use notifier::{Notifier, ResourceEvent};
pub use principal_store::PrincipalStore;
pub use store::{StoreError, StoreResult};
