use async_trait::async_trait;
use eyre::Result;

use crate::core::{movie::MovieId, principal::PrincipalId};

/// Events dispatched in the background after a resource changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    MovieCreated {
        id: MovieId,
        title: String,
    },
    MovieDeleted {
        id: MovieId,
    },
    /// A new account was created. The activation token plaintext is only
    /// available here and must reach the user out of band.
    PrincipalRegistered {
        id: PrincipalId,
        email: String,
        activation_token: String,
    },
}

/// Notifier defines the port for fire-and-forget notifications
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, event: ResourceEvent) -> Result<()>;
}
