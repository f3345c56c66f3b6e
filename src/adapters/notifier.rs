use async_trait::async_trait;
use eyre::Result;

use crate::ports::notifier::{Notifier, ResourceEvent};

/// Notifier that records events in the structured log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: ResourceEvent) -> Result<()> {
        match event {
            ResourceEvent::MovieCreated { id, title } => {
                tracing::info!(movie_id = id, %title, "Movie created");
            }
            ResourceEvent::MovieDeleted { id } => {
                tracing::info!(movie_id = id, "Movie deleted");
            }
            // The token stays out of the log.
            ResourceEvent::PrincipalRegistered { id, email, .. } => {
                tracing::info!(principal_id = id, %email, "Activation token issued");
            }
        }
        Ok(())
    }
}
