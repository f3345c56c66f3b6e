pub mod background;
pub mod graceful_shutdown;
pub mod lifecycle;

use std::any::Any;

pub use background::BackgroundTasks;
pub use graceful_shutdown::{GracefulShutdown, ShutdownSignal, ShutdownToken};
pub use lifecycle::{LifecycleCoordinator, LifecycleError, LifecycleState};

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
