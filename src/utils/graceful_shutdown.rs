use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use eyre::{Result, WrapErr};
use tokio::{signal, sync::broadcast};

/// Termination signal that starts the drain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl ShutdownSignal {
    pub fn name(&self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One-shot shutdown trigger shared by the signal handler, the server and
/// background loops.
///
/// The first signal is recorded and broadcast; any later one is ignored.
/// Cloning yields a handle to the same trigger.
#[derive(Clone)]
pub struct GracefulShutdown {
    /// Broadcast sender for shutdown signals
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    /// The signal that started the drain, set exactly once
    signal: Arc<OnceLock<ShutdownSignal>>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);
        Self {
            shutdown_tx,
            signal: Arc::new(OnceLock::new()),
        }
    }

    /// The signal that initiated shutdown, if any
    pub fn signal(&self) -> Option<ShutdownSignal> {
        self.signal.get().copied()
    }

    /// Trigger shutdown. Returns `true` only for the call that actually
    /// started it.
    pub fn trigger_shutdown(&self, signal: ShutdownSignal) -> bool {
        if self.signal.set(signal).is_ok() {
            tracing::info!(signal = signal.name(), "Shutdown triggered");
            // No receivers is fine, waiters also check the stored signal.
            let _ = self.shutdown_tx.send(signal);
            true
        } else {
            tracing::warn!(
                signal = signal.name(),
                "Shutdown already initiated, ignoring signal"
            );
            false
        }
    }

    /// Listen for SIGINT and SIGTERM for the lifetime of the process.
    ///
    /// The first signal triggers shutdown; later ones are logged and ignored.
    pub async fn run_signal_handler(&self) -> Result<()> {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{SignalKind, signal};
            signal(SignalKind::terminate()).wrap_err("Failed to register SIGTERM handler")?
        };

        tracing::info!("Signal handler started. Listening for SIGINT and SIGTERM");

        loop {
            #[cfg(unix)]
            let received = tokio::select! {
                result = signal::ctrl_c() => {
                    result.wrap_err("Failed to listen for SIGINT")?;
                    ShutdownSignal::Interrupt
                }
                _ = sigterm.recv() => ShutdownSignal::Terminate,
            };

            #[cfg(not(unix))]
            let received = {
                signal::ctrl_c()
                    .await
                    .wrap_err("Failed to listen for Ctrl+C")?;
                ShutdownSignal::Interrupt
            };

            tracing::info!(signal = received.name(), "Received termination signal");
            self.trigger_shutdown(received);
        }
    }

    /// Wait until shutdown is triggered, returning the triggering signal.
    /// Returns immediately if shutdown already happened.
    pub async fn wait_for_shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown_token().wait_for_shutdown().await
    }

    /// Create a shutdown token that can be moved into a task
    pub fn shutdown_token(&self) -> ShutdownToken {
        ShutdownToken {
            receiver: self.shutdown_tx.subscribe(),
            signal: self.signal.clone(),
        }
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// A token that can be used to await shutdown from another task
pub struct ShutdownToken {
    receiver: broadcast::Receiver<ShutdownSignal>,
    signal: Arc<OnceLock<ShutdownSignal>>,
}

impl Clone for ShutdownToken {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.resubscribe(),
            signal: self.signal.clone(),
        }
    }
}

impl ShutdownToken {
    /// Wait for the shutdown signal.
    pub async fn wait_for_shutdown(&mut self) -> ShutdownSignal {
        loop {
            // Subscribed before this check, so a trigger racing with it is
            // still delivered through the channel.
            if let Some(signal) = self.signal.get() {
                return *signal;
            }
            match self.receiver.recv().await {
                Ok(signal) => return signal,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                // The sender lives as long as any GracefulShutdown clone; once
                // it is gone nothing can trigger anymore.
                Err(broadcast::error::RecvError::Closed) => {
                    if let Some(signal) = self.signal.get() {
                        return *signal;
                    }
                    std::future::pending::<()>().await;
                }
            }
        }
    }
}
