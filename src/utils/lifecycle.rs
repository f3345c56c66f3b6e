//! Process lifecycle: serve until a termination signal, then drain.
//!
//! The coordinator moves through `Starting -> Serving -> Draining -> Stopped`.
//! Draining first stops accepting connections and gives in-flight requests a
//! bounded grace period, then waits for every background task. `Stopped` is
//! only reached after both steps, and a missed deadline is returned as an
//! error instead of being swallowed.
use std::{
    fmt, io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use axum::Router;
use thiserror::Error;
use tokio::{net::TcpListener, time::timeout};

use crate::{
    config::models::ShutdownConfig,
    utils::{
        background::BackgroundTasks,
        graceful_shutdown::{GracefulShutdown, ShutdownSignal},
    },
};

/// Infrastructure failures surfaced to the process exit path.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LifecycleError {
    #[error("failed to bind listener on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] io::Error),

    #[error("{stage} did not finish within {limit:?}")]
    ShutdownDeadline { stage: &'static str, limit: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Starting = 0,
    Serving = 1,
    Draining = 2,
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Starting,
            1 => LifecycleState::Serving,
            2 => LifecycleState::Draining,
            _ => LifecycleState::Stopped,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Serving => "serving",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

enum ServePhase {
    /// The server future finished before any shutdown signal.
    Exited(io::Result<()>),
    Draining(ShutdownSignal),
}

/// Owns the listener, the background task set and the shutdown trigger.
/// Cloning yields a handle to the same lifecycle.
#[derive(Clone)]
pub struct LifecycleCoordinator {
    state: Arc<AtomicU8>,
    shutdown: GracefulShutdown,
    background: BackgroundTasks,
    grace_period: Duration,
    background_timeout: Option<Duration>,
}

impl LifecycleCoordinator {
    pub fn new(config: &ShutdownConfig) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(LifecycleState::Starting as u8)),
            shutdown: GracefulShutdown::new(),
            background: BackgroundTasks::new(),
            grace_period: config.grace_period(),
            background_timeout: config.background_timeout(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn background(&self) -> &BackgroundTasks {
        &self.background
    }

    pub fn shutdown(&self) -> &GracefulShutdown {
        &self.shutdown
    }

    /// Start draining as if `signal` had been received.
    pub fn trigger(&self, signal: ShutdownSignal) -> bool {
        self.shutdown.trigger_shutdown(signal)
    }

    fn set_state(&self, next: LifecycleState) {
        let previous = LifecycleState::from_u8(self.state.swap(next as u8, Ordering::AcqRel));
        if previous != next {
            tracing::info!(from = %previous, to = %next, "Lifecycle state changed");
        }
    }

    /// Bind the listening socket.
    pub async fn bind(&self, address: &str) -> Result<TcpListener, LifecycleError> {
        TcpListener::bind(address)
            .await
            .map_err(|source| LifecycleError::Bind {
                address: address.to_string(),
                source,
            })
    }

    /// Serve `app` on `listener` until shutdown, then drain.
    pub async fn serve(&self, listener: TcpListener, app: Router) -> Result<(), LifecycleError> {
        let local_addr = listener.local_addr().map_err(LifecycleError::Serve)?;
        tracing::info!(address = %local_addr, "Starting server");

        let server_shutdown = self.shutdown.clone();
        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            server_shutdown.wait_for_shutdown_signal().await;
        })
        .into_future();
        tokio::pin!(server);

        self.set_state(LifecycleState::Serving);

        let phase = tokio::select! {
            result = &mut server => ServePhase::Exited(result),
            signal = self.shutdown.wait_for_shutdown_signal() => ServePhase::Draining(signal),
        };

        let socket_result = match phase {
            ServePhase::Exited(result) => {
                self.set_state(LifecycleState::Draining);
                result.map_err(LifecycleError::Serve)
            }
            ServePhase::Draining(signal) => {
                self.set_state(LifecycleState::Draining);
                tracing::info!(
                    signal = signal.name(),
                    grace_period = ?self.grace_period,
                    "Shutting down server"
                );
                match timeout(self.grace_period, &mut server).await {
                    Ok(result) => result.map_err(LifecycleError::Serve),
                    Err(_) => Err(LifecycleError::ShutdownDeadline {
                        stage: "in-flight requests",
                        limit: self.grace_period,
                    }),
                }
            }
        };
        if let Err(e) = &socket_result {
            tracing::error!(error = %e, "Server shutdown incomplete");
        }

        let background_result = self.wait_for_background().await;

        self.set_state(LifecycleState::Stopped);
        tracing::info!(address = %local_addr, "Stopped server");

        socket_result.and(background_result)
    }

    async fn wait_for_background(&self) -> Result<(), LifecycleError> {
        tracing::info!(
            active = self.background.active_count(),
            "Completing background tasks"
        );

        match self.background_timeout {
            None => {
                self.background.wait_idle().await;
                Ok(())
            }
            Some(limit) => timeout(limit, self.background.wait_idle())
                .await
                .map_err(|_| {
                    tracing::error!(
                        active = self.background.active_count(),
                        ?limit,
                        "Background tasks still running at deadline"
                    );
                    LifecycleError::ShutdownDeadline {
                        stage: "background tasks",
                        limit,
                    }
                }),
        }
    }
}
