//! Gatehouse - request gatekeeping and lifecycle layer for an HTTP resource API.
//!
//! Every request to the movie API passes through a fixed chain before it
//! reaches a handler:
//!
//! 1. **PanicGuard** converts a handler panic into a generic 500 response and
//!    closes that connection, leaving the process serving.
//! 2. **Rate limiting** admits each client IP through its own token bucket.
//! 3. **Authentication** resolves the `Authorization: Bearer <token>` header
//!    into a [`core::Principal`], falling back to the anonymous principal.
//! 4. **Authorization** gates (authenticated, activated, permission) are
//!    attached per route.
//!
//! Accounts are created through `POST /v1/users`, activated with a
//! single-use token and exchange email and password for bearer tokens at
//! `POST /v1/tokens/authentication`.
//!
//! Around the chain, [`utils::LifecycleCoordinator`] owns the listener and
//! the background task set. On SIGINT or SIGTERM it stops accepting
//! connections, drains in-flight requests within the configured grace period
//! and then waits for background work before reporting `Stopped`.
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use gatehouse::{GatewayServer, config::ServerConfig, ports::http_server::HttpServer};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg: ServerConfig = gatehouse::config::loader::load_config("config.toml").await?;
//! let server = GatewayServer::new(Arc::new(cfg));
//! let shutdown = server.coordinator().shutdown().clone();
//! tokio::spawn(async move { shutdown.run_signal_handler().await });
//! server.run().await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping the gatekeeping logic inside `core`.
//!
//! # Error Handling
//! Request-level failures are [`core::ApiError`] values rendered as
//! `{"error": ...}` JSON. Infrastructure failures use `eyre::Result<T>` with
//! context attached through `WrapErr`.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{AppState, GatewayServer, build_router},
    core::{ApiError, Gatekeeper},
    utils::{GracefulShutdown, LifecycleCoordinator},
};
