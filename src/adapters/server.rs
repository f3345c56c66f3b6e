//! Process-level wiring: stores, gatekeeper, router and lifecycle.
use std::sync::Arc;

use eyre::{Result, WrapErr};
use tokio::net::TcpListener;

use crate::{
    adapters::{
        http_handler::{AppState, build_router},
        movie_store::InMemoryMovieStore,
        notifier::LogNotifier,
        principal_store::InMemoryPrincipalStore,
    },
    config::ServerConfig,
    core::gatekeeper::Gatekeeper,
    ports::{
        http_server::HttpServer, movie_store::MovieStore, notifier::Notifier,
        principal_store::PrincipalStore,
    },
    utils::lifecycle::LifecycleCoordinator,
};

pub struct GatewayServer {
    config: Arc<ServerConfig>,
    coordinator: LifecycleCoordinator,
    principals: Arc<dyn PrincipalStore>,
    movies: Arc<dyn MovieStore>,
    notifier: Arc<dyn Notifier>,
}

impl GatewayServer {
    /// Server backed by in-memory stores seeded from `config.seed`.
    pub fn new(config: Arc<ServerConfig>) -> Self {
        let principals = Arc::new(InMemoryPrincipalStore::from_seed(&config.seed));
        let movies = Arc::new(InMemoryMovieStore::from_seed(&config.seed.movies));
        Self::with_stores(config, principals, movies, Arc::new(LogNotifier::new()))
    }

    pub fn with_stores(
        config: Arc<ServerConfig>,
        principals: Arc<dyn PrincipalStore>,
        movies: Arc<dyn MovieStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let coordinator = LifecycleCoordinator::new(&config.shutdown);
        Self {
            config,
            coordinator,
            principals,
            movies,
            notifier,
        }
    }

    /// Handle used to trigger shutdown and observe the lifecycle state.
    pub fn coordinator(&self) -> &LifecycleCoordinator {
        &self.coordinator
    }

    /// Serve on an already bound listener until shutdown completes.
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<()> {
        let gatekeeper = Arc::new(
            Gatekeeper::new(&self.config, self.principals.clone())
                .wrap_err("Failed to build gatekeeper")?,
        );

        let janitor = gatekeeper.limiter().is_enabled().then(|| {
            Arc::clone(gatekeeper.limiter()).spawn_janitor(self.coordinator.shutdown().shutdown_token())
        });

        let state = AppState {
            movies: self.movies.clone(),
            principals: self.principals.clone(),
            auth: self.config.auth.clone(),
            notifier: self.notifier.clone(),
            background: self.coordinator.background().clone(),
            env: self.config.env.clone(),
            query_timeout: self.config.data.query_timeout(),
        };
        let app = build_router(state, gatekeeper);

        let result = self.coordinator.serve(listener, app).await;

        // The janitor exits on its own after a signal; a server that stopped
        // for another reason leaves it waiting.
        if let Some(janitor) = janitor {
            janitor.abort();
            let _ = janitor.await;
        }

        result.wrap_err("Server lifecycle did not complete cleanly")
    }
}

impl HttpServer for GatewayServer {
    async fn run(&self) -> Result<()> {
        let listener = self
            .coordinator
            .bind(&self.config.listen_addr)
            .await
            .wrap_err("Failed to start server")?;
        self.run_with_listener(listener).await
    }
}
