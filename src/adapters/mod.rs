pub mod account_handler;
pub mod http_handler;
pub mod middleware;
pub mod movie_store;
pub mod notifier;
pub mod panic_guard;
pub mod principal_store;
pub mod server;

/// Re-export commonly used types from adapters
pub use http_handler::{AppState, apply_chain, build_router};
pub use middleware::*;
pub use movie_store::InMemoryMovieStore;
pub use notifier::LogNotifier;
pub use panic_guard::panic_guard_layer;
pub use principal_store::InMemoryPrincipalStore;
pub use server::GatewayServer;
