use eyre::Result;

/// HttpServer defines the port (interface) for running the API server
pub trait HttpServer: Send + Sync + 'static {
    /// Run the HTTP server
    ///
    /// # Returns
    /// A future that resolves once the server has fully drained, or with the
    /// error that stopped startup, serving or draining
    fn run(&self) -> impl std::future::Future<Output = Result<()>> + Send;
}
