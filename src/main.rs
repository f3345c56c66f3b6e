use std::{path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{Result, eyre::Context};
use gatehouse::{
    adapters::GatewayServer,
    config::{ServerConfig, ServerConfigValidator, loader::load_config},
    metrics,
    ports::http_server::HttpServer,
    tracing_setup,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Start the API server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.toml")]
        config: String,

        #[clap(flatten)]
        overrides: ServeOverrides,
    },
}

/// Command-line values that take precedence over the file and environment.
#[derive(clap::Args, Debug, Default)]
struct ServeOverrides {
    /// Address to listen on, e.g. 0.0.0.0:4000
    #[clap(long)]
    listen_addr: Option<String>,

    /// Rate limiter maximum requests per second
    #[clap(long)]
    limiter_rps: Option<f64>,

    /// Rate limiter maximum burst
    #[clap(long)]
    limiter_burst: Option<u32>,

    /// Enable rate limiter
    #[clap(long)]
    limiter_enabled: Option<bool>,

    /// Trusted CORS origins (space separated)
    #[clap(long, value_delimiter = ' ', num_args = 1..)]
    cors_trusted_origins: Option<Vec<String>>,
}

impl ServeOverrides {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(listen_addr) = self.listen_addr {
            config.listen_addr = listen_addr;
        }
        if let Some(rps) = self.limiter_rps {
            config.limiter.rps = rps;
        }
        if let Some(burst) = self.limiter_burst {
            config.limiter.burst = burst;
        }
        if let Some(enabled) = self.limiter_enabled {
            config.limiter.enabled = enabled;
        }
        if let Some(origins) = self.cors_trusted_origins {
            config.cors.trusted_origins = origins.into_iter().filter(|o| !o.is_empty()).collect();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config, overrides }) => serve(&config, overrides).await,
        None => serve(&args.config, ServeOverrides::default()).await,
    }
}

async fn serve(config_path: &str, overrides: ServeOverrides) -> Result<()> {
    let mut config = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    overrides.apply(&mut config);
    ServerConfigValidator::validate(&config).context("Invalid configuration")?;

    tracing_setup::init_from_config(&config.log).context("Failed to initialize tracing")?;
    metrics::init_metrics().context("Failed to initialize metrics")?;

    tracing::info!(
        config_path,
        env = %config.env,
        listen_addr = %config.listen_addr,
        limiter_enabled = config.limiter.enabled,
        "Loaded configuration"
    );

    let server = GatewayServer::new(Arc::new(config));

    let shutdown = server.coordinator().shutdown().clone();
    tokio::spawn(async move {
        if let Err(e) = shutdown.run_signal_handler().await {
            tracing::error!(error = %e, "Signal handler failed");
        }
    });

    if let Err(e) = server.run().await {
        tracing::error!(error = ?e, "Server stopped with error");
        return Err(e);
    }

    let signal = server.coordinator().shutdown().signal();
    tracing::info!(signal = ?signal, "Server shutdown complete");
    Ok(())
}

async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Environment: {}", config.env);
            if config.limiter.enabled {
                println!(
                    "   • Rate Limiter: {} rps, burst {}",
                    config.limiter.rps, config.limiter.burst
                );
            } else {
                println!("   • Rate Limiter: disabled");
            }
            println!("   • Trusted Origins: {}", config.cors.trusted_origins.len());
            println!("   • Password Cost: {}", config.auth.password_cost);
            println!("   • Seeded Principals: {}", config.seed.principals.len());
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Verify listen address format (e.g., '127.0.0.1:4000')");
            println!("   • Trusted origins look like 'https://example.com' with no trailing slash");
            println!("   • Seed tokens are 26 characters from A-Z and 2-7");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Gatehouse configuration

listen_addr = "127.0.0.1:4000"
env = "development"

[limiter]
enabled = true
rps = 2.0
burst = 4

[cors]
# Origins must match the Origin header exactly.
trusted_origins = []

[shutdown]
grace_period_secs = 5
# background_timeout_secs = 30

[data]
query_timeout_secs = 3

[auth]
password_cost = 12
authentication_ttl_secs = 86400
activation_ttl_secs = 259200

[log]
level = "info"
json = false
# Attach span context to JSON lines
spans = true

# Example principal with a bearer token (26 base32 characters).
# [[seed.principals]]
# id = 1
# name = "Alice"
# email = "alice@example.com"
# activated = true
# password_hash = "$2b$12$..."
# permissions = ["movies:read", "movies:write"]
# tokens = [{ plaintext = "ALICEALICEALICEALICEALICE2", ttl_secs = 86400 }]

# [[seed.movies]]
# title = "Casablanca"
# year = 1942
# runtime = 102
# genres = ["drama", "romance"]
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'gatehouse serve --config {config_path}' to start the server");
    Ok(())
}
