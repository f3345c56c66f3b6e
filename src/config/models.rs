//! Configuration data structures for Gatehouse.
//!
//! These types map directly to YAML (also TOML / JSON) configuration files and
//! to `GATEHOUSE_SECTION__KEY` environment variables. Every section carries
//! defaults so that an empty file, or no file at all, yields a runnable
//! development server.
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Per-client admission control settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LimiterConfig {
    /// When false every request is admitted
    pub enabled: bool,
    /// Refill rate in requests per second
    pub rps: f64,
    /// Bucket capacity
    pub burst: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rps: 2.0,
            burst: 4,
        }
    }
}

/// Cross-origin settings
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct CorsConfig {
    /// Origins allowed to make cross-origin requests, matched exactly
    pub trusted_origins: Vec<String>,
}

/// Drain settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time allowed for in-flight HTTP requests once draining starts
    pub grace_period_secs: u64,
    /// Bound on the wait for background tasks; unbounded when unset
    pub background_timeout_secs: Option<u64>,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 5,
            background_timeout_secs: None,
        }
    }
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn background_timeout(&self) -> Option<Duration> {
        self.background_timeout_secs.map(Duration::from_secs)
    }
}

/// Data-layer settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DataConfig {
    /// Upper bound for a single store call
    pub query_timeout_secs: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            query_timeout_secs: 3,
        }
    }
}

impl DataConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

/// Logging settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
    /// Attach the current span and its parents to JSON lines
    pub spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            spans: true,
        }
    }
}

/// Credential issuance settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AuthConfig {
    /// bcrypt work factor for new password hashes
    pub password_cost: u32,
    /// Lifetime of tokens issued by `POST /v1/tokens/authentication`
    pub authentication_ttl_secs: i64,
    /// Lifetime of activation tokens issued on registration
    pub activation_ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            password_cost: 12,
            authentication_ttl_secs: 24 * 60 * 60,
            activation_ttl_secs: 3 * 24 * 60 * 60,
        }
    }
}

impl AuthConfig {
    pub fn authentication_ttl(&self) -> TimeDelta {
        TimeDelta::try_seconds(self.authentication_ttl_secs).unwrap_or(TimeDelta::MAX)
    }

    pub fn activation_ttl(&self) -> TimeDelta {
        TimeDelta::try_seconds(self.activation_ttl_secs).unwrap_or(TimeDelta::MAX)
    }
}

/// A token issued to a seeded principal at startup
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SeedToken {
    /// 26 character base32 plaintext
    pub plaintext: String,
    /// Lifetime from startup
    #[serde(default = "default_token_ttl_secs")]
    pub ttl_secs: i64,
}

fn default_token_ttl_secs() -> i64 {
    24 * 60 * 60
}

/// A principal loaded into the in-memory store at startup
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SeedPrincipal {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub activated: bool,
    /// bcrypt hash; principals without one cannot request tokens
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub tokens: Vec<SeedToken>,
}

/// A movie loaded into the in-memory store at startup
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SeedMovie {
    pub title: String,
    pub year: i32,
    pub runtime: i32,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// Initial data for the in-memory stores
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SeedConfig {
    pub principals: Vec<SeedPrincipal>,
    pub movies: Vec<SeedMovie>,
}

/// Main server configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the API listens on
    pub listen_addr: String,
    /// Environment name reported by the healthcheck
    pub env: String,
    pub limiter: LimiterConfig,
    pub cors: CorsConfig,
    pub shutdown: ShutdownConfig,
    pub data: DataConfig,
    pub auth: AuthConfig,
    pub log: LogConfig,
    pub seed: SeedConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:4000".to_string(),
            env: "development".to_string(),
            limiter: LimiterConfig::default(),
            cors: CorsConfig::default(),
            shutdown: ShutdownConfig::default(),
            data: DataConfig::default(),
            auth: AuthConfig::default(),
            log: LogConfig::default(),
            seed: SeedConfig::default(),
        }
    }
}
