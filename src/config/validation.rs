use std::{collections::HashSet, net::SocketAddr};

use crate::{
    config::models::ServerConfig,
    core::{
        account::looks_like_bcrypt_hash,
        rate_limiter::refill_period,
        token::{MAX_TOKEN_TTL_SECS, is_well_formed},
    },
};

/// Work factors bcrypt accepts.
const PASSWORD_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Invalid seed data: {message}")]
    InvalidSeed { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration, reporting every problem at once.
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if config.limiter.enabled {
            if let Err(message) = refill_period(config.limiter.rps) {
                errors.push(ValidationError::InvalidField {
                    field: "limiter.rps".to_string(),
                    message,
                });
            }
            if config.limiter.burst == 0 {
                errors.push(ValidationError::InvalidField {
                    field: "limiter.burst".to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }

        for (i, origin) in config.cors.trusted_origins.iter().enumerate() {
            if let Err(e) = Self::validate_origin(origin, &format!("cors.trusted_origins[{i}]")) {
                errors.push(e);
            }
        }

        if config.shutdown.grace_period_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "shutdown.grace_period_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if config.data.query_timeout_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "data.query_timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if !PASSWORD_COST_RANGE.contains(&config.auth.password_cost) {
            errors.push(ValidationError::InvalidField {
                field: "auth.password_cost".to_string(),
                message: format!(
                    "must be between 4 and 31, got {}",
                    config.auth.password_cost
                ),
            });
        }
        for (field, ttl) in [
            ("auth.authentication_ttl_secs", config.auth.authentication_ttl_secs),
            ("auth.activation_ttl_secs", config.auth.activation_ttl_secs),
        ] {
            if !(1..=MAX_TOKEN_TTL_SECS).contains(&ttl) {
                errors.push(ValidationError::InvalidField {
                    field: field.to_string(),
                    message: format!("must be between 1 and {MAX_TOKEN_TTL_SECS}, got {ttl}"),
                });
            }
        }

        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&config.log.level) {
            errors.push(ValidationError::InvalidField {
                field: "log.level".to_string(),
                message: e.to_string(),
            });
        }

        errors.extend(Self::validate_seed(config));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:4000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Origins are compared verbatim against the `Origin` header, so they must
    /// be bare `scheme://host[:port]` values.
    fn validate_origin(origin: &str, context: &str) -> ValidationResult<()> {
        let url = url::Url::parse(origin).map_err(|e| ValidationError::InvalidField {
            field: context.to_string(),
            message: format!("Invalid URL format: {e}"),
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!(
                    "URL scheme must be 'http' or 'https', got '{}'",
                    url.scheme()
                ),
            });
        }

        if url.host().is_none() {
            return Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: "URL must have a valid host".to_string(),
            });
        }

        if url.path() != "/" || origin.ends_with('/') || url.query().is_some() {
            return Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("origin must not carry a path or query: '{origin}'"),
            });
        }

        Ok(())
    }

    fn validate_seed(config: &ServerConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut ids = HashSet::new();
        let mut emails = HashSet::new();
        let mut tokens = HashSet::new();

        for principal in &config.seed.principals {
            if principal.id < 1 {
                errors.push(ValidationError::InvalidSeed {
                    message: format!("principal '{}' must have a positive id", principal.name),
                });
            }
            if !ids.insert(principal.id) {
                errors.push(ValidationError::InvalidSeed {
                    message: format!("duplicate principal id {}", principal.id),
                });
            }
            if !emails.insert(principal.email.to_lowercase()) {
                errors.push(ValidationError::InvalidSeed {
                    message: format!("duplicate principal email '{}'", principal.email),
                });
            }
            if principal
                .password_hash
                .as_deref()
                .is_some_and(|hash| !looks_like_bcrypt_hash(hash))
            {
                errors.push(ValidationError::InvalidSeed {
                    message: format!(
                        "password hash for principal {} is not a bcrypt hash",
                        principal.id
                    ),
                });
            }
            for token in &principal.tokens {
                if !is_well_formed(&token.plaintext) {
                    errors.push(ValidationError::InvalidSeed {
                        message: format!(
                            "token for principal {} must be 26 base32 characters",
                            principal.id
                        ),
                    });
                }
                if !tokens.insert(token.plaintext.as_str()) {
                    errors.push(ValidationError::InvalidSeed {
                        message: format!("token for principal {} is reused", principal.id),
                    });
                }
                if !(1..=MAX_TOKEN_TTL_SECS).contains(&token.ttl_secs) {
                    errors.push(ValidationError::InvalidSeed {
                        message: format!(
                            "token for principal {} must have a ttl between 1 and {MAX_TOKEN_TTL_SECS} seconds",
                            principal.id
                        ),
                    });
                }
            }
        }

        errors
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
