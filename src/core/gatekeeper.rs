//! The long-lived object shared by every gatekeeping middleware.
//!
//! A `Gatekeeper` is constructed once at startup from the server
//! configuration and the principal store. It bundles the per-client limiter,
//! the authenticator, the authorization chain and the CORS allow-list so
//! that middleware only needs a single `Arc<Gatekeeper>`.
use std::{net::IpAddr, sync::Arc};

use axum::http::HeaderMap;
use eyre::{Result, eyre};

use crate::{
    config::ServerConfig,
    core::{
        authenticator::Authenticator,
        authorization::{AuthorizationChain, Gate},
        error::ApiError,
        principal::Principal,
        rate_limiter::TokenBucketLimiter,
    },
    ports::principal_store::PrincipalStore,
};

pub struct Gatekeeper {
    limiter: Arc<TokenBucketLimiter>,
    authenticator: Authenticator,
    authorization: AuthorizationChain,
    trusted_origins: Vec<String>,
}

impl Gatekeeper {
    pub fn new(config: &ServerConfig, principals: Arc<dyn PrincipalStore>) -> Result<Self> {
        let limiter = TokenBucketLimiter::new(&config.limiter)
            .map_err(|e| eyre!("Failed to create rate limiter: {e}"))?;
        let query_timeout = config.data.query_timeout();

        Ok(Self {
            limiter: Arc::new(limiter),
            authenticator: Authenticator::new(principals.clone(), query_timeout),
            authorization: AuthorizationChain::new(principals, query_timeout),
            trusted_origins: config.cors.trusted_origins.clone(),
        })
    }

    pub fn limiter(&self) -> &Arc<TokenBucketLimiter> {
        &self.limiter
    }

    /// Per-client admission check.
    pub fn admit(&self, client: IpAddr) -> Result<(), ApiError> {
        if self.limiter.admit(client) {
            Ok(())
        } else {
            Err(ApiError::RateLimitExceeded)
        }
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, ApiError> {
        self.authenticator.resolve(headers).await
    }

    pub async fn authorize(&self, gate: &Gate, principal: &Principal) -> Result<(), ApiError> {
        self.authorization.check(gate, principal).await
    }

    /// Exact string match against the configured allow-list.
    pub fn is_trusted_origin(&self, origin: &str) -> bool {
        self.trusted_origins.iter().any(|trusted| trusted == origin)
    }
}
