//! Bearer-token authentication.
//!
//! Resolves the `Authorization` header of a request to a [`Principal`]. A
//! missing header yields the anonymous principal. Every other problem, be it
//! a malformed header, a malformed token or an unknown or expired token,
//! collapses into [`ApiError::InvalidAuthenticationToken`] so callers cannot
//! tell them apart.
use std::{sync::Arc, time::Duration};

use axum::http::{HeaderMap, header};

use crate::{
    core::{
        error::ApiError,
        principal::Principal,
        token::{TokenScope, validate_token_plaintext},
        validator::Validator,
    },
    ports::{
        principal_store::PrincipalStore,
        store::{StoreError, bounded},
    },
};

pub struct Authenticator {
    store: Arc<dyn PrincipalStore>,
    query_timeout: Duration,
}

impl Authenticator {
    pub fn new(store: Arc<dyn PrincipalStore>, query_timeout: Duration) -> Self {
        Self {
            store,
            query_timeout,
        }
    }

    /// Resolve the principal for a request from its headers.
    pub async fn resolve(&self, headers: &HeaderMap) -> Result<Principal, ApiError> {
        let Some(value) = headers.get(header::AUTHORIZATION) else {
            return Ok(Principal::anonymous());
        };

        let value = value
            .to_str()
            .map_err(|_| ApiError::InvalidAuthenticationToken)?;
        let token = bearer_token(value).ok_or(ApiError::InvalidAuthenticationToken)?;

        let mut v = Validator::new();
        validate_token_plaintext(&mut v, token);
        if !v.valid() {
            return Err(ApiError::InvalidAuthenticationToken);
        }

        let lookup = self
            .store
            .principal_for_token(TokenScope::Authentication, token);
        match bounded(self.query_timeout, lookup).await {
            Ok(principal) => Ok(principal),
            Err(StoreError::RecordNotFound) => Err(ApiError::InvalidAuthenticationToken),
            Err(e) => Err(ApiError::Fault(
                eyre::Report::new(e).wrap_err("resolving authentication token"),
            )),
        }
    }
}

/// Extract `<token>` from a header of exactly the form `Bearer <token>`.
fn bearer_token(value: &str) -> Option<&str> {
    let parts: Vec<&str> = value.split(' ').collect();
    match parts.as_slice() {
        ["Bearer", token] => Some(token),
        _ => None,
    }
}
