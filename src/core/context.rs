//! Request-scoped principal storage.
//!
//! The authenticator binds the resolved [`Principal`] into the request
//! extensions and downstream gates and handlers read it back. Reading it
//! before it has been set is a programming error, reported as a fault.
use axum::{extract::FromRequestParts, http::Extensions, http::request::Parts};
use thiserror::Error;

use crate::core::{error::ApiError, principal::Principal};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("principal missing from request context")]
    MissingPrincipal,
}

impl From<ContextError> for ApiError {
    fn from(err: ContextError) -> Self {
        ApiError::Fault(eyre::Report::new(err))
    }
}

/// Bind `principal` to a request.
pub fn set_principal(extensions: &mut Extensions, principal: Principal) {
    extensions.insert(principal);
}

/// Read the principal bound to a request.
pub fn principal(extensions: &Extensions) -> Result<&Principal, ContextError> {
    extensions
        .get::<Principal>()
        .ok_or(ContextError::MissingPrincipal)
}

/// Extractor handing the bound principal to a handler.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CurrentPrincipal(principal(&parts.extensions)?.clone()))
    }
}
