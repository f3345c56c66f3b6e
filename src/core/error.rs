//! Client-facing error taxonomy.
//!
//! Every failure that terminates the middleware chain is expressed as an
//! [`ApiError`]. Converting it into a response yields the matching status
//! code and a JSON body of the form `{"error": ...}`. Faults are logged at
//! error level and answered with a generic message so internal details never
//! reach the client.
use std::collections::BTreeMap;

use axum::{
    Json,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{metrics, ports::store::StoreError};

/// Body returned for every 500 response.
pub const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ApiError {
    /// Admission control rejected the request (429).
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// Malformed header, malformed token, unknown token and expired token
    /// all collapse into this variant (401).
    #[error("invalid authentication token")]
    InvalidAuthenticationToken,

    /// Unknown email or wrong password at the token endpoint (401).
    #[error("invalid authentication credentials")]
    InvalidCredentials,

    /// Anonymous principal reached a gate that requires an identity (401).
    #[error("authentication required")]
    AuthenticationRequired,

    #[error("account not activated")]
    AccountNotActivated,

    #[error("not permitted")]
    NotPermitted,

    #[error("the requested resource could not be found")]
    NotFound,

    #[error("the {0} method is not supported for this resource")]
    MethodNotAllowed(Method),

    #[error("{0}")]
    BadRequest(String),

    /// Field-level validation failures keyed by field name (422).
    #[error("failed validation")]
    FailedValidation(BTreeMap<String, String>),

    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    /// Any unrecovered failure, including programming invariant violations (500).
    #[error("internal fault: {0}")]
    Fault(eyre::Report),
}

impl ApiError {
    /// Status code the error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InvalidAuthenticationToken
            | ApiError::InvalidCredentials
            | ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::AccountNotActivated | ApiError::NotPermitted => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::EditConflict => StatusCode::CONFLICT,
            ApiError::Fault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// A 422 carrying a single field message.
    pub fn field_error(field: &str, message: &str) -> Self {
        ApiError::FailedValidation(BTreeMap::from([(field.to_string(), message.to_string())]))
    }

    /// Whether this error is a server-side fault rather than a client error.
    pub fn is_fault(&self) -> bool {
        matches!(self, ApiError::Fault(_))
    }
}

impl From<eyre::Report> for ApiError {
    fn from(report: eyre::Report) -> Self {
        ApiError::Fault(report)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RecordNotFound => ApiError::NotFound,
            StoreError::EditConflict => ApiError::EditConflict,
            StoreError::DuplicateEmail => ApiError::field_error(
                "email",
                "a user with this email address already exists",
            ),
            other => ApiError::Fault(eyre::Report::new(other)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            ApiError::Fault(report) => {
                tracing::error!(error = ?report, "server error");
                metrics::increment_server_errors();
                json!({ "error": SERVER_ERROR_MESSAGE })
            }
            ApiError::FailedValidation(errors) => json!({ "error": errors }),
            other => json!({ "error": other.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();

        if matches!(self, ApiError::InvalidAuthenticationToken) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        response
    }
}
