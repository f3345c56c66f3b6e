//! Panic containment for request handling.
//!
//! A panic anywhere below [`panic_guard_layer`] terminates only the request
//! that raised it. The client gets the generic 500 body and the connection is
//! marked for closure, since the response may have been written from an
//! inconsistent state.
use std::any::Any;

use axum::{
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use eyre::eyre;
use tower_http::catch_panic::CatchPanicLayer;

use crate::{core::error::ApiError, metrics, utils::panic_message};

pub type PanicHandler = fn(Box<dyn Any + Send + 'static>) -> Response;

/// Turn a caught panic into a server-error response.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    metrics::increment_panics_recovered();

    let message = panic_message(payload.as_ref());
    let mut response = ApiError::Fault(eyre!("panic while handling request: {message}"))
        .into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

pub fn panic_guard_layer() -> CatchPanicLayer<PanicHandler> {
    CatchPanicLayer::custom(handle_panic as PanicHandler)
}
