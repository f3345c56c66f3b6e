//! Axum middleware forming the gatekeeping chain.
//!
//! Applied outermost first: metrics, CORS, per-client rate limiting and
//! authentication run for every request; [`gate_middleware`] is attached
//! per route. Any rejection ends the chain with the corresponding
//! [`ApiError`] response and the downstream handler is never invoked.
use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{ConnectInfo, Request, State, connect_info::MockConnectInfo},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use eyre::eyre;
use tracing::Instrument;

use crate::{
    core::{
        authorization::Gate,
        context::{self, set_principal},
        error::ApiError,
        gatekeeper::Gatekeeper,
    },
    metrics,
    tracing_setup::create_request_span,
};

const PREFLIGHT_ALLOW_METHODS: &str = "OPTIONS, PUT, PATCH, DELETE";
const PREFLIGHT_ALLOW_HEADERS: &str = "Authorization, Content-Type";

/// Remote address of the connection a request arrived on.
///
/// Served requests carry `ConnectInfo`; routers driven in-process may carry
/// a `MockConnectInfo` instead.
fn client_addr(req: &Request) -> Option<SocketAddr> {
    let extensions = req.extensions();
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .or_else(|| {
            extensions
                .get::<MockConnectInfo<SocketAddr>>()
                .map(|MockConnectInfo(addr)| *addr)
        })
}

/// Add `value` to `Vary` unless it is already listed.
fn append_vary(headers: &mut HeaderMap, value: &'static str) {
    let listed = headers
        .get_all(header::VARY)
        .iter()
        .any(|existing| existing.as_bytes().eq_ignore_ascii_case(value.as_bytes()));
    if !listed {
        headers.append(header::VARY, HeaderValue::from_static(value));
    }
}

/// Count requests and responses and time their processing.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let client = client_addr(&req)
        .map(|addr| addr.ip().to_string())
        .unwrap_or_default();
    let span = create_request_span(req.method().as_str(), req.uri().path(), &client);

    metrics::increment_requests_received();
    let timer = metrics::RequestTimer::new();

    let response = next.run(req).instrument(span.clone()).await;

    let status = response.status();
    span.record("http.status_code", status.as_u16());
    span.record("duration_ms", timer.elapsed().as_millis() as u64);
    metrics::increment_responses_sent(status.as_u16());

    response
}

/// Cross-origin handling against the trusted-origin allow-list.
///
/// `Vary` always lists `Authorization` as well, since preflights and 429s
/// are answered before authentication runs. Allow headers are only added when `Origin`
/// exactly matches a trusted origin, and a preflight from such an origin is
/// answered here with an empty 200.
pub async fn cors_middleware(
    State(gatekeeper): State<Arc<Gatekeeper>>,
    req: Request,
    next: Next,
) -> Response {
    let trusted_origin = req
        .headers()
        .get(header::ORIGIN)
        .filter(|origin| {
            origin
                .to_str()
                .is_ok_and(|origin| gatekeeper.is_trusted_origin(origin))
        })
        .cloned();
    let is_preflight = req.method() == Method::OPTIONS
        && req
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);

    let mut response = match &trusted_origin {
        Some(_) if is_preflight => {
            let mut response = StatusCode::OK.into_response();
            let headers = response.headers_mut();
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(PREFLIGHT_ALLOW_METHODS),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(PREFLIGHT_ALLOW_HEADERS),
            );
            response
        }
        _ => next.run(req).await,
    };

    let headers = response.headers_mut();
    append_vary(headers, "Origin");
    append_vary(headers, "Access-Control-Request-Method");
    append_vary(headers, "Authorization");
    if let Some(origin) = trusted_origin {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }

    response
}

/// Per-client admission control keyed by the remote address without port.
pub async fn rate_limit_middleware(
    State(gatekeeper): State<Arc<Gatekeeper>>,
    req: Request,
    next: Next,
) -> Response {
    if !gatekeeper.limiter().is_enabled() {
        return next.run(req).await;
    }
    let Some(addr) = client_addr(&req) else {
        return ApiError::Fault(eyre!("client address missing from request")).into_response();
    };

    match gatekeeper.admit(addr.ip()) {
        Ok(()) => next.run(req).await,
        Err(e) => {
            tracing::debug!(client = %addr.ip(), "Rate limit exceeded");
            metrics::increment_rate_limited();
            e.into_response()
        }
    }
}

/// Resolve the bearer credential and bind the principal to the request.
pub async fn authenticate_middleware(
    State(gatekeeper): State<Arc<Gatekeeper>>,
    req: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = req.into_parts();

    let mut response = match gatekeeper.authenticate(&parts.headers).await {
        Ok(principal) => {
            if let Some(id) = principal.id() {
                tracing::Span::current().record("principal_id", id);
            }
            set_principal(&mut parts.extensions, principal);
            next.run(Request::from_parts(parts, body)).await
        }
        Err(e) => {
            if matches!(e, ApiError::InvalidAuthenticationToken) {
                metrics::increment_authentication_failures();
            }
            e.into_response()
        }
    };

    append_vary(response.headers_mut(), "Authorization");
    response
}

/// Route-level authorization gate.
pub async fn gate_middleware(
    State((gatekeeper, gate)): State<(Arc<Gatekeeper>, Gate)>,
    req: Request,
    next: Next,
) -> Response {
    let (parts, body) = req.into_parts();

    let verdict = match context::principal(&parts.extensions) {
        Ok(principal) => gatekeeper.authorize(&gate, principal).await,
        Err(e) => Err(ApiError::from(e)),
    };

    match verdict {
        Ok(()) => next.run(Request::from_parts(parts, body)).await,
        Err(e) => {
            tracing::debug!(%gate, error = %e, "Authorization gate rejected request");
            e.into_response()
        }
    }
}
