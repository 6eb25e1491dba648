//! axum middleware running the gate in front of every route.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::gate::{Decision, GateRequest, RateLimitInfo, RequestGate};

/// Body of a 429 response.
pub const TOO_MANY_REQUESTS_BODY: &str = "Too Many Requests";

/// Gate every request except static assets.
///
/// Install with `axum::middleware::from_fn_with_state(gate, gate_middleware)`.
pub async fn gate_middleware(
    State(gate): State<Arc<RequestGate>>,
    request: Request,
    next: Next,
) -> Response {
    if gate.routes().is_excluded(request.uri().path()) {
        return next.run(request).await;
    }

    // The body is not `Sync`, so only the head is borrowed across the await.
    let (parts, body) = request.into_parts();
    let verdict = gate
        .evaluate(&GateRequest {
            method: &parts.method,
            path: parts.uri.path(),
            headers: &parts.headers,
        })
        .await;

    let mut response = match verdict.decision {
        Decision::Allow => next.run(Request::from_parts(parts, body)).await,
        Decision::RejectTooManyRequests => {
            (StatusCode::TOO_MANY_REQUESTS, TOO_MANY_REQUESTS_BODY).into_response()
        }
        Decision::RedirectToSignIn { location } | Decision::RedirectToApp { location } => {
            redirect(&location)
        }
    };

    if let Some(info) = verdict.rate_limit {
        apply_rate_limit_headers(response.headers_mut(), &info);
    }

    response
}

/// A plain 302 to `location`.
fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(e) => {
            warn!(error = %e, "Redirect location is not a valid header value");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Write the `X-RateLimit-*` headers, replacing any set downstream.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, info: &RateLimitInfo) {
    for (name, value) in info.headers() {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}
