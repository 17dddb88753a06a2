use std::time::Instant;

use axum::{
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{Instrument, info, info_span};

use crate::context::RequestId;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Wrap every request in a span carrying a fresh request id, and echo the id
/// back in `x-request-id`.
pub async fn trace_requests(mut req: Request<axum::body::Body>, next: Next) -> Response {
    let request_id = RequestId::new();
    req.extensions_mut().insert(request_id);

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    let started = Instant::now();

    let mut response = next.run(req).instrument(span.clone()).await;

    span.in_scope(|| {
        info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );
    });
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
