use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use request_trace::inbound_value;
use request_trace::tracing::{record_project, request_span};
use tenantgate_core_types::{CorrelationId, GateError};
use tracing::{debug, Instrument, Span};

use super::state::AppState;
use crate::auth::extract_api_key;
use crate::errors::HttpError;
use crate::gateway::RequestContext;

/// Outermost layer. Every response, errors included, carries `x-request-id`.
pub async fn correlation_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let tracer = state.tracer();
    let correlation = tracer.obtain(req.headers());
    let inbound = inbound_value(req.headers()).cloned();
    let span = request_span(&correlation, req.method().as_str(), req.uri().path());
    req.extensions_mut().insert(correlation.clone());

    let mut response = next.run(req).instrument(span).await;
    tracer.stamp_echo(response.headers_mut(), inbound.as_ref(), &correlation);
    response
}

/// Resolves the caller and brackets the request with a trace record.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, HttpError> {
    let correlation = req
        .extensions()
        .get::<CorrelationId>()
        .cloned()
        .unwrap_or_else(|| state.tracer().obtain(req.headers()));

    let api_key = extract_api_key(req.headers()).ok_or(GateError::KeyInvalid)?;
    let principal = state.authenticator().authenticate(&api_key).await?;
    record_project(&Span::current(), &principal.project_id.to_string());

    let recorder = Arc::clone(state.gateway().recorder());
    let trace = recorder.start(
        &correlation,
        Some(principal.project_id),
        req.uri().path(),
        req.method().as_str(),
    );
    req.extensions_mut()
        .insert(RequestContext::traced(correlation, trace));
    req.extensions_mut().insert(principal);

    let response = next.run(req).await;
    if let Some(record) = recorder.end(trace) {
        debug!(
            status = response.status().as_u16(),
            duration_ms = record.elapsed().as_millis() as u64,
            service_hits = record.service_hits.len(),
            "request traced"
        );
    }
    Ok(response)
}
