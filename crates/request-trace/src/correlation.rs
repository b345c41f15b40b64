use http::{HeaderMap, HeaderValue};
use tenantgate_core_types::CorrelationId;
use tracing::warn;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Picks the correlation id for a request and stamps it back onto the response.
#[derive(Clone, Copy, Debug, Default)]
pub struct CorrelationTracer;

impl CorrelationTracer {
    /// Reuses a non-empty inbound `x-request-id`, otherwise generates a v4 id.
    ///
    /// Bytes that are not UTF-8 are replaced in the returned id, which only
    /// feeds logs and traces. [`stamp_echo`](Self::stamp_echo) sends the
    /// original header back unchanged.
    pub fn obtain(&self, headers: &HeaderMap) -> CorrelationId {
        inbound_value(headers)
            .map(|value| CorrelationId(String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .unwrap_or_else(CorrelationId::new)
    }

    /// Echoes a non-empty `inbound` header as received, or stamps `correlation`.
    pub fn stamp_echo(
        &self,
        headers: &mut HeaderMap,
        inbound: Option<&HeaderValue>,
        correlation: &CorrelationId,
    ) {
        match inbound.filter(|value| !value.is_empty()) {
            Some(value) => {
                headers.insert(REQUEST_ID_HEADER, value.clone());
            }
            None => self.stamp(headers, correlation),
        }
    }

    pub fn stamp(&self, headers: &mut HeaderMap, correlation: &CorrelationId) {
        match HeaderValue::from_bytes(correlation.as_str().as_bytes()) {
            Ok(value) => {
                headers.insert(REQUEST_ID_HEADER, value);
            }
            Err(err) => {
                warn!(
                    target: "request-trace",
                    request_id = %correlation,
                    error = %err,
                    "correlation id is not a valid header value"
                );
            }
        }
    }
}

/// The inbound `x-request-id`, unless it is missing or empty.
pub fn inbound_value(headers: &HeaderMap) -> Option<&HeaderValue> {
    headers
        .get(REQUEST_ID_HEADER)
        .filter(|value| !value.is_empty())
}
