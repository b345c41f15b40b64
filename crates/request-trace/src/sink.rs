use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tenantgate_core_types::{CorrelationId, ServiceName};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("trace sink unavailable: {0}")]
    Unavailable(String),
    #[error("trace sink rejected event: {0}")]
    Rejected(String),
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    Started {
        project_id: Option<String>,
        method: String,
        path: String,
        at: DateTime<Utc>,
    },
    ServiceHit {
        service: ServiceName,
        at: DateTime<Utc>,
    },
    Ended {
        duration_ms: u64,
        service_hits: Vec<ServiceName>,
        at: DateTime<Utc>,
    },
}

/// Destination for trace events. Writes are best-effort.
#[async_trait]
pub trait TraceSink: Send + Sync {
    async fn write(&self, correlation: &CorrelationId, event: &TraceEvent) -> Result<(), SinkError>;
}

/// Emits every event as a structured `tracing` record.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingTraceSink;

#[async_trait]
impl TraceSink for TracingTraceSink {
    async fn write(&self, correlation: &CorrelationId, event: &TraceEvent) -> Result<(), SinkError> {
        match event {
            TraceEvent::Started {
                project_id,
                method,
                path,
                ..
            } => info!(
                target: "request-trace",
                request_id = %correlation,
                project_id = project_id.as_deref(),
                method = %method,
                path = %path,
                "trace started"
            ),
            TraceEvent::ServiceHit { service, .. } => info!(
                target: "request-trace",
                request_id = %correlation,
                service = %service,
                "service hit"
            ),
            TraceEvent::Ended {
                duration_ms,
                service_hits,
                ..
            } => info!(
                target: "request-trace",
                request_id = %correlation,
                duration_ms,
                hits = service_hits.len(),
                "trace ended"
            ),
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTraceSink;

#[async_trait]
impl TraceSink for NoopTraceSink {
    async fn write(&self, _correlation: &CorrelationId, _event: &TraceEvent) -> Result<(), SinkError> {
        Ok(())
    }
}
