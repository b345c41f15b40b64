use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tenantgate_core_types::{CorrelationId, ProjectId, ServiceName};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::sink::{TraceEvent, TraceSink, TracingTraceSink};

/// Recorder-assigned identity of one traced request. Clients may reuse an
/// `x-request-id`; keys are never reused within a recorder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TraceKey(u64);

impl fmt::Display for TraceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub struct TraceRecord {
    pub correlation_id: CorrelationId,
    pub project_id: Option<ProjectId>,
    pub path: String,
    pub method: String,
    pub started_at: DateTime<Utc>,
    pub service_hits: Vec<ServiceName>,
    pub ended_at: Option<DateTime<Utc>>,
    started: Instant,
}

impl TraceRecord {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// In-flight trace records keyed by [`TraceKey`].
///
/// Nothing here ever fails the request: unknown keys are ignored and sink
/// errors are logged from a detached task.
pub struct RequestTraceRecorder {
    records: DashMap<TraceKey, TraceRecord>,
    next_key: AtomicU64,
    sink: Arc<dyn TraceSink>,
}

impl Default for RequestTraceRecorder {
    fn default() -> Self {
        Self::new(Arc::new(TracingTraceSink))
    }
}

impl RequestTraceRecorder {
    pub fn new(sink: Arc<dyn TraceSink>) -> Self {
        Self {
            records: DashMap::new(),
            next_key: AtomicU64::new(1),
            sink,
        }
    }

    pub fn start(
        &self,
        correlation: &CorrelationId,
        project_id: Option<ProjectId>,
        path: &str,
        method: &str,
    ) -> TraceKey {
        let key = TraceKey(self.next_key.fetch_add(1, Ordering::Relaxed));
        let started_at = Utc::now();
        let record = TraceRecord {
            correlation_id: correlation.clone(),
            project_id,
            path: path.to_string(),
            method: method.to_string(),
            started_at,
            service_hits: Vec::new(),
            ended_at: None,
            started: Instant::now(),
        };
        self.records.insert(key, record);
        self.dispatch(
            correlation,
            TraceEvent::Started {
                project_id: project_id.map(|id| id.to_string()),
                method: method.to_string(),
                path: path.to_string(),
                at: started_at,
            },
        );
        key
    }

    pub fn log_service_hit(&self, key: TraceKey, service: ServiceName) {
        let correlation = match self.records.get_mut(&key) {
            Some(mut record) => {
                record.service_hits.push(service);
                record.correlation_id.clone()
            }
            None => {
                debug!(target: "request-trace", trace_key = %key, "service hit without trace");
                return;
            }
        };
        self.dispatch(
            &correlation,
            TraceEvent::ServiceHit {
                service,
                at: Utc::now(),
            },
        );
    }

    /// Attributes a hit to the service owning `path`.
    pub fn log_path_hit(&self, key: TraceKey, path: &str) {
        self.log_service_hit(key, ServiceName::from_path(path));
    }

    /// Closes the record and returns it. `None` when no trace was started.
    pub fn end(&self, key: TraceKey) -> Option<TraceRecord> {
        let (_, mut record) = self.records.remove(&key)?;
        let ended_at = Utc::now();
        record.ended_at = Some(ended_at);
        self.dispatch(
            &record.correlation_id,
            TraceEvent::Ended {
                duration_ms: record.elapsed().as_millis() as u64,
                service_hits: record.service_hits.clone(),
                at: ended_at,
            },
        );
        Some(record)
    }

    pub fn snapshot(&self, key: TraceKey) -> Option<TraceRecord> {
        self.records.get(&key).map(|record| record.clone())
    }

    pub fn in_flight(&self) -> usize {
        self.records.len()
    }

    /// Drops records older than `max_age` that never ended. Returns how many were dropped.
    pub fn prune_stale(&self, max_age: Duration) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.elapsed() <= max_age);
        let pruned = before.saturating_sub(self.records.len());
        if pruned > 0 {
            debug!(target: "request-trace", pruned, "pruned unfinished traces");
        }
        pruned
    }

    fn dispatch(&self, correlation: &CorrelationId, event: TraceEvent) {
        let Ok(handle) = Handle::try_current() else {
            debug!(target: "request-trace", request_id = %correlation, "no runtime, trace event dropped");
            return;
        };
        let sink = Arc::clone(&self.sink);
        let correlation = correlation.clone();
        handle.spawn(async move {
            if let Err(err) = sink.write(&correlation, &event).await {
                warn!(
                    target: "request-trace",
                    request_id = %correlation,
                    error = %err,
                    "trace sink write failed"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NoopTraceSink;

    fn recorder() -> RequestTraceRecorder {
        RequestTraceRecorder::new(Arc::new(NoopTraceSink))
    }

    #[test]
    fn works_without_a_runtime() {
        let recorder = recorder();
        let id = CorrelationId("req-1".into());
        let key = recorder.start(&id, None, "/v1/db/query", "POST");
        recorder.log_path_hit(key, "/v1/db/query");
        let record = recorder.end(key).unwrap();
        assert_eq!(record.service_hits, vec![ServiceName::Database]);
        assert!(record.ended_at.is_some());
        assert_eq!(recorder.in_flight(), 0);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let recorder = recorder();
        let key = recorder.start(&CorrelationId("once".into()), None, "/v1/db/query", "POST");
        assert!(recorder.end(key).is_some());
        recorder.log_service_hit(key, ServiceName::Storage);
        assert!(recorder.end(key).is_none());
    }

    #[test]
    fn reused_request_ids_keep_separate_records() {
        let recorder = recorder();
        let id = CorrelationId("client-reused".into());
        let first = recorder.start(&id, None, "/v1/db/query", "POST");
        let second = recorder.start(&id, None, "/v1/storage/paths", "POST");
        assert_ne!(first, second);
        assert_eq!(recorder.in_flight(), 2);

        recorder.log_service_hit(second, ServiceName::Storage);
        let ended = recorder.end(first).unwrap();
        assert!(ended.service_hits.is_empty());
        assert_eq!(ended.path, "/v1/db/query");

        let survivor = recorder.snapshot(second).unwrap();
        assert_eq!(survivor.correlation_id, id);
        assert_eq!(survivor.service_hits, vec![ServiceName::Storage]);
    }

    #[test]
    fn prune_drops_only_old_records() {
        let recorder = recorder();
        let id = CorrelationId("req-stale".into());
        let key = recorder.start(&id, None, "/v1/storage/paths", "POST");
        assert_eq!(recorder.prune_stale(Duration::from_secs(60)), 0);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(recorder.prune_stale(Duration::from_millis(1)), 1);
        assert!(recorder.snapshot(key).is_none());
    }
}
