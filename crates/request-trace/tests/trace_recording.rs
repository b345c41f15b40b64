use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use request_trace::{RequestTraceRecorder, SinkError, TraceEvent, TraceSink};
use tenantgate_core_types::{CorrelationId, ProjectId, ServiceName};

#[derive(Default)]
struct CollectingSink {
    events: Mutex<Vec<(String, TraceEvent)>>,
}

#[async_trait]
impl TraceSink for CollectingSink {
    async fn write(&self, correlation: &CorrelationId, event: &TraceEvent) -> Result<(), SinkError> {
        self.events
            .lock()
            .push((correlation.to_string(), event.clone()));
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl TraceSink for FailingSink {
    async fn write(&self, _correlation: &CorrelationId, _event: &TraceEvent) -> Result<(), SinkError> {
        Err(SinkError::Unavailable("audit store offline".into()))
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn events_reach_the_sink_in_request_order() {
    let sink = Arc::new(CollectingSink::default());
    let recorder = RequestTraceRecorder::new(sink.clone());
    let id = CorrelationId("req-order".into());
    let project = ProjectId::new_random();

    let key = recorder.start(&id, Some(project), "/v1/storage/paths", "POST");
    settle().await;
    recorder.log_service_hit(key, ServiceName::Storage);
    settle().await;
    let record = recorder.end(key).unwrap();
    settle().await;

    assert_eq!(record.project_id, Some(project));
    let events = sink.events.lock();
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|(rid, _)| rid == "req-order"));
    assert!(matches!(events[0].1, TraceEvent::Started { .. }));
    assert!(matches!(
        events[1].1,
        TraceEvent::ServiceHit {
            service: ServiceName::Storage,
            ..
        }
    ));
    match &events[2].1 {
        TraceEvent::Ended { service_hits, .. } => {
            assert_eq!(service_hits, &vec![ServiceName::Storage])
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn sink_failures_never_reach_the_caller() {
    let recorder = RequestTraceRecorder::new(Arc::new(FailingSink));
    let id = CorrelationId::new();

    let key = recorder.start(&id, None, "/v1/db/query", "POST");
    recorder.log_path_hit(key, "/v1/db/query");
    let record = recorder.end(key).unwrap();
    settle().await;

    assert_eq!(record.service_hits, vec![ServiceName::Database]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_keep_separate_records() {
    let recorder = Arc::new(RequestTraceRecorder::new(Arc::new(CollectingSink::default())));

    let tasks = (0..16).map(|n| {
        let recorder = Arc::clone(&recorder);
        tokio::spawn(async move {
            // half the tasks share one client-supplied id
            let id = CorrelationId(format!("req-{}", n % 2));
            let project = ProjectId::new_random();
            let service = if n % 2 == 0 {
                ServiceName::Database
            } else {
                ServiceName::Realtime
            };
            let key = recorder.start(&id, Some(project), "/v1/any", "GET");
            for _ in 0..n {
                recorder.log_service_hit(key, service);
                tokio::task::yield_now().await;
            }
            let record = recorder.end(key).unwrap();
            (n, project, service, record)
        })
    });

    for task in tasks.collect::<Vec<_>>() {
        let (n, project, service, record) = task.await.unwrap();
        assert_eq!(record.project_id, Some(project));
        assert_eq!(record.service_hits.len(), n);
        assert!(record.service_hits.iter().all(|hit| *hit == service));
    }
    assert_eq!(recorder.in_flight(), 0);
}
