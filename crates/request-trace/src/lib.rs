//! Request correlation and trace recording.
//!
//! [`CorrelationTracer`] decides the `x-request-id` of a request,
//! [`RequestTraceRecorder`] keeps its start, service hits and end, and
//! [`tracing::init_tracing`] installs the process-wide subscriber.

pub mod correlation;
pub mod recorder;
pub mod sink;
pub mod tracing;

pub use correlation::{inbound_value, CorrelationTracer, REQUEST_ID_HEADER};
pub use recorder::{RequestTraceRecorder, TraceKey, TraceRecord};
pub use sink::{NoopTraceSink, SinkError, TraceEvent, TraceSink, TracingTraceSink};
