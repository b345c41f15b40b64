use std::fmt;
use std::str::FromStr;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tenantgate_core_types::CorrelationId;
use tracing::{debug, info_span, Span};
use tracing_subscriber::{fmt as fmt_layer, layer::SubscriberExt, EnvFilter, Registry};

static INIT: OnceCell<()> = OnceCell::new();

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

/// Installs the global subscriber once. `RUST_LOG` wins over `level` when set.
pub fn init_tracing(level: &str, format: LogFormat) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let result = match format {
            LogFormat::Text => {
                let layer = fmt_layer::layer().with_target(true).with_thread_ids(true);
                tracing::subscriber::set_global_default(
                    Registry::default().with(filter).with(layer),
                )
            }
            LogFormat::Json => {
                let layer = fmt_layer::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false);
                tracing::subscriber::set_global_default(
                    Registry::default().with(filter).with(layer),
                )
            }
        };
        // Another subscriber may already be installed by a test harness or host.
        if let Err(err) = result {
            debug!(target: "request-trace", error = %err, "global subscriber already set");
        }
    });
}

/// Span wrapping the whole lifetime of one gateway request.
pub fn request_span(correlation: &CorrelationId, method: &str, path: &str) -> Span {
    info_span!(
        "request",
        request_id = %correlation,
        method = %method,
        path = %path,
        project_id = tracing::field::Empty,
    )
}

pub fn record_project(span: &Span, project_id: &str) {
    span.record("project_id", project_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_tracing("debug", LogFormat::Text);
        init_tracing("info", LogFormat::Json);
        let id = CorrelationId("req-span".into());
        let span = request_span(&id, "GET", "/healthz");
        record_project(&span, "11111111-1111-1111-1111-111111111111");
        span.in_scope(|| tracing::info!("within request span"));
    }

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
