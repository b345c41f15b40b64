use request_trace::tracing::{init_tracing, LogFormat};
use tracing_subscriber::registry;

// Runs in its own test binary, so the host subscriber below is the first one installed.
#[test]
fn init_tolerates_a_host_subscriber() {
    tracing::subscriber::set_global_default(registry()).unwrap();

    init_tracing("debug", LogFormat::Json);
    init_tracing("info", LogFormat::Text);
    tracing::info!("still logging through the host subscriber");
}
