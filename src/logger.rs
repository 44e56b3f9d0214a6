// Logging setup: a tracing subscriber writing to stderr.
// --debug forces the debug level; otherwise RUST_LOG applies, defaulting to info.

use tracing_subscriber::EnvFilter;

pub fn filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

// Install the global subscriber. Safe to call more than once; later calls are ignored.
pub fn init(debug: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(debug))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
