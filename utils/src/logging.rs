//! Structured logging initialization via `tracing`.

/// Initialize the tracing subscriber with sensible defaults.
///
/// Respects the `RUST_LOG` environment variable for filtering.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}

/// Initialize with an explicit filter and output format.
///
/// `format` is "json" for machine-readable logs, anything else for the
/// human-readable default. Used by services that carry the choice in their
/// config file rather than the environment.
pub fn init_tracing_with(filter: &str, format: &str) {
    use tracing_subscriber::EnvFilter;
    let builder = tracing_subscriber::fmt().with_env_filter(
        EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info")),
    );
    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
