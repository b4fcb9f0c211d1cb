use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with env filter.
///
/// `RUST_LOG` wins over `default_level` when set. Safe to call more than
/// once; later calls are ignored.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
