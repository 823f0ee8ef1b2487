use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber. An invalid filter falls back to
/// `info`. Returns `false` when a subscriber was already installed.
pub fn init_tracing(filter: &str) -> bool {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
