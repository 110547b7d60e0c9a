//! Logging setup, grounded on `arti::trace`'s console layer: an
//! `EnvFilter` driven by an explicit CLI level when given, falling back to
//! `RUST_LOG`, falling back to `info`.

use tracing_subscriber::EnvFilter;

/// Initializes the global `tracing` subscriber. Called once from `main`
/// before any handler runs, matching `arti`'s pre-config logging phase
/// (this binary has no config file to read a second, richer filter from,
/// so there's only the one phase here).
pub fn init(cli_level: Option<&str>) {
    let filter = cli_level
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
