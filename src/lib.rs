pub mod cli;
pub mod config;
pub mod identity;
pub mod ishare;
pub mod pacing;
pub mod party;
pub mod satellite;
pub mod transform;
pub mod verification;
pub mod workflow;

/// Installs the stderr log subscriber used by the binaries. `RUST_LOG`
/// overrides the default `info` level.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
