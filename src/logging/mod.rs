pub mod ndjson;

use tracing_subscriber::EnvFilter;

pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Installs the stderr subscriber. Level comes from `LOG_LEVEL` unless
/// `verbose` forces debug output.
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_LEVEL_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
