use std::{error::Error, io};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// install the global stderr subscriber, `RUST_LOG` takes precedence over `verbose`
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // a second init (e.g. from tests) is not an error worth reporting
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// log an error together with its chain of causes
pub fn report(error: &(dyn Error + 'static)) {
    error!("{error}");

    let mut source = error.source();
    while let Some(cause) = source {
        error!("  caused by: {cause}");
        source = cause.source();
    }
}
