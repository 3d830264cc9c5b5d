use std::env;
use tracing::Level;
use tracing_subscriber::{filter::Targets, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/**
 * Sets `RUST_BACKTRACE=1` as default so we always get a stacktrace
 * on an error.
 */
pub(crate) fn set_full_stacktrace_as_default() {
    let key = "RUST_BACKTRACE";
    if env::var(key).is_ok() {
        return;
    }
    env::set_var(key, "1");
}

/// Installs the global tracing subscriber.
/// `RUST_LOG` takes precedence over the verbose flag.
pub(crate) fn enable_logging(verbose: bool) {
    let value = env::var("RUST_LOG").unwrap_or_default();

    if !value.is_empty() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
        tracing::info!("Used RUST_LOG={} env variable to set logging output.", value);
        if verbose {
            tracing::warn!("RUST_LOG= is set. Ignore --verbose flag.")
        }
        return;
    }

    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter: Targets = Targets::new().with_target("cachedns", level);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    if verbose {
        tracing::info!("Verbose mode enabled.");
    }
}

/// Resolves once the user pressed Ctrl-C.
pub(crate) async fn wait_on_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("Failed to listen for Ctrl-C. {e}");
    }
}
