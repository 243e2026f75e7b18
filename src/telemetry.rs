use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` for this crate when
/// `verbose` is on. Safe to call more than once.
pub fn init(verbose: bool) {
    let default = if verbose { "info,qrpark=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_timer(fmt::time::uptime())
                .with_filter(filter),
        )
        .try_init();
}
