//! Logging setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the stderr subscriber; `RUST_LOG` overrides the `fairval=info` default.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fairval=info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
