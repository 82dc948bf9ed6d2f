use tracing_subscriber::EnvFilter;

use frontdesk_core::config::{LogFormat, LoggingConfig};

/// Installs the global subscriber. `RUST_LOG` wins over the configured
/// level when set.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|error| anyhow::anyhow!("installing the tracing subscriber: {error}"))
}
