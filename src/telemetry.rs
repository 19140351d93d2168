use crate::config::ObservabilityConfig;
use anyhow::{anyhow, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Initialize structured logging.
///
/// Logs go to stderr so command output on stdout stays clean. `RUST_LOG`
/// takes precedence over the configured level. JSON output carries
/// the current span and span list so every line of an action can be joined on
/// its correlation id.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| anyhow!("invalid log level '{}': {}", config.log_level, e))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    result.map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))?;

    tracing::info!("Boulder telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking the log lines of one action
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span wrapping one dispatched lifecycle action
pub fn create_action_span(action: &str, slug: &str, correlation_id: &str) -> tracing::Span {
    tracing::info_span!(
        "lifecycle_action",
        action = action,
        slug = slug,
        correlation.id = correlation_id,
    )
}

pub fn shutdown_telemetry() {
    tracing::info!("Boulder telemetry shutdown complete");
}
