use crate::config::{LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const METRICS_PREFIX: &str = "catalog";

#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("invalid sentry dsn: {0}")]
    InvalidDsn(#[from] sentry::types::ParseDsnError),
    #[error("could not build statsd exporter: {0}")]
    Statsd(#[from] metrics_exporter_statsd::StatsdError),
    #[error("a metrics recorder is already installed")]
    RecorderInstalled,
}

/// Installs the global tracing subscriber. When a Sentry DSN is configured,
/// Sentry is initialised and error events are forwarded to it; the returned
/// guard must be kept alive for the lifetime of the process.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<sentry::ClientInitGuard>, TelemetryError> {
    let guard = match config.sentry_dsn.as_deref() {
        Some(dsn) => Some(sentry::init(sentry::ClientOptions {
            dsn: Some(dsn.parse::<sentry::types::Dsn>()?),
            release: sentry::release_name!(),
            ..Default::default()
        })),
        None => None,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    Ok(guard)
}

pub fn init_metrics(config: &MetricsConfig) -> Result<(), TelemetryError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(METRICS_PREFIX))?;
    metrics::set_global_recorder(recorder).map_err(|_| TelemetryError::RecorderInstalled)?;

    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "Sending metrics to statsd"
    );
    Ok(())
}
