use crate::config::TelemetryConfig;
use crate::workflows::triage::AUDIT_TARGET;
use std::fmt;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
pub enum TelemetryError {
    EnvFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::EnvFilter { value, .. } => {
                write!(f, "invalid log filter '{value}'")
            }
            TelemetryError::Subscriber(err) => write!(f, "telemetry error: {err}"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::EnvFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

/// Builds the event filter for a run.
///
/// `rust_log` (the `RUST_LOG` value) wins over the configured level. Audit
/// records on [`AUDIT_TARGET`] stay enabled at `info` either way.
pub fn event_filter(
    config: &TelemetryConfig,
    rust_log: Option<&str>,
) -> Result<EnvFilter, TelemetryError> {
    let base = rust_log
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(&config.log_level);
    let filter = EnvFilter::try_new(base).map_err(|source| TelemetryError::EnvFilter {
        value: base.to_string(),
        source,
    })?;

    let audit = format!("{AUDIT_TARGET}=info");
    let directive = audit
        .parse()
        .map_err(|source| TelemetryError::EnvFilter {
            value: audit.clone(),
            source,
        })?;
    Ok(filter.add_directive(directive))
}

/// Install the global subscriber: compact, no ANSI, on stderr so CLI output stays clean.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let env_filter = event_filter(config, rust_log.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_targets)
        .compact()
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}
