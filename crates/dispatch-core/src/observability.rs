//! Observability infrastructure for the dispatcher.
//!
//! Structured logging with consistent spans. Provides initialization helpers
//! and span constructors shared by every action.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Mutex, Once};

use tracing::Span;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for log shippers).
    Json,
    /// Single-line human readable logs.
    #[default]
    Pretty,
}

/// Logging settings collected from the command line.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Level directive (`info`, `debug`, `dispatch_engine=trace`) or a legacy
    /// numeric level (`4` info, `5` debug, `6`..`8` trace).
    pub level: Option<String>,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Translates a level argument into an `EnvFilter` directive.
///
/// Numeric levels come from the historical dispatcher scripts.
#[must_use]
pub fn level_directive(raw: &str) -> String {
    match raw.trim().parse::<u8>() {
        Ok(0..=4) => "info".to_string(),
        Ok(5) => "debug".to_string(),
        Ok(_) => "trace".to_string(),
        Err(_) => raw.trim().to_string(),
    }
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// `RUST_LOG` takes precedence over the configured level. When the log file
/// cannot be opened, output falls back to stderr and a warning is emitted.
pub fn init_logging(config: &LoggingConfig) {
    INIT.call_once(|| {
        let directive = config
            .level
            .as_deref()
            .map_or_else(|| "info".to_string(), level_directive);
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&directive))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let mut file_error = None;
        let (writer, ansi) = match &config.file {
            Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => (BoxMakeWriter::new(Mutex::new(file)), false),
                Err(err) => {
                    file_error = Some((path.clone(), err));
                    (BoxMakeWriter::new(std::io::stderr), true)
                }
            },
            None => (BoxMakeWriter::new(std::io::stderr), true),
        };

        match config.format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json().with_writer(writer))
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        fmt::layer()
                            .with_target(false)
                            .with_ansi(ansi)
                            .with_writer(writer),
                    )
                    .init();
            }
        }

        if let Some((path, err)) = file_error {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "cannot open log file, logging to stderr"
            );
        }
    });
}

/// Creates the root span for one action invocation.
///
/// `label` is the free-form log label passed on the command line.
///
/// # Example
///
/// ```rust
/// use dispatch_core::observability::action_span;
///
/// let span = action_span("s3Upload", "pod-a");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn action_span(action: &str, label: &str) -> Span {
    tracing::info_span!(
        "dispatch",
        action = action,
        label = label,
        pid = std::process::id(),
    )
}

/// Creates a span for the work done on one ticket file.
#[must_use]
pub fn ticket_span(stage: &str, file: &str) -> Span {
    tracing::info_span!("ticket", stage = stage, file = file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_directive_maps_legacy_numbers() {
        assert_eq!(level_directive("4"), "info");
        assert_eq!(level_directive("5"), "debug");
        assert_eq!(level_directive("7"), "trace");
        assert_eq!(level_directive(" warn "), "warn");
        assert_eq!(level_directive("dispatch_engine=debug"), "dispatch_engine=debug");
    }

    #[test]
    fn test_init_logging_succeeds() {
        let config = LoggingConfig::default();
        // Should not panic (uses Once internally)
        init_logging(&config);
        init_logging(&config);
    }

    #[test]
    fn test_spans_create() {
        let span = action_span("kafkaUpload", "test");
        let _guard = span.enter();
        let inner = ticket_span("kafka", "batch1.txt");
        let _inner = inner.enter();
        tracing::info!("message in span");
    }
}
