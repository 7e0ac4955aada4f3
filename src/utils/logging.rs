//! Logging initialization for artifactd.
//!
//! Supports three formats:
//! - `pretty`: default tracing pretty-print (human-readable, coloured)
//! - `component`: `[timestamp] [LEVEL] target message {fields}`, compact and grep-friendly;
//!   use the [`log_component!`] macro to add a `component` field for per-scanner filtering
//! - `json`: structured JSON lines for log aggregators

use std::fs::OpenOptions;
use std::sync::Arc;

use crate::config::{LogFormat, LoggingConfig};

/// Initialize the global tracing subscriber from config.
///
/// Call this once at startup before any tracing events are emitted.
/// Falls back to `RUST_LOG` env var; if unset, uses `cfg.level`. A log file
/// that cannot be opened is reported on stderr and logging stays on stderr.
pub fn init_logging(cfg: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    let file = cfg.file.as_ref().and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(Arc::new(file)),
            Err(e) => {
                eprintln!("Failed to open log file {}: {}", path, e);
                None
            }
        }
    });

    match (&cfg.format, file) {
        (LogFormat::Json, Some(file)) => {
            let _ = tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(file)
                .try_init();
        }
        (LogFormat::Json, None) => {
            let _ = tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        }
        (LogFormat::Pretty, Some(file)) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(file)
                .try_init();
        }
        (LogFormat::Pretty, None) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        }
        // Component-tagged events are emitted via the `log_component!` macro
        // which adds a structured `component` field.
        (LogFormat::Component, Some(file)) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_ansi(false)
                .compact()
                .with_writer(file)
                .try_init();
        }
        (LogFormat::Component, None) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .compact()
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}

/// Emit a component-tagged tracing event.
///
/// Works with any tracing level (`trace`, `debug`, `info`, `warn`, `error`).
/// The `component` field makes it easy to grep logs by subsystem:
///
/// ```
/// # use artifactd::log_component;
/// log_component!(info, "bootstrap", "scanner started");
/// log_component!(warn, "scanner", "install failed", attempts = 3u64);
/// ```
#[macro_export]
macro_rules! log_component {
    ($level:ident, $component:expr, $msg:expr) => {
        tracing::$level!(component = $component, $msg)
    };
    ($level:ident, $component:expr, $msg:expr, $($key:ident = $val:expr),+ $(,)?) => {
        tracing::$level!(component = $component, $($key = $val,)+ $msg)
    };
}

#[cfg(test)]
mod tests {
    use super::init_logging;
    use crate::config::{LogFormat, LoggingConfig};

    #[test]
    fn test_component_format_is_default() {
        let cfg = LoggingConfig::default();
        assert_eq!(cfg.format, LogFormat::Component);
        assert_eq!(cfg.level, "info");
        assert!(cfg.file.is_none());
    }

    #[test]
    fn test_logging_section_from_json() {
        let cfg: LoggingConfig = serde_json::from_str(
            r#"{"format":"json","level":"artifactd=debug","file":"/var/log/artifactd.log"}"#,
        )
        .unwrap();
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.level, "artifactd=debug");
        assert_eq!(cfg.file.as_deref(), Some("/var/log/artifactd.log"));
    }

    #[test]
    fn test_log_format_names_are_lowercase() {
        assert_eq!(serde_json::to_string(&LogFormat::Pretty).unwrap(), r#""pretty""#);
        assert!(serde_json::from_str::<LogFormat>(r#""Json""#).is_err());
    }

    #[test]
    fn test_unopenable_log_file_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = LoggingConfig {
            file: Some(dir.path().join("missing").join("a.log").display().to_string()),
            ..LoggingConfig::default()
        };
        init_logging(&cfg);
        // A second initialization is ignored.
        init_logging(&LoggingConfig::default());
        crate::log_component!(debug, "logging", "still alive", attempt = 2u64);
    }
}
