//! Logging configuration using tracing
//!
//! Structured logging to stderr, plus an optional log file, filtered by the
//! RUST_LOG environment variable.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when RUST_LOG is unset
pub const DEFAULT_FILTER: &str = "warn,eventsync=info";

/// Initialize the tracing subscriber
///
/// Sets up:
/// - Filtering via RUST_LOG (defaults to [`DEFAULT_FILTER`])
/// - Formatted output to stderr with target and line numbers
/// - When `log_file` is given, a plain-text copy of the same output. The
///   file is truncated first, so it always holds exactly one run.
///
/// # Example RUST_LOG values
/// - `RUST_LOG=eventsync=debug` - Show mapping details
/// - `RUST_LOG=eventsync=debug,redmine=trace` - Different levels per crate
///
/// # Errors
/// Returns an error if the log file cannot be created or the subscriber has
/// already been initialized
pub fn init(log_file: Option<&Path>) -> crate::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = File::create(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_line_number(true)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| {
            crate::EventSyncError::Other(format!("Failed to initialize tracing: {}", e))
        })?;

    Ok(())
}

/// Initialize logging for tests (no-op if already initialized)
pub fn init_test() {
    let _ = init(None);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_helper() {
        // Should never panic
        init_test();
        init_test();
    }

    #[test]
    fn test_unwritable_log_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a log file
        assert!(init(Some(dir.path())).is_err());
    }

    #[test]
    fn test_logging_macros() {
        init_test();

        tracing::debug!(issue_id = 1, "debug message");
        tracing::info!(issue_id = 1, url = "https://example.org/issues/1", "info message");
        tracing::warn!("warning message");
    }
}
