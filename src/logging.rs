//! Tracing configuration and log routing.
//!
//! Logs go to stdout through a compact formatter and to a file. When `DOCQA_LOG_FILE` is set,
//! logs are appended to that path; otherwise a file logger is created under `logs/docqa.log`.
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_ENV: &str = "DOCQA_LOG_FILE";
/// Applied when `RUST_LOG` is unset: service events at `info`, chatty HTTP internals at `warn`.
const DEFAULT_DIRECTIVES: &str = "info,docqa=info,tower_http=warn,hyper=warn,reqwest=warn";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "docqa.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Configure tracing subscribers for stdout and file logging.
///
/// - Respects `RUST_LOG` for filtering, falling back to `DEFAULT_DIRECTIVES`.
/// - Installs a compact stdout layer and, when available, a file layer.
/// - Keeps the non-blocking writer guard alive for the process lifetime.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let target = log_file_target();
    if let Some(writer) = configure_file_writer(&target) {
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact();

        registry.with(file_layer).init();
    } else {
        registry.init();
    }
}

/// Where the file layer writes: an explicit path, or the rolling default under `logs/`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LogFileTarget {
    Explicit(PathBuf),
    Default,
}

fn log_file_target() -> LogFileTarget {
    match std::env::var(LOG_FILE_ENV) {
        Ok(path) if !path.trim().is_empty() => LogFileTarget::Explicit(PathBuf::from(path)),
        _ => LogFileTarget::Default,
    }
}

/// Returns `None` when the log directory cannot be created or the target file cannot be opened.
fn configure_file_writer(target: &LogFileTarget) -> Option<NonBlocking> {
    let (non_blocking, guard) = match target {
        LogFileTarget::Explicit(path) => {
            if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                if let Err(err) = std::fs::create_dir_all(parent) {
                    eprintln!("Failed to create log directory {}: {err}", parent.display());
                    return None;
                }
            }
            match std::fs::OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => tracing_appender::non_blocking(file),
                Err(err) => {
                    eprintln!("Failed to open log file {}: {err}", path.display());
                    return None;
                }
            }
        }
        LogFileTarget::Default => {
            if let Err(err) = std::fs::create_dir_all(DEFAULT_LOG_DIR) {
                eprintln!("Failed to create logs directory: {err}");
                return None;
            }
            tracing_appender::non_blocking(tracing_appender::rolling::never(
                DEFAULT_LOG_DIR,
                DEFAULT_LOG_FILE,
            ))
        }
    };
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_parse() {
        assert!(EnvFilter::try_new(DEFAULT_DIRECTIVES).is_ok());
    }

    #[test]
    fn explicit_target_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("docqa.log");

        let writer = configure_file_writer(&LogFileTarget::Explicit(path.clone()));

        assert!(writer.is_some());
        assert!(path.exists());
    }
}
