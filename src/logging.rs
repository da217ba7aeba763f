//! Tracing configuration and log routing.
//!
//! Pipeline events go to stdout through a compact formatter and to a log file. When
//! `DOCRAG_LOG_FILE` is set, logs are appended to that path; otherwise the file logger writes
//! to `logs/docrag.log`. File output goes through a non-blocking writer so ingestion and query
//! handlers never wait on disk.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_ENV: &str = "DOCRAG_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "docrag.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Configure tracing subscribers for stdout and file logging.
///
/// `RUST_LOG` drives filtering and defaults to `info` (backend crates are held at `warn`).
/// The file layer is skipped when the log file cannot be opened. The writer guard lives in a
/// static for the process lifetime.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let log_path = resolve_log_path(std::env::var(LOG_FILE_ENV).ok());
    match open_file_writer(&log_path) {
        Some(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }
}

/// Pick the log file location from the optional `DOCRAG_LOG_FILE` override.
fn resolve_log_path(override_path: Option<String>) -> PathBuf {
    override_path
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(DEFAULT_LOG_DIR).join(DEFAULT_LOG_FILE))
}

fn open_file_writer(path: &Path) -> Option<NonBlocking> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty())
        && let Err(err) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create log directory {}: {err}", parent.display());
        return None;
    }

    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(non_blocking)
        }
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_log_path_lives_under_logs_dir() {
        assert_eq!(resolve_log_path(None), PathBuf::from("logs/docrag.log"));
        assert_eq!(
            resolve_log_path(Some("   ".into())),
            PathBuf::from("logs/docrag.log")
        );
    }

    #[test]
    fn override_log_path_is_trimmed() {
        assert_eq!(
            resolve_log_path(Some(" /tmp/docrag-test.log ".into())),
            PathBuf::from("/tmp/docrag-test.log")
        );
    }

    #[test]
    fn open_file_writer_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("app.log");
        assert!(open_file_writer(&path).is_some());
        assert!(path.exists());
    }
}
