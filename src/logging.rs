use std::env;
use std::path::{Path, PathBuf};

use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LEVEL: &str = "info";
const DEFAULT_LOG_FILE: &str = "./logs/redis-memory-analysis.log";

/// Installs the console and file subscribers. Console output goes to stderr;
/// stdout carries only command output (`derive`, `list-databases`).
///
/// `-v` raises the level to debug, `-vv` to trace; otherwise `TRACING_LEVEL`
/// decides. The returned guard flushes the file writer when dropped.
pub fn init_logger(verbosity: u8) -> impl Drop {
    let filter_layer = EnvFilter::new(filter_directive(
        verbosity,
        env::var("TRACING_LEVEL").ok(),
    ));

    let log_file =
        PathBuf::from(env::var("LOG_FILE_PATH").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string()));
    let (dir, name) = split_log_path(&log_file);
    let file_appender = tracing_appender::rolling::never(dir, name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .pretty()
                .with_file(false)
                .with_target(false)
                .without_time()
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_thread_names(true)
                .with_ansi(false),
        )
        .with(filter_layer)
        .init();

    info!("Logging to stderr and {}", log_file.display());

    guard
}

fn filter_directive(verbosity: u8, env_level: Option<String>) -> String {
    match verbosity {
        0 => env_level
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LEVEL.to_string()),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Directory and file name for the appender; a bare name lands in `.`.
fn split_log_path(path: &Path) -> (PathBuf, PathBuf) {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("redis-memory-analysis.log"));
    (dir, name)
}
