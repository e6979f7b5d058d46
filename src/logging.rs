//! File logging. The terminal belongs to the UI, so nothing is ever written
//! to stdout or stderr while the editor runs.
//!
//! Filter priority: `DIARY_LOG` > `RUST_LOG` > `warn,diary_editor=info`.
//! `DIARY_LOG=debug` is shorthand for `warn,diary_editor=debug`.

use color_eyre::{eyre::eyre, Result};
use std::{
    env,
    path::{Path, PathBuf},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Must be held for the lifetime of the program; dropping it flushes the
/// background writer.
pub struct LogGuard {
    _file_guard: WorkerGuard,
    pub log_file: PathBuf,
}

pub fn init(log_file: Option<PathBuf>) -> Result<LogGuard> {
    let (log_dir, filename) = resolve_log_path(log_file);
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(&log_dir, &filename);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_filter(create_filter(
            env::var("DIARY_LOG").ok(),
            env::var("RUST_LOG").ok(),
        ));

    tracing_subscriber::registry()
        .with(file_layer)
        .try_init()
        .map_err(|e| eyre!("failed to initialize logging: {e}"))?;

    Ok(LogGuard {
        _file_guard: file_guard,
        log_file: log_dir.join(filename),
    })
}

fn resolve_log_path(override_path: Option<PathBuf>) -> (PathBuf, String) {
    let filename = format!("diary-editor-{}.log", std::process::id());

    if let Some(path) = override_path {
        if path.extension().is_some() {
            let dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(filename);
            return (dir, name);
        }
        return (path, filename);
    }

    let dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("diary-editor")
        .join("logs");
    (dir, filename)
}

fn filter_directives(diary_log: Option<String>, rust_log: Option<String>) -> String {
    match (diary_log, rust_log) {
        (Some(level), _) if level.contains(['=', ',', ':']) => level,
        (Some(level), _) => format!("warn,diary_editor={level}"),
        (None, Some(rust_log)) => rust_log,
        (None, None) => "warn,diary_editor=info".to_string(),
    }
}

fn create_filter(diary_log: Option<String>, rust_log: Option<String>) -> EnvFilter {
    EnvFilter::new(filter_directives(diary_log, rust_log))
}
