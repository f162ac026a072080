//! Logging setup for the hook binary.
//!
//! stdout carries hook output for the host tool, so logs go to a daily-rotated
//! file under the state directory (stderr if that directory is unusable).
//! Warnings and errors are also buffered for upload, see [`crate::log_upload`].

use std::env;
use std::path::PathBuf;

use fs_err as fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::log_upload::{LogBuffer, UploadLayer};

const DEBUG_ENV: &str = "OVERLAP_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "overlap-hook";
const MAX_LOG_FILES: usize = 7;

pub struct Logging {
    /// Keep alive until exit so buffered file lines are flushed.
    _guard: Option<WorkerGuard>,
    pub uploads: LogBuffer,
}

/// Installs the global subscriber.
pub fn init(log_dir: Option<PathBuf>) -> Logging {
    let appender = log_dir.and_then(|dir| {
        fs::create_dir_all(&dir).ok()?;
        RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix("log")
            .max_log_files(MAX_LOG_FILES)
            .build(&dir)
            .ok()
    });

    let uploads = LogBuffer::default();
    let registry = tracing_subscriber::registry()
        .with(filter())
        .with(UploadLayer::new(uploads.clone()));

    let guard = match appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = registry
                .with(
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(false),
                )
                .try_init();
            Some(guard)
        }
        None => {
            let _ = registry
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false),
                )
                .try_init();
            None
        }
    };

    Logging {
        _guard: guard,
        uploads,
    }
}

fn filter() -> EnvFilter {
    let debug_enabled = env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}
