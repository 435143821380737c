//! Logging configuration using tracing.
//!
//! Every session writes to the console, to its own log file and, for warnings
//! and errors, to a shared `error.log` that is only ever appended to. The
//! configured level and `RUST_LOG` filter the first two only; `error.log`
//! always receives WARN and above.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Name of the append-only error log inside the log directory.
pub const ERROR_LOG_FILE: &str = "error.log";

/// Paths of the files opened by [`init`].
#[derive(Debug, Clone)]
pub struct LogFiles {
    pub session_log: PathBuf,
    pub error_log: PathBuf,
}

/// Initialize logging with the specified level.
///
/// `session_id` names the per-session log file (`session-<id>.log`).
pub fn init(level: &str, log_dir: &Path, session_id: &str) -> anyhow::Result<LogFiles> {
    fs::create_dir_all(log_dir)?;

    let session_log = log_dir.join(format!("session-{}.log", session_id));
    let error_log = log_dir.join(ERROR_LOG_FILE);

    let session_file = append_to(&session_log)?;
    let error_file = append_to(&error_log)?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter(level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(session_file))
                .with_filter(env_filter(level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(error_file))
                .with_filter(LevelFilter::WARN),
        )
        .try_init()?;

    Ok(LogFiles {
        session_log,
        error_log,
    })
}

/// Console-only logging, used before the log directory is known.
pub fn init_console(level: &str) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// `RUST_LOG` if set, else `level`, else info.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn append_to(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
