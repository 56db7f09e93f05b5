//! Logging infrastructure for wardwatch.
//!
//! Structured logging using the `tracing` ecosystem. The escalation clock and
//! the lifecycle manager log every transition, so the JSON file doubles as an
//! operational trail for "why did this alert fire".
//!
//! ## Features
//!
//! - JSON lines format for machine parsing
//! - File output to `~/.wardwatch/logs/wardwatch.log` (rolled daily)
//! - Console output with configurable verbosity
//! - `RUST_LOG` overrides the default filter
//!
//! ## Example
//!
//! ```no_run
//! use wardwatch_core::logging;
//!
//! let _guard = logging::init_logging(None, false).expect("logging init");
//!
//! tracing::info!("wardwatch started");
//! tracing::debug!(alert_id = 7, "advancing alert");
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{Result, WardError};

/// Guard that must be held to ensure log flushing on shutdown.
///
/// Keep this guard alive for the lifetime of the application.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the wardwatch logging system.
///
/// Sets up a JSON file layer under `log_dir` (defaults to
/// `~/.wardwatch/logs/`) and a compact stderr layer. `verbose` switches the
/// default level from INFO to DEBUG.
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };

    std::fs::create_dir_all(&log_dir).map_err(|e| WardError::DirectoryCreation {
        path: log_dir.clone(),
        source: e,
    })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "wardwatch.log");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wardwatch={default_level}")));

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_span_list(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::debug!(log_dir = %log_dir.display(), verbose, "logging initialized");

    Ok(LogGuard {
        _file_guard: Some(file_guard),
    })
}

/// Initialize minimal console-only logging for testing.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Base wardwatch directory, `~/.wardwatch/`.
pub fn wardwatch_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| WardError::Internal {
        message: "could not determine home directory".into(),
    })?;

    Ok(home.join(".wardwatch"))
}

/// Get the default log directory path, `~/.wardwatch/logs/`.
pub fn default_log_dir() -> Result<PathBuf> {
    Ok(wardwatch_dir()?.join("logs"))
}

/// Get the default log file path, `~/.wardwatch/logs/wardwatch.log`.
pub fn default_log_file() -> Result<PathBuf> {
    Ok(default_log_dir()?.join("wardwatch.log"))
}

/// Log an alert lifecycle event.
///
/// # Example
///
/// ```ignore
/// log_alert_event!(alert_id, "escalated");
/// log_alert_event!(alert_id, "completed", admission_id = 3);
/// ```
#[macro_export]
macro_rules! log_alert_event {
    ($alert_id:expr, $event:expr) => {
        tracing::info!(
            target: "wardwatch::alert",
            alert_id = $alert_id,
            event = $event,
            "alert event"
        )
    };
    ($alert_id:expr, $event:expr, $($field:tt)*) => {
        tracing::info!(
            target: "wardwatch::alert",
            alert_id = $alert_id,
            event = $event,
            $($field)*,
            "alert event"
        )
    };
}

/// Log a schedule lifecycle event.
///
/// # Example
///
/// ```ignore
/// log_schedule_event!(schedule_id, "created", interval_minutes = 240);
/// ```
#[macro_export]
macro_rules! log_schedule_event {
    ($schedule_id:expr, $event:expr) => {
        tracing::info!(
            target: "wardwatch::schedule",
            schedule_id = $schedule_id,
            event = $event,
            "schedule event"
        )
    };
    ($schedule_id:expr, $event:expr, $($field:tt)*) => {
        tracing::info!(
            target: "wardwatch::schedule",
            schedule_id = $schedule_id,
            event = $event,
            $($field)*,
            "schedule event"
        )
    };
}
