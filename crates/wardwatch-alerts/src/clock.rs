//! Escalation clock.
//!
//! A background task that, on a fixed cadence, materialises alerts for
//! schedules coming due, advances open alerts through `pending -> due ->
//! overdue`, and bumps the re-notification counter of overdue alerts. It is
//! the only writer that drives status progression; staff actions and
//! collaborator hooks only close or stamp single alerts.
//!
//! ## Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use wardwatch_alerts::{AlertLifecycleManager, EscalationClock, LifecycleSettings};
//! use wardwatch_store::VitalsDatabase;
//!
//! #[tokio::main]
//! async fn main() -> wardwatch_core::Result<()> {
//!     let db = VitalsDatabase::open("/tmp/vitals.db")?;
//!     let lifecycle = AlertLifecycleManager::new(db, LifecycleSettings::default());
//!
//!     let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     let handle = EscalationClock::with_interval(lifecycle, Duration::from_secs(30))
//!         .start(shutdown_rx);
//!
//!     // ... serve until asked to stop ...
//!     let _ = shutdown_tx.send(true);
//!     let _ = handle.await;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use wardwatch_core::{AlertStatus, Result, WardError};

use crate::lifecycle::AlertLifecycleManager;

/// Default tick interval in seconds.
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 30;

/// Counts from one evaluation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Alerts materialised for schedules coming due
    pub created: usize,
    /// Alerts moved forward (`pending -> due`, `due -> overdue`)
    pub advanced: usize,
    /// Overdue alerts whose notification counter increased
    pub renotified: usize,
    /// Benign conflicts absorbed (another writer got there first)
    pub conflicts: usize,
    /// Per-item failures that were logged and skipped
    pub failures: usize,
}

impl TickReport {
    /// Whether the pass changed anything.
    pub fn has_changes(&self) -> bool {
        self.created + self.advanced + self.renotified > 0
    }

    fn absorb(&mut self, stage: &'static str, id: i64, err: WardError) {
        if err.is_benign() {
            debug!(stage, id, error = %err, "Absorbed conflict during tick");
            self.conflicts += 1;
        } else {
            warn!(stage, id, error = %err, "Tick item failed, continuing");
            self.failures += 1;
        }
    }
}

/// Tick-driven evaluator for schedules and open alerts.
#[derive(Clone)]
pub struct EscalationClock {
    lifecycle: AlertLifecycleManager,
    interval: Duration,
}

impl EscalationClock {
    /// Create a clock with the default interval (30 seconds).
    pub fn new(lifecycle: AlertLifecycleManager) -> Self {
        Self::with_interval(lifecycle, Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS))
    }

    /// Create a clock with a custom interval.
    pub fn with_interval(lifecycle: AlertLifecycleManager, interval: Duration) -> Self {
        Self {
            lifecycle,
            interval,
        }
    }

    /// Get the tick interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one evaluation pass at `now`.
    ///
    /// Failures of individual schedules or alerts are counted and skipped;
    /// only a failure to read the work lists aborts the pass.
    pub fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let mut report = TickReport::default();
        let db = self.lifecycle.database();
        let cutoff = now + self.lifecycle.settings().lookahead;

        for schedule in db.schedules_due_by(cutoff)? {
            match self.lifecycle.ensure_open_alert(schedule.id, now) {
                Ok(Some(_)) => report.created += 1,
                Ok(None) => {}
                Err(e) => report.absorb("ensure_open_alert", schedule.id, e),
            }
        }

        for mut alert in db.open_alerts()? {
            match self.lifecycle.advance(&alert, now) {
                Ok(Some(status)) => {
                    report.advanced += 1;
                    alert.status = status;
                }
                Ok(None) => {}
                Err(e) => {
                    report.absorb("advance", alert.id, e);
                    continue;
                }
            }

            if alert.status == AlertStatus::Overdue {
                match self.lifecycle.renotify(&alert, now) {
                    Ok(Some(_)) => report.renotified += 1,
                    Ok(None) => {}
                    Err(e) => report.absorb("renotify", alert.id, e),
                }
            }
        }

        if report.has_changes() {
            info!(
                created = report.created,
                advanced = report.advanced,
                renotified = report.renotified,
                conflicts = report.conflicts,
                failures = report.failures,
                "Escalation tick applied changes"
            );
        } else {
            debug!(conflicts = report.conflicts, failures = report.failures, "Escalation tick idle");
        }

        Ok(report)
    }

    /// Start the clock on the tokio runtime.
    ///
    /// The task stops when `shutdown` is set to `true` or its sender drops.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> JoinHandle<Result<()>> {
        info!(interval_secs = self.interval.as_secs(), "Starting escalation clock");
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Run the tick loop until shutdown.
    ///
    /// Ticks run on the blocking pool. A missed tick is skipped rather than
    /// replayed, since every pass evaluates against the current time.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let clock = self.clone();
                    match tokio::task::spawn_blocking(move || clock.tick(Utc::now())).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) if e.is_fatal() => {
                            error!(error = %e, "Escalation clock stopping on fatal error");
                            return Err(e);
                        }
                        Ok(Err(e)) => {
                            error!(error = %e, "Escalation tick failed");
                        }
                        Err(join_err) => {
                            error!(error = %join_err, "Escalation tick panicked");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Escalation clock shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }
}
