//! Alert lifecycle manager.
//!
//! Every schedule and alert mutation goes through [`AlertLifecycleManager`].
//! It translates staff actions, collaborator hooks, and escalation ticks into
//! the store's atomic primitives and maps their outcomes onto [`WardError`]:
//!
//! - unknown admissions, schedules, alerts and wards are not-found rejections
//! - a second open alert, a lost compare-and-set, or an action on a closed
//!   alert is a [`WardError::Conflict`], which callers treat as a no-op
//!
//! ## Alert states
//!
//! ```text
//! pending --> due --> overdue
//!    \         |        /
//!     +--------+-------+--> completed | dismissed
//! ```

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use wardwatch_core::due::{IntervalBounds, ScheduleStatus, status_at};
use wardwatch_core::types::validate_id;
use wardwatch_core::{
    AdmissionId, AdmissionStatus, AlertId, AlertStatus, Result, ScheduleId, StaffId, WardError,
    WardId, WardwatchConfig, log_alert_event, log_schedule_event,
};
use wardwatch_store::{
    Admission, AdmissionDismissal, Alert, AlertInsert, AlertUpdate, Deactivation,
    RecordingApplied, Schedule, ScheduleWrite, VitalsDatabase, Ward,
};

/// Timing and validation settings for the lifecycle manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// Time between `due` and `overdue`
    pub grace_period: Duration,
    /// How far ahead of `next_due_at` a pending alert is created
    pub lookahead: Duration,
    /// Time between repeat notifications while overdue
    pub renotify_interval: Duration,
    /// Allowed schedule intervals
    pub bounds: IntervalBounds,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self::from_config(&WardwatchConfig::default()).unwrap_or(Self {
            grace_period: Duration::minutes(15),
            lookahead: Duration::minutes(15),
            renotify_interval: Duration::minutes(15),
            bounds: IntervalBounds::default(),
        })
    }
}

impl LifecycleSettings {
    /// Build settings from a validated configuration.
    pub fn from_config(config: &WardwatchConfig) -> Result<Self> {
        Ok(Self {
            grace_period: config.escalation.grace_period(),
            lookahead: config.escalation.lookahead(),
            renotify_interval: config.escalation.renotify_interval(),
            bounds: config.schedule.bounds()?,
        })
    }
}

/// Result of a vitals recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingOutcome {
    /// The schedule was advanced; `completed_alert` is the alert it closed
    Resolved {
        schedule: Schedule,
        completed_alert: Option<AlertId>,
    },
    /// Recorded at or before the schedule's anchor; the open alert and the
    /// schedule are unchanged
    Stale { schedule: Schedule },
    /// The admission has no active schedule; nothing to resolve
    NoSchedule,
}

/// Owner of every schedule and alert transition.
#[derive(Clone)]
pub struct AlertLifecycleManager {
    db: VitalsDatabase,
    settings: LifecycleSettings,
}

impl AlertLifecycleManager {
    /// Create a manager over a database.
    pub fn new(db: VitalsDatabase, settings: LifecycleSettings) -> Self {
        Self { db, settings }
    }

    /// The underlying store.
    pub fn database(&self) -> &VitalsDatabase {
        &self.db
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    // =========================================================================
    // Admission source hooks
    // =========================================================================

    /// Register or rename a ward.
    pub fn register_ward(&self, ward_id: WardId, name: &str, now: DateTime<Utc>) -> Result<Ward> {
        validate_id("ward_id", ward_id)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(WardError::validation("ward_name", "must not be empty"));
        }

        let ward = Ward {
            id: ward_id,
            name: name.to_string(),
        };
        self.db.upsert_ward(&ward, now)?;
        Ok(ward)
    }

    /// Register a newly admitted patient, or refresh an admitted one's details.
    ///
    /// A discharged admission cannot be re-admitted under the same id.
    pub fn register_admission(
        &self,
        admission_id: AdmissionId,
        ward_id: WardId,
        bed_label: &str,
        patient_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Admission> {
        validate_id("admission_id", admission_id)?;
        validate_id("ward_id", ward_id)?;
        let bed_label = bed_label.trim();
        if bed_label.is_empty() {
            return Err(WardError::validation("bed_label", "must not be empty"));
        }

        let status = match self.db.get_admission(admission_id)? {
            Some(existing) if existing.status == AdmissionStatus::Discharged => {
                return Err(WardError::validation(
                    "admission_id",
                    format!("admission {admission_id} is discharged"),
                ));
            }
            Some(existing) => existing.status,
            None => AdmissionStatus::Admitted,
        };

        let admission = Admission {
            id: admission_id,
            ward_id,
            bed_label: bed_label.to_string(),
            patient_name: patient_name.trim().to_string(),
            status,
            updated_at: now,
        };
        let saved = self
            .db
            .upsert_admission(&admission)?
            .ok_or(WardError::WardNotFound { ward_id })?;

        debug!(admission_id, ward_id, bed = %saved.bed_label, "Registered admission");
        Ok(saved)
    }

    /// Move an admission to another ward/bed. Monitoring continues.
    pub fn transfer_admission(
        &self,
        admission_id: AdmissionId,
        ward_id: WardId,
        bed_label: &str,
        now: DateTime<Utc>,
    ) -> Result<Admission> {
        let admission = self.require_admission(admission_id)?;
        if !admission.status.is_monitorable() {
            return Err(WardError::validation(
                "admission_id",
                format!("admission {admission_id} is {}", admission.status),
            ));
        }
        if self.db.get_ward(ward_id)?.is_none() {
            return Err(WardError::WardNotFound { ward_id });
        }
        let bed_label = bed_label.trim();
        if bed_label.is_empty() {
            return Err(WardError::validation("bed_label", "must not be empty"));
        }

        let moved = self
            .db
            .transfer_admission(admission_id, ward_id, bed_label, now)?
            .ok_or_else(|| WardError::conflict(format!("admission {admission_id} was discharged")))?;

        debug!(admission_id, from_ward = admission.ward_id, to_ward = ward_id, "Transferred admission");
        Ok(moved)
    }

    /// Discharge hook: mark the admission discharged and dismiss its monitoring
    /// in one transaction.
    pub fn discharge_admission(
        &self,
        admission_id: AdmissionId,
        now: DateTime<Utc>,
    ) -> Result<AdmissionDismissal> {
        let dismissal = self
            .db
            .dismiss_admission(admission_id, true, now)?
            .ok_or(WardError::AdmissionNotFound { admission_id })?;
        self.log_dismissal(admission_id, "discharged", &dismissal);
        Ok(dismissal)
    }

    // =========================================================================
    // Schedules
    // =========================================================================

    /// Create the admission's schedule or change the interval of its active one.
    ///
    /// Returns the schedule with `next_due_at = now + interval_minutes`.
    pub fn set_schedule(
        &self,
        admission_id: AdmissionId,
        interval_minutes: i64,
        staff_id: StaffId,
        now: DateTime<Utc>,
    ) -> Result<Schedule> {
        validate_id("admission_id", admission_id)?;
        validate_id("staff_id", staff_id)?;
        self.settings.bounds.validate(interval_minutes)?;

        match self.db.upsert_schedule(admission_id, interval_minutes, staff_id, now)? {
            ScheduleWrite::Created(schedule) => {
                log_schedule_event!(
                    schedule.id,
                    "created",
                    admission_id,
                    interval_minutes,
                    next_due_at = %schedule.next_due_at
                );
                Ok(schedule)
            }
            ScheduleWrite::Updated {
                schedule,
                superseded_alert,
            } => {
                log_schedule_event!(
                    schedule.id,
                    "interval_changed",
                    admission_id,
                    interval_minutes,
                    next_due_at = %schedule.next_due_at
                );
                if let Some(alert_id) = superseded_alert {
                    log_alert_event!(alert_id, "dismissed", reason = "interval_changed");
                }
                Ok(schedule)
            }
            ScheduleWrite::AdmissionMissing => Err(WardError::AdmissionNotFound { admission_id }),
            ScheduleWrite::AdmissionNotMonitorable(status) => Err(WardError::validation(
                "admission_id",
                format!("cannot schedule vitals for an admission that is {status}"),
            )),
        }
    }

    /// Deactivate a schedule and dismiss its open alert. Idempotent.
    ///
    /// Returns the alerts dismissed by this call (empty if already inactive).
    pub fn deactivate_schedule(
        &self,
        schedule_id: ScheduleId,
        now: DateTime<Utc>,
    ) -> Result<Vec<AlertId>> {
        match self.db.deactivate_schedule(schedule_id, now)? {
            Deactivation::Deactivated { dismissed_alerts } => {
                log_schedule_event!(schedule_id, "deactivated", dismissed = dismissed_alerts.len());
                for alert_id in &dismissed_alerts {
                    log_alert_event!(*alert_id, "dismissed", reason = "schedule_deactivated");
                }
                Ok(dismissed_alerts)
            }
            Deactivation::AlreadyInactive => {
                debug!(schedule_id, "Schedule already inactive");
                Ok(Vec::new())
            }
            Deactivation::Missing => Err(WardError::ScheduleNotFound { schedule_id }),
        }
    }

    /// The admission's active schedule and its derived status at `now`.
    pub fn schedule_status(
        &self,
        admission_id: AdmissionId,
        now: DateTime<Utc>,
    ) -> Result<Option<(Schedule, ScheduleStatus)>> {
        self.require_admission(admission_id)?;
        Ok(self
            .db
            .active_schedule_for_admission(admission_id)?
            .map(|schedule| {
                let status =
                    ScheduleStatus::evaluate(schedule.next_due_at, now, self.settings.grace_period);
                (schedule, status)
            }))
    }

    // =========================================================================
    // Alerts
    // =========================================================================

    /// Create the open alert for the schedule's current occurrence.
    ///
    /// Returns `Ok(None)` while `next_due_at` is further away than the
    /// lookahead. A second open alert, or an occurrence that was already
    /// closed, is a conflict.
    pub fn ensure_open_alert(
        &self,
        schedule_id: ScheduleId,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        let not_after = now + self.settings.lookahead;
        let insert =
            self.db
                .insert_open_alert(schedule_id, now, self.settings.grace_period, not_after)?;

        match insert {
            None => Ok(None),
            Some(AlertInsert::Created(alert)) => {
                log_alert_event!(
                    alert.id,
                    "created",
                    schedule_id,
                    status = %alert.status,
                    due_at = %alert.due_at
                );
                Ok(Some(alert))
            }
            Some(AlertInsert::AlreadyOpen(alert_id)) => Err(WardError::conflict(format!(
                "schedule {schedule_id} already has open alert {alert_id}"
            ))),
            Some(AlertInsert::OccurrenceClosed(alert_id)) => Err(WardError::conflict(format!(
                "occurrence of schedule {schedule_id} was closed by alert {alert_id}"
            ))),
            Some(AlertInsert::ScheduleInactive) => Err(WardError::conflict(format!(
                "schedule {schedule_id} is inactive"
            ))),
            Some(AlertInsert::ScheduleMissing) => Err(WardError::ScheduleNotFound { schedule_id }),
        }
    }

    /// Move an open alert forward to the status it should have at `now`.
    ///
    /// Returns the new status, or `None` if the alert is already there (or
    /// further). Losing a race against another writer is a conflict.
    pub fn advance(&self, alert: &Alert, now: DateTime<Utc>) -> Result<Option<AlertStatus>> {
        if alert.status.is_terminal() {
            return Ok(None);
        }

        let target = status_at(alert.due_at, now, self.settings.grace_period);
        if !alert.status.can_transition_to(target) {
            return Ok(None);
        }

        if self.db.transition_alert(alert.id, alert.status, target, now)? {
            log_alert_event!(alert.id, "advanced", from = %alert.status, to = %target);
            Ok(Some(target))
        } else {
            Err(WardError::conflict(format!(
                "alert {} is no longer {}",
                alert.id, alert.status
            )))
        }
    }

    /// Raise the overdue notification counter if a re-notification boundary
    /// has been crossed.
    ///
    /// The counter is 1 when the alert turns overdue and grows by one every
    /// renotify interval. Returns the new count when it changed.
    pub fn renotify(&self, alert: &Alert, now: DateTime<Utc>) -> Result<Option<u32>> {
        if alert.status != AlertStatus::Overdue {
            return Ok(None);
        }

        let target = notification_count(
            alert.due_at,
            now,
            self.settings.grace_period,
            self.settings.renotify_interval,
        );
        if target <= alert.notify_count {
            return Ok(None);
        }

        if self.db.mark_notified(alert.id, target, now)? {
            log_alert_event!(alert.id, "renotify", notify_count = target);
            Ok(Some(target))
        } else {
            Ok(None)
        }
    }

    /// Clinical recording hook: complete the open alert (if any) and advance
    /// the schedule to `recorded_at + interval`.
    ///
    /// Only a recording newer than the schedule's anchor counts. An older one
    /// is reported as [`RecordingOutcome::Stale`] and monitoring continues.
    pub fn resolve_by_recording(
        &self,
        admission_id: AdmissionId,
        recorded_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<RecordingOutcome> {
        validate_id("admission_id", admission_id)?;

        match self.db.apply_recording(admission_id, recorded_at, now)? {
            RecordingApplied::Resolved {
                schedule,
                completed_alert,
            } => {
                if let Some(alert_id) = completed_alert {
                    log_alert_event!(alert_id, "completed", admission_id);
                } else {
                    debug!(admission_id, "Recording with no open alert, advancing schedule only");
                }
                log_schedule_event!(
                    schedule.id,
                    "advanced",
                    recorded_at = %recorded_at,
                    next_due_at = %schedule.next_due_at
                );
                Ok(RecordingOutcome::Resolved {
                    schedule,
                    completed_alert,
                })
            }
            RecordingApplied::Stale { schedule } => {
                warn!(
                    admission_id,
                    schedule_id = schedule.id,
                    recorded_at = %recorded_at,
                    anchored_at = %schedule.anchored_at,
                    "Recording predates the current cycle, schedule unchanged"
                );
                Ok(RecordingOutcome::Stale { schedule })
            }
            RecordingApplied::NoActiveSchedule => {
                debug!(admission_id, "Recording for admission without an active schedule");
                Ok(RecordingOutcome::NoSchedule)
            }
            RecordingApplied::AdmissionMissing => Err(WardError::AdmissionNotFound { admission_id }),
        }
    }

    /// Record that a staff member has seen an alert. The alert stays open.
    pub fn acknowledge(
        &self,
        alert_id: AlertId,
        staff_id: StaffId,
        now: DateTime<Utc>,
    ) -> Result<Alert> {
        validate_id("staff_id", staff_id)?;
        match self.db.acknowledge_alert(alert_id, staff_id, now)? {
            AlertUpdate::Applied(alert) => {
                log_alert_event!(alert_id, "acknowledged", staff_id);
                Ok(alert)
            }
            AlertUpdate::AlreadyClosed(alert) => Err(WardError::conflict(format!(
                "alert {alert_id} is already {}",
                alert.status
            ))),
            AlertUpdate::Missing => Err(WardError::AlertNotFound { alert_id }),
        }
    }

    /// Close an open alert without a recording.
    pub fn dismiss(&self, alert_id: AlertId, staff_id: StaffId, now: DateTime<Utc>) -> Result<Alert> {
        validate_id("staff_id", staff_id)?;
        match self.db.dismiss_alert(alert_id, staff_id, now)? {
            AlertUpdate::Applied(alert) => {
                log_alert_event!(alert_id, "dismissed", staff_id);
                Ok(alert)
            }
            AlertUpdate::AlreadyClosed(alert) => Err(WardError::conflict(format!(
                "alert {alert_id} is already {}",
                alert.status
            ))),
            AlertUpdate::Missing => Err(WardError::AlertNotFound { alert_id }),
        }
    }

    /// Deactivate the admission's schedules and dismiss every open alert,
    /// without changing the admission status.
    pub fn dismiss_for_deactivation(
        &self,
        admission_id: AdmissionId,
        now: DateTime<Utc>,
    ) -> Result<AdmissionDismissal> {
        let dismissal = self
            .db
            .dismiss_admission(admission_id, false, now)?
            .ok_or(WardError::AdmissionNotFound { admission_id })?;
        self.log_dismissal(admission_id, "deactivated", &dismissal);
        Ok(dismissal)
    }

    /// All currently open alerts.
    pub fn open_alerts(&self) -> Result<Vec<Alert>> {
        Ok(self.db.open_alerts()?)
    }

    /// Full alert history for a schedule.
    pub fn alert_history(&self, schedule_id: ScheduleId) -> Result<Vec<Alert>> {
        if self.db.get_schedule(schedule_id)?.is_none() {
            return Err(WardError::ScheduleNotFound { schedule_id });
        }
        Ok(self.db.alerts_for_schedule(schedule_id)?)
    }

    fn require_admission(&self, admission_id: AdmissionId) -> Result<Admission> {
        self.db
            .get_admission(admission_id)?
            .ok_or(WardError::AdmissionNotFound { admission_id })
    }

    fn log_dismissal(&self, admission_id: AdmissionId, reason: &str, dismissal: &AdmissionDismissal) {
        for schedule_id in &dismissal.deactivated_schedules {
            log_schedule_event!(*schedule_id, "deactivated", admission_id, reason);
        }
        for alert_id in &dismissal.dismissed_alerts {
            log_alert_event!(*alert_id, "dismissed", admission_id, reason);
        }
    }
}

/// Number of overdue notifications an alert should have had by `now`.
///
/// Zero before the grace period ends, then one at the start of the overdue
/// period and one more per elapsed `renotify` interval.
pub fn notification_count(
    due_at: DateTime<Utc>,
    now: DateTime<Utc>,
    grace: Duration,
    renotify: Duration,
) -> u32 {
    let overdue_since = due_at + grace;
    if now < overdue_since {
        return 0;
    }
    let elapsed = (now - overdue_since).num_milliseconds();
    let step = renotify.num_milliseconds().max(1);
    u32::try_from(elapsed / step + 1).unwrap_or(u32::MAX)
}
