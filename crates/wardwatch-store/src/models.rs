//! Row models for the wardwatch store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wardwatch_core::{
    AdmissionId, AdmissionStatus, AlertId, AlertStatus, ScheduleId, StaffId, WardId,
};

/// A ward known to the admission source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ward {
    pub id: WardId,
    pub name: String,
}

/// Projection of an admission supplied by the admission source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    pub id: AdmissionId,
    pub ward_id: WardId,
    pub bed_label: String,
    pub patient_name: String,
    pub status: AdmissionStatus,
    pub updated_at: DateTime<Utc>,
}

impl Admission {
    /// Create an admitted admission record.
    pub fn new(
        id: AdmissionId,
        ward_id: WardId,
        bed_label: impl Into<String>,
        patient_name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            ward_id,
            bed_label: bed_label.into(),
            patient_name: patient_name.into(),
            status: AdmissionStatus::Admitted,
            updated_at: Utc::now(),
        }
    }
}

/// A recurring vitals obligation for one admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub admission_id: AdmissionId,
    pub interval_minutes: i64,
    pub next_due_at: DateTime<Utc>,
    /// Time `next_due_at` was computed from: creation, last interval edit,
    /// or the latest resolving recording.
    pub anchored_at: DateTime<Utc>,
    pub last_recorded_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_by: StaffId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One occurrence of a schedule becoming due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub schedule_id: ScheduleId,
    pub admission_id: AdmissionId,
    pub due_at: DateTime<Utc>,
    pub status: AlertStatus,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<StaffId>,
    /// Number of overdue notification edges emitted so far
    pub notify_count: u32,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_at.is_some()
    }
}

/// Which slice of open alerts a feed read covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "id")]
pub enum FeedScope {
    Ward(WardId),
    Admission(AdmissionId),
    All,
}

impl std::fmt::Display for FeedScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ward(id) => write!(f, "ward {id}"),
            Self::Admission(id) => write!(f, "admission {id}"),
            Self::All => write!(f, "all wards"),
        }
    }
}

/// An open alert joined with its schedule, admission and ward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRow {
    pub alert_id: AlertId,
    pub schedule_id: ScheduleId,
    pub admission_id: AdmissionId,
    pub ward_id: WardId,
    pub ward_name: String,
    pub bed_label: String,
    pub patient_name: String,
    pub status: AlertStatus,
    pub due_at: DateTime<Utc>,
    pub interval_minutes: i64,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub notify_count: u32,
}

/// Result of creating or updating an admission's schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleWrite {
    Created(Schedule),
    Updated {
        schedule: Schedule,
        /// Open alert dismissed because its occurrence was superseded
        superseded_alert: Option<AlertId>,
    },
    AdmissionMissing,
    AdmissionNotMonitorable(AdmissionStatus),
}

/// Result of the atomic check-and-create for an open alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertInsert {
    Created(Alert),
    /// An open alert already exists for the schedule
    AlreadyOpen(AlertId),
    /// This occurrence was already raised and closed
    OccurrenceClosed(AlertId),
    ScheduleInactive,
    ScheduleMissing,
}

/// Result of a vitals recording against an admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingApplied {
    Resolved {
        schedule: Schedule,
        completed_alert: Option<AlertId>,
    },
    /// Recorded at or before the schedule's anchor; it cannot satisfy the
    /// current occurrence, so nothing changed
    Stale { schedule: Schedule },
    NoActiveSchedule,
    AdmissionMissing,
}

/// Result of closing or stamping a single alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertUpdate {
    Applied(Alert),
    /// Alert was already terminal; nothing changed
    AlreadyClosed(Alert),
    Missing,
}

/// Result of deactivating a schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deactivation {
    Deactivated { dismissed_alerts: Vec<AlertId> },
    AlreadyInactive,
    Missing,
}

/// Alerts and schedules closed by an admission-wide dismissal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdmissionDismissal {
    pub deactivated_schedules: Vec<ScheduleId>,
    pub dismissed_alerts: Vec<AlertId>,
}
