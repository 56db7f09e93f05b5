//! Alert feed for polling clients.
//!
//! A feed read is one SQL statement over already-materialised alert rows, so
//! each snapshot is internally consistent and never blocks the escalation
//! clock. Entries come back in dashboard order.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use wardwatch_core::due::minutes_overdue;
use wardwatch_core::{AdmissionId, AlertId, AlertStatus, Result, ScheduleId, WardError, WardId};
use wardwatch_store::{FeedRow, FeedScope, VitalsDatabase};

use crate::ranker::sort_by_urgency;

/// One open alert as shown on the ward dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
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
    pub acknowledged: bool,
    /// Overdue notification edges so far; grows every re-notify interval
    pub notify_count: u32,
    /// Minutes since the grace period ended (overdue only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes_overdue: Option<i64>,
}

impl FeedEntry {
    fn from_row(row: FeedRow, now: DateTime<Utc>, grace: Duration) -> Self {
        let minutes_overdue =
            (row.status == AlertStatus::Overdue).then(|| minutes_overdue(row.due_at, now, grace));
        Self {
            alert_id: row.alert_id,
            schedule_id: row.schedule_id,
            admission_id: row.admission_id,
            ward_id: row.ward_id,
            ward_name: row.ward_name,
            bed_label: row.bed_label,
            patient_name: row.patient_name,
            status: row.status,
            due_at: row.due_at,
            interval_minutes: row.interval_minutes,
            acknowledged: row.acknowledged_at.is_some(),
            notify_count: row.notify_count,
            minutes_overdue,
        }
    }
}

/// Per-status counts for a feed snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSummary {
    pub overdue: usize,
    pub due: usize,
    pub upcoming: usize,
    pub total: usize,
}

impl FeedSummary {
    fn tally(entries: &[FeedEntry]) -> Self {
        let mut summary = Self::default();
        for entry in entries {
            match entry.status {
                AlertStatus::Overdue => summary.overdue += 1,
                AlertStatus::Due => summary.due += 1,
                AlertStatus::Pending => summary.upcoming += 1,
                AlertStatus::Completed | AlertStatus::Dismissed => continue,
            }
            summary.total += 1;
        }
        summary
    }

    /// Header text, e.g. "2 overdue | 1 due | 3 upcoming".
    pub fn format_header(&self) -> String {
        if self.total == 0 {
            return "no vitals due".to_string();
        }
        format!(
            "{} overdue | {} due | {} upcoming",
            self.overdue, self.due, self.upcoming
        )
    }
}

/// A ranked, consistent read of open alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub scope: FeedScope,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<FeedEntry>,
    pub summary: FeedSummary,
}

/// Read side of the alert store.
#[derive(Clone)]
pub struct AlertFeed {
    db: VitalsDatabase,
    grace_period: Duration,
}

impl AlertFeed {
    pub fn new(db: VitalsDatabase, grace_period: Duration) -> Self {
        Self { db, grace_period }
    }

    /// Open alerts in `scope`, ranked for display at `now`.
    ///
    /// An unknown ward or admission is a not-found rejection rather than an
    /// empty feed.
    pub fn query(&self, scope: FeedScope, now: DateTime<Utc>) -> Result<FeedSnapshot> {
        match scope {
            FeedScope::Ward(ward_id) => {
                if self.db.get_ward(ward_id)?.is_none() {
                    return Err(WardError::WardNotFound { ward_id });
                }
            }
            FeedScope::Admission(admission_id) => {
                if self.db.get_admission(admission_id)?.is_none() {
                    return Err(WardError::AdmissionNotFound { admission_id });
                }
            }
            FeedScope::All => {}
        }

        let mut entries: Vec<FeedEntry> = self
            .db
            .feed_rows(scope)?
            .into_iter()
            .map(|row| FeedEntry::from_row(row, now, self.grace_period))
            .collect();
        sort_by_urgency(&mut entries, now, |e| (e.status, e.due_at, e.alert_id));

        let summary = FeedSummary::tally(&entries);
        Ok(FeedSnapshot {
            scope,
            generated_at: now,
            entries,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_tally_and_header() {
        let entry = |status| FeedEntry {
            alert_id: 1,
            schedule_id: 1,
            admission_id: 1,
            ward_id: 1,
            ward_name: "Ward A".into(),
            bed_label: "A-1".into(),
            patient_name: "Ada".into(),
            status,
            due_at: Utc::now(),
            interval_minutes: 60,
            acknowledged: false,
            notify_count: 0,
            minutes_overdue: None,
        };
        let entries = vec![
            entry(AlertStatus::Overdue),
            entry(AlertStatus::Overdue),
            entry(AlertStatus::Due),
            entry(AlertStatus::Pending),
        ];

        let summary = FeedSummary::tally(&entries);
        assert_eq!(summary.overdue, 2);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.format_header(), "2 overdue | 1 due | 1 upcoming");
        assert_eq!(FeedSummary::default().format_header(), "no vitals due");
    }

    #[test]
    fn test_unknown_scope_is_not_found() {
        let db = VitalsDatabase::open_in_memory().unwrap();
        let feed = AlertFeed::new(db, Duration::minutes(15));
        assert!(feed.query(FeedScope::Ward(3), Utc::now()).unwrap_err().is_not_found());
        assert!(feed.query(FeedScope::Admission(3), Utc::now()).unwrap_err().is_not_found());
        assert!(feed.query(FeedScope::All, Utc::now()).unwrap().entries.is_empty());
    }
}
