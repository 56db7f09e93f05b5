//! Due-time calculation for vitals schedules.
//!
//! Everything here is a pure function of its inputs. The same
//! [`compute_next_due`] is used when a schedule is created, when its interval
//! is edited, and after a resolving recording, so that
//! `next_due_at == anchor + interval` holds for every schedule.
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use wardwatch_core::due::compute_next_due;
//!
//! let anchor = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
//! let next = compute_next_due(anchor, 120);
//! assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap());
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WardError};
use crate::types::AlertStatus;

/// Fixed grace period between `due` and `overdue` (15 minutes).
pub const DEFAULT_GRACE_PERIOD_MINS: i64 = 15;

/// Shortest allowed schedule interval.
pub const DEFAULT_MIN_INTERVAL_MINS: i64 = 15;

/// Longest allowed schedule interval (once a day).
pub const DEFAULT_MAX_INTERVAL_MINS: i64 = 1440;

/// Compute the next due timestamp: `anchor + interval_minutes`.
///
/// Interval bounds are the caller's responsibility; see [`IntervalBounds`].
pub fn compute_next_due(anchor: DateTime<Utc>, interval_minutes: i64) -> DateTime<Utc> {
    anchor + Duration::minutes(interval_minutes)
}

/// Inclusive bounds for a schedule interval, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalBounds {
    pub min_minutes: i64,
    pub max_minutes: i64,
}

impl Default for IntervalBounds {
    fn default() -> Self {
        Self {
            min_minutes: DEFAULT_MIN_INTERVAL_MINS,
            max_minutes: DEFAULT_MAX_INTERVAL_MINS,
        }
    }
}

impl IntervalBounds {
    /// Create bounds, rejecting an inverted or non-positive range.
    pub fn new(min_minutes: i64, max_minutes: i64) -> Result<Self> {
        if min_minutes <= 0 || max_minutes < min_minutes {
            return Err(WardError::ConfigValidation {
                message: format!(
                    "interval bounds must satisfy 0 < min <= max, got {min_minutes}..={max_minutes}"
                ),
            });
        }
        Ok(Self {
            min_minutes,
            max_minutes,
        })
    }

    /// Validate a requested interval against these bounds.
    pub fn validate(&self, interval_minutes: i64) -> Result<i64> {
        if interval_minutes < self.min_minutes {
            return Err(WardError::validation(
                "interval_minutes",
                format!(
                    "must be at least {} minutes, got {}",
                    self.min_minutes, interval_minutes
                ),
            ));
        }
        if interval_minutes > self.max_minutes {
            return Err(WardError::validation(
                "interval_minutes",
                format!(
                    "must not exceed {} minutes, got {}",
                    self.max_minutes, interval_minutes
                ),
            ));
        }
        Ok(interval_minutes)
    }
}

/// The open status an alert with `due_at` should have at `now`.
///
/// `pending` before `due_at`, `due` on `[due_at, due_at + grace)`, and
/// `overdue` from `due_at + grace` onwards.
pub fn status_at(due_at: DateTime<Utc>, now: DateTime<Utc>, grace: Duration) -> AlertStatus {
    if now < due_at {
        AlertStatus::Pending
    } else if now < due_at + grace {
        AlertStatus::Due
    } else {
        AlertStatus::Overdue
    }
}

/// Display status of a schedule, derived from its `next_due_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleState {
    Upcoming,
    Due,
    Overdue,
}

impl std::fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upcoming => write!(f, "upcoming"),
            Self::Due => write!(f, "due"),
            Self::Overdue => write!(f, "overdue"),
        }
    }
}

/// Derived schedule status for the ward and patient views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleStatus {
    pub state: ScheduleState,
    pub next_due_at: DateTime<Utc>,
    /// Whole minutes until `next_due_at` (upcoming only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes_until_due: Option<i64>,
    /// Whole minutes past the end of the grace period (overdue only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes_overdue: Option<i64>,
}

impl ScheduleStatus {
    /// Evaluate the status of a schedule at `now`.
    pub fn evaluate(next_due_at: DateTime<Utc>, now: DateTime<Utc>, grace: Duration) -> Self {
        let state = match status_at(next_due_at, now, grace) {
            AlertStatus::Pending => ScheduleState::Upcoming,
            AlertStatus::Due => ScheduleState::Due,
            _ => ScheduleState::Overdue,
        };

        let (minutes_until_due, minutes_overdue) = match state {
            ScheduleState::Upcoming => (Some((next_due_at - now).num_minutes()), None),
            ScheduleState::Due => (None, None),
            ScheduleState::Overdue => (None, Some(minutes_overdue(next_due_at, now, grace))),
        };

        Self {
            state,
            next_due_at,
            minutes_until_due,
            minutes_overdue,
        }
    }
}

/// Whole minutes elapsed since the grace period ended, floored at zero.
pub fn minutes_overdue(due_at: DateTime<Utc>, now: DateTime<Utc>, grace: Duration) -> i64 {
    (now - (due_at + grace)).num_minutes().max(0)
}

/// Human-readable interval, e.g. "every 4 hours" or "every 90 minutes".
pub fn format_interval(interval_minutes: i64) -> String {
    match interval_minutes {
        60 => "every hour".to_string(),
        1440 => "every day".to_string(),
        m if m % 60 == 0 => format!("every {} hours", m / 60),
        m => format!("every {m} minutes"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    fn grace() -> Duration {
        Duration::minutes(DEFAULT_GRACE_PERIOD_MINS)
    }

    #[test]
    fn test_compute_next_due() {
        assert_eq!(compute_next_due(t0(), 120), t0() + Duration::minutes(120));
        assert_eq!(compute_next_due(t0(), 15), t0() + Duration::minutes(15));
    }

    #[test]
    fn test_interval_bounds() {
        let bounds = IntervalBounds::default();
        assert_eq!(bounds.validate(15).unwrap(), 15);
        assert_eq!(bounds.validate(1440).unwrap(), 1440);

        let err = bounds.validate(10).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("at least 15"));
        assert!(bounds.validate(1500).unwrap_err().is_validation());

        assert!(IntervalBounds::new(30, 20).is_err());
        assert!(IntervalBounds::new(0, 20).is_err());
    }

    #[test]
    fn test_grace_period_boundaries() {
        let due = t0();
        assert_eq!(status_at(due, due - Duration::seconds(1), grace()), AlertStatus::Pending);
        assert_eq!(status_at(due, due, grace()), AlertStatus::Due);
        assert_eq!(
            status_at(due, due + Duration::minutes(15) - Duration::seconds(1), grace()),
            AlertStatus::Due
        );
        assert_eq!(status_at(due, due + Duration::minutes(15), grace()), AlertStatus::Overdue);
        assert_eq!(status_at(due, due + Duration::hours(6), grace()), AlertStatus::Overdue);
    }

    #[test]
    fn test_schedule_status_minutes_overdue_counts_from_grace_end() {
        let due = t0();
        let status = ScheduleStatus::evaluate(due, due + Duration::minutes(25), grace());
        assert_eq!(status.state, ScheduleState::Overdue);
        assert_eq!(status.minutes_overdue, Some(10));
        assert_eq!(status.minutes_until_due, None);
    }

    #[test]
    fn test_schedule_status_upcoming() {
        let status = ScheduleStatus::evaluate(t0() + Duration::minutes(45), t0(), grace());
        assert_eq!(status.state, ScheduleState::Upcoming);
        assert_eq!(status.minutes_until_due, Some(45));
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(60), "every hour");
        assert_eq!(format_interval(240), "every 4 hours");
        assert_eq!(format_interval(90), "every 90 minutes");
        assert_eq!(format_interval(1440), "every day");
    }
}
