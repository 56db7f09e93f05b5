//! Dashboard ordering for open alerts.
//!
//! Overdue alerts come first (longest overdue at the top), then due alerts
//! (soonest due first), then upcoming ones (soonest due first). The key is a
//! pure function of status, due time and `now`.

use chrono::{DateTime, Utc};
use wardwatch_core::{AlertId, AlertStatus};

/// Coarse urgency band, most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UrgencyClass {
    Overdue,
    Due,
    Upcoming,
    Closed,
}

impl From<AlertStatus> for UrgencyClass {
    fn from(status: AlertStatus) -> Self {
        match status {
            AlertStatus::Overdue => Self::Overdue,
            AlertStatus::Due => Self::Due,
            AlertStatus::Pending => Self::Upcoming,
            AlertStatus::Completed | AlertStatus::Dismissed => Self::Closed,
        }
    }
}

/// Sort key: smaller is more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UrgencyKey {
    pub class: UrgencyClass,
    secondary: i64,
}

/// Compute the sort key for an alert.
pub fn urgency_key(status: AlertStatus, due_at: DateTime<Utc>, now: DateTime<Utc>) -> UrgencyKey {
    let class = UrgencyClass::from(status);
    let secondary = match class {
        // Longer elapsed since due_at sorts first
        UrgencyClass::Overdue => -(now - due_at).num_milliseconds(),
        _ => due_at.timestamp_millis(),
    };
    UrgencyKey { class, secondary }
}

/// Sort items by urgency, breaking ties by alert id so the order is total.
pub fn sort_by_urgency<T, F>(items: &mut [T], now: DateTime<Utc>, fields: F)
where
    F: Fn(&T) -> (AlertStatus, DateTime<Utc>, AlertId),
{
    items.sort_by_cached_key(|item| {
        let (status, due_at, id) = fields(item);
        (urgency_key(status, due_at, now), id)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_overdue_due_upcoming_order() {
        let now = now();
        let mut alerts = vec![
            (3, AlertStatus::Pending, now + Duration::minutes(45)),
            (2, AlertStatus::Due, now - Duration::minutes(2)),
            (1, AlertStatus::Overdue, now - Duration::minutes(35)),
        ];
        sort_by_urgency(&mut alerts, now, |(id, status, due)| (*status, *due, *id));

        let order: Vec<_> = alerts.iter().map(|(id, ..)| *id).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_longest_overdue_first() {
        let now = now();
        let long = urgency_key(AlertStatus::Overdue, now - Duration::minutes(90), now);
        let short = urgency_key(AlertStatus::Overdue, now - Duration::minutes(20), now);
        assert!(long < short);
    }

    #[test]
    fn test_soonest_due_first_within_due_and_upcoming() {
        let now = now();
        let earlier = urgency_key(AlertStatus::Due, now - Duration::minutes(10), now);
        let later = urgency_key(AlertStatus::Due, now - Duration::minutes(1), now);
        assert!(earlier < later);

        let soon = urgency_key(AlertStatus::Pending, now + Duration::minutes(5), now);
        let far = urgency_key(AlertStatus::Pending, now + Duration::minutes(50), now);
        assert!(soon < far);
        assert!(later < soon);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let now = now();
        let due = now - Duration::minutes(3);
        let mut alerts = vec![(9, AlertStatus::Due, due), (4, AlertStatus::Due, due)];
        sort_by_urgency(&mut alerts, now, |(id, status, due)| (*status, *due, *id));
        assert_eq!(alerts[0].0, 4);
    }

    #[test]
    fn test_closed_sorts_last() {
        let now = now();
        let closed = urgency_key(AlertStatus::Completed, now - Duration::hours(5), now);
        let upcoming = urgency_key(AlertStatus::Pending, now + Duration::hours(5), now);
        assert!(upcoming < closed);
    }
}
