//! End-to-end scenarios for the alert engine.
//!
//! Each test drives the lifecycle manager and escalation clock with explicit
//! timestamps, the way the clock would see them in production.

use chrono::{DateTime, Duration, TimeZone, Utc};
use wardwatch_alerts::{
    AlertFeed, AlertLifecycleManager, EscalationClock, FeedScope, LifecycleSettings,
    RecordingOutcome,
};
use wardwatch_core::{AlertStatus, WardError};
use wardwatch_store::VitalsDatabase;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
}

fn mins(m: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(m)
}

struct Ward {
    lifecycle: AlertLifecycleManager,
    clock: EscalationClock,
    feed: AlertFeed,
}

fn setup() -> Ward {
    let db = VitalsDatabase::open_in_memory().unwrap();
    let settings = LifecycleSettings::default();
    let lifecycle = AlertLifecycleManager::new(db.clone(), settings);
    lifecycle.register_ward(1, "Ward A", t0()).unwrap();
    lifecycle.register_ward(2, "Ward B", t0()).unwrap();
    lifecycle.register_admission(10, 1, "A-1", "Ada", t0()).unwrap();
    lifecycle.register_admission(20, 2, "B-1", "Grace", t0()).unwrap();

    Ward {
        clock: EscalationClock::new(lifecycle.clone()),
        feed: AlertFeed::new(db, settings.grace_period),
        lifecycle,
    }
}

fn status_of(ward: &Ward, alert_id: i64) -> AlertStatus {
    ward.lifecycle
        .database()
        .get_alert(alert_id)
        .unwrap()
        .unwrap()
        .status
}

#[test]
fn scenario_due_then_overdue_after_grace() {
    let ward = setup();
    let schedule = ward.lifecycle.set_schedule(10, 120, 1, t0()).unwrap();
    assert_eq!(schedule.next_due_at, mins(120));

    ward.clock.tick(mins(110)).unwrap();
    let alert = ward.lifecycle.open_alerts().unwrap().remove(0);
    assert_eq!(alert.status, AlertStatus::Pending);
    assert_eq!(alert.due_at, mins(120));

    ward.clock.tick(mins(120)).unwrap();
    assert_eq!(status_of(&ward, alert.id), AlertStatus::Due);

    ward.clock.tick(mins(134)).unwrap();
    assert_eq!(status_of(&ward, alert.id), AlertStatus::Due);

    ward.clock.tick(mins(135)).unwrap();
    assert_eq!(status_of(&ward, alert.id), AlertStatus::Overdue);

    // A tick replayed with an earlier clock never moves it back
    ward.clock.tick(mins(125)).unwrap();
    assert_eq!(status_of(&ward, alert.id), AlertStatus::Overdue);
}

#[test]
fn scenario_recording_while_due_completes_and_reschedules() {
    let ward = setup();
    let schedule = ward.lifecycle.set_schedule(10, 120, 1, t0()).unwrap();
    ward.clock.tick(mins(125)).unwrap();
    let alert = ward.lifecycle.open_alerts().unwrap().remove(0);
    assert_eq!(alert.status, AlertStatus::Due);

    let outcome = ward
        .lifecycle
        .resolve_by_recording(10, mins(130), mins(130))
        .unwrap();
    let RecordingOutcome::Resolved {
        schedule: advanced,
        completed_alert,
    } = outcome
    else {
        panic!("expected the schedule to be resolved");
    };
    assert_eq!(completed_alert, Some(alert.id));
    assert_eq!(advanced.id, schedule.id);
    assert_eq!(advanced.next_due_at, mins(250));
    assert_eq!(advanced.next_due_at, advanced.anchored_at + Duration::minutes(120));
    assert_eq!(status_of(&ward, alert.id), AlertStatus::Completed);

    // The next occurrence is raised from the new due time
    ward.clock.tick(mins(250)).unwrap();
    let next = ward.lifecycle.open_alerts().unwrap().remove(0);
    assert_eq!(next.due_at, mins(250));
    assert_ne!(next.id, alert.id);
    assert_eq!(ward.lifecycle.alert_history(schedule.id).unwrap().len(), 2);
}

#[test]
fn scenario_discharge_before_due_never_alerts() {
    let ward = setup();
    let schedule = ward.lifecycle.set_schedule(10, 120, 1, t0()).unwrap();
    ward.clock.tick(mins(50)).unwrap();

    let dismissal = ward.lifecycle.discharge_admission(10, mins(50)).unwrap();
    assert_eq!(dismissal.deactivated_schedules, vec![schedule.id]);
    assert!(dismissal.dismissed_alerts.is_empty());

    for m in [110, 120, 135, 300] {
        let report = ward.clock.tick(mins(m)).unwrap();
        assert_eq!(report.created, 0);
    }
    assert!(ward.lifecycle.alert_history(schedule.id).unwrap().is_empty());
    let schedule = ward.lifecycle.database().get_schedule(schedule.id).unwrap().unwrap();
    assert!(!schedule.active);

    let err = ward.lifecycle.set_schedule(10, 60, 1, mins(60)).unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn scenario_feed_scoped_to_ward() {
    let ward = setup();
    ward.lifecycle.set_schedule(10, 60, 1, t0()).unwrap();
    ward.lifecycle.set_schedule(20, 60, 1, t0()).unwrap();
    ward.clock.tick(mins(61)).unwrap();

    let ward_a = ward.feed.query(FeedScope::Ward(1), mins(61)).unwrap();
    assert_eq!(ward_a.entries.len(), 1);
    assert_eq!(ward_a.entries[0].admission_id, 10);
    assert_eq!(ward_a.entries[0].bed_label, "A-1");
    assert_eq!(ward_a.entries[0].status, AlertStatus::Due);
    assert_eq!(ward_a.entries[0].interval_minutes, 60);
    assert_eq!(ward_a.summary.due, 1);

    let all = ward.feed.query(FeedScope::All, mins(61)).unwrap();
    assert_eq!(all.entries.len(), 2);
}

#[test]
fn ranking_overdue_due_upcoming() {
    let ward = setup();
    ward.lifecycle.register_admission(11, 1, "A-2", "Lin", t0()).unwrap();
    // Overdue since 20 minutes at now = mins(100): due at 65
    ward.lifecycle.set_schedule(10, 65, 1, t0()).unwrap();
    // Due since 2 minutes: due at 98
    ward.lifecycle.set_schedule(11, 98, 1, t0()).unwrap();
    ward.clock.tick(mins(100)).unwrap();

    // Upcoming: created at 55, due at 55 + 60 = 115, inside the lookahead
    ward.lifecycle.register_admission(12, 1, "A-3", "Mo", t0()).unwrap();
    ward.lifecycle.set_schedule(12, 60, 1, mins(55)).unwrap();
    ward.clock.tick(mins(100)).unwrap();

    let snapshot = ward.feed.query(FeedScope::Ward(1), mins(100)).unwrap();
    let order: Vec<_> = snapshot
        .entries
        .iter()
        .map(|e| (e.admission_id, e.status))
        .collect();
    assert_eq!(
        order,
        vec![
            (10, AlertStatus::Overdue),
            (11, AlertStatus::Due),
            (12, AlertStatus::Pending),
        ]
    );
    assert_eq!(snapshot.entries[0].minutes_overdue, Some(20));
    assert_eq!(snapshot.summary.total, 3);
}

#[test]
fn overdue_renotification_counter() {
    let ward = setup();
    ward.lifecycle.set_schedule(10, 60, 1, t0()).unwrap();

    // Overdue period starts at 75; tick every minute for 46 minutes of it
    let mut counts = Vec::new();
    for m in 60..=121 {
        ward.clock.tick(mins(m)).unwrap();
        if let Some(alert) = ward.lifecycle.open_alerts().unwrap().first() {
            if counts.last() != Some(&alert.notify_count) {
                counts.push(alert.notify_count);
            }
        }
    }
    assert_eq!(counts, vec![0, 1, 2, 3, 4]);

    let alert = ward.lifecycle.open_alerts().unwrap().remove(0);
    assert_eq!(alert.last_notified_at, Some(mins(120)));
}

#[test]
fn interval_edit_supersedes_open_alert() {
    let ward = setup();
    let schedule = ward.lifecycle.set_schedule(10, 60, 1, t0()).unwrap();
    ward.clock.tick(mins(61)).unwrap();
    let alert = ward.lifecycle.open_alerts().unwrap().remove(0);

    let edited = ward.lifecycle.set_schedule(10, 240, 2, mins(62)).unwrap();
    assert_eq!(edited.id, schedule.id);
    assert_eq!(edited.next_due_at, mins(62 + 240));
    assert_eq!(status_of(&ward, alert.id), AlertStatus::Dismissed);

    ward.clock.tick(mins(63)).unwrap();
    assert!(ward.lifecycle.open_alerts().unwrap().is_empty());
}

#[test]
fn dismissed_occurrence_waits_for_next_recording() {
    let ward = setup();
    ward.lifecycle.set_schedule(10, 60, 1, t0()).unwrap();
    ward.clock.tick(mins(61)).unwrap();
    let alert = ward.lifecycle.open_alerts().unwrap().remove(0);

    ward.lifecycle.dismiss(alert.id, 3, mins(62)).unwrap();
    let report = ward.clock.tick(mins(90)).unwrap();
    assert_eq!(report.created, 0);
    assert!(ward.lifecycle.open_alerts().unwrap().is_empty());

    ward.lifecycle
        .resolve_by_recording(10, mins(95), mins(95))
        .unwrap();
    ward.clock.tick(mins(155)).unwrap();
    assert_eq!(ward.lifecycle.open_alerts().unwrap().len(), 1);
}

#[test]
fn transfer_keeps_monitoring_in_new_ward() {
    let ward = setup();
    ward.lifecycle.set_schedule(10, 60, 1, t0()).unwrap();
    ward.clock.tick(mins(61)).unwrap();

    let moved = ward.lifecycle.transfer_admission(10, 2, "B-4", mins(62)).unwrap();
    assert_eq!(moved.ward_id, 2);

    assert!(ward.feed.query(FeedScope::Ward(1), mins(62)).unwrap().entries.is_empty());
    let ward_b = ward.feed.query(FeedScope::Ward(2), mins(62)).unwrap();
    assert!(ward_b.entries.iter().any(|e| e.admission_id == 10 && e.bed_label == "B-4"));

    let err = ward.lifecycle.transfer_admission(10, 99, "X-1", mins(63)).unwrap_err();
    assert!(matches!(err, WardError::WardNotFound { ward_id: 99 }));
}

#[test]
fn feed_snapshot_serializes_for_clients() {
    let ward = setup();
    ward.lifecycle.set_schedule(10, 60, 1, t0()).unwrap();
    ward.clock.tick(mins(80)).unwrap();

    let snapshot = ward.feed.query(FeedScope::Admission(10), mins(80)).unwrap();
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["entries"][0]["status"], "overdue");
    assert_eq!(json["entries"][0]["minutes_overdue"], 5);
    assert_eq!(json["summary"]["overdue"], 1);
}

#[test]
fn backdated_recording_keeps_patient_on_the_feed() {
    let ward = setup();
    ward.lifecycle.set_schedule(10, 60, 1, t0()).unwrap();
    ward.clock.tick(mins(70)).unwrap();
    let alert = ward.lifecycle.open_alerts().unwrap().remove(0);

    let outcome = ward
        .lifecycle
        .resolve_by_recording(10, mins(-10), mins(70))
        .unwrap();
    assert!(matches!(outcome, RecordingOutcome::Stale { .. }));

    ward.clock.tick(mins(100)).unwrap();
    assert_eq!(status_of(&ward, alert.id), AlertStatus::Overdue);
    let feed = ward.feed.query(FeedScope::Admission(10), mins(100)).unwrap();
    assert_eq!(feed.entries.len(), 1);
    assert_eq!(feed.entries[0].alert_id, alert.id);

    // A current recording still resolves it
    ward.lifecycle
        .resolve_by_recording(10, mins(101), mins(101))
        .unwrap();
    assert_eq!(status_of(&ward, alert.id), AlertStatus::Completed);
}

#[test]
fn recording_taken_before_interval_edit_does_not_silence_schedule() {
    let ward = setup();
    ward.lifecycle.set_schedule(10, 60, 1, t0()).unwrap();
    let edited = ward.lifecycle.set_schedule(10, 120, 1, mins(30)).unwrap();
    assert_eq!(edited.next_due_at, mins(150));

    let outcome = ward
        .lifecycle
        .resolve_by_recording(10, mins(20), mins(31))
        .unwrap();
    assert!(matches!(outcome, RecordingOutcome::Stale { .. }));

    ward.clock.tick(mins(150)).unwrap();
    let open = ward.lifecycle.open_alerts().unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].due_at, mins(150));
    assert_eq!(open[0].status, AlertStatus::Due);
}
