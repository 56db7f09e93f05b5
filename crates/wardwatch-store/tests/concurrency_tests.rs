//! Concurrency tests for the on-disk store.
//!
//! Separate `VitalsDatabase` handles on the same file behave like separate
//! processes: they share nothing but SQLite's own locking.

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;
use wardwatch_core::AlertStatus;
use wardwatch_store::{
    Admission, AlertInsert, RecordingApplied, ScheduleWrite, VitalsDatabase, Ward,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
}

fn seeded_file() -> (TempDir, std::path::PathBuf, i64) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vitals.db");
    let db = VitalsDatabase::open(&path).unwrap();
    db.upsert_ward(&Ward { id: 1, name: "Ward A".into() }, t0()).unwrap();
    db.upsert_admission(&Admission::new(10, 1, "A-1", "Ada")).unwrap().unwrap();
    let schedule_id = match db.upsert_schedule(10, 60, 5, t0()).unwrap() {
        ScheduleWrite::Created(schedule) => schedule.id,
        other => panic!("expected created schedule, got {other:?}"),
    };
    (dir, path, schedule_id)
}

#[test]
fn test_reopen_keeps_data_and_schema() {
    let (_dir, path, schedule_id) = seeded_file();

    let reopened = VitalsDatabase::open(&path).unwrap();
    assert_eq!(reopened.schema_version().unwrap(), 3);
    let schedule = reopened.get_schedule(schedule_id).unwrap().unwrap();
    assert_eq!(schedule.next_due_at, t0() + Duration::minutes(60));
}

#[test]
fn test_overlapping_ticks_create_one_alert() {
    let (_dir, path, schedule_id) = seeded_file();
    let due = t0() + Duration::minutes(60);
    let workers = 6;
    let barrier = Arc::new(Barrier::new(workers));

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let db = VitalsDatabase::open(&path).unwrap();
                barrier.wait();
                db.insert_open_alert(schedule_id, due, Duration::minutes(15), due)
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let created = results
        .iter()
        .filter(|r| matches!(r, Some(AlertInsert::Created(_))))
        .count();
    let already_open = results
        .iter()
        .filter(|r| matches!(r, Some(AlertInsert::AlreadyOpen(_))))
        .count();

    assert_eq!(created, 1);
    assert_eq!(already_open, workers - 1);

    let db = VitalsDatabase::open(&path).unwrap();
    let open = db.open_alerts().unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].status, AlertStatus::Due);
}

#[test]
fn test_recording_racing_deactivation_never_reopens() {
    let (_dir, path, schedule_id) = seeded_file();
    let due = t0() + Duration::minutes(60);
    let db = VitalsDatabase::open(&path).unwrap();
    db.insert_open_alert(schedule_id, due, Duration::minutes(15), due)
        .unwrap();

    let recorder = {
        let path = path.clone();
        thread::spawn(move || {
            let db = VitalsDatabase::open(&path).unwrap();
            db.apply_recording(10, due, due).unwrap()
        })
    };
    let canceller = {
        let path = path.clone();
        thread::spawn(move || {
            let db = VitalsDatabase::open(&path).unwrap();
            db.deactivate_schedule(schedule_id, due).unwrap()
        })
    };
    let recording = recorder.join().unwrap();
    canceller.join().unwrap();

    // Whichever writer won, the alert was closed exactly once
    let history = db.alerts_for_schedule(schedule_id).unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].status.is_terminal());
    match recording {
        RecordingApplied::Resolved { .. } => {
            assert_eq!(history[0].status, AlertStatus::Completed)
        }
        RecordingApplied::NoActiveSchedule => {
            assert_eq!(history[0].status, AlertStatus::Dismissed)
        }
        RecordingApplied::Stale { .. } => panic!("recording is newer than the anchor"),
        RecordingApplied::AdmissionMissing => panic!("admission was seeded"),
    }

    let schedule = db.get_schedule(schedule_id).unwrap().unwrap();
    assert!(!schedule.active);
    let later = due + Duration::hours(3);
    let retry = db
        .insert_open_alert(schedule_id, later, Duration::minutes(15), later)
        .unwrap();
    assert_eq!(retry, Some(AlertInsert::ScheduleInactive));
}
