//! SQLite database layer for vitals schedules and alerts.
//!
//! Every write runs inside an `IMMEDIATE` transaction so the database write
//! lock is taken before any row is read. The schedule and alert invariants
//! are backed by partial unique indexes, which makes them hold across
//! processes as well as across threads sharing one [`VitalsDatabase`].

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{
    Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params, types::Type,
};
use tracing::{debug, info, warn};
use wardwatch_core::{
    AdmissionId, AdmissionStatus, AlertId, AlertStatus, ScheduleId, StaffId, WardId,
    compute_next_due, status_at,
};

use crate::error::{Result, StoreError};
use crate::models::{
    Admission, AdmissionDismissal, Alert, AlertInsert, AlertUpdate, Deactivation, FeedRow,
    FeedScope, RecordingApplied, Schedule, ScheduleWrite, Ward,
};

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 3;

/// Maximum retries for database lock errors.
const DB_LOCK_MAX_RETRIES: u32 = 5;

/// Initial delay for database lock retry (in milliseconds).
const DB_LOCK_INITIAL_DELAY_MS: u64 = 50;

/// Maximum delay for database lock retry.
const DB_LOCK_MAX_DELAY: Duration = Duration::from_secs(5);

/// How long SQLite itself waits on a busy database before reporting it.
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

/// SQL list of open alert statuses.
const OPEN_STATUSES: &str = "('pending', 'due', 'overdue')";

const SCHEDULE_COLUMNS: &str = "id, admission_id, interval_minutes, next_due_at, anchored_at, \
     last_recorded_at, is_active, created_by, created_at, updated_at";

const ALERT_COLUMNS: &str = "id, schedule_id, admission_id, due_at, status, acknowledged_at, \
     acknowledged_by, notify_count, last_notified_at, created_at, updated_at, closed_at";

/// Format a timestamp for storage.
///
/// Fixed-width UTC with millisecond precision, so string comparison in SQL
/// matches chronological order.
pub fn to_db_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_time(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn get_time(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(idx)?;
    parse_time(idx, &value)
}

fn get_opt_time(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let value: Option<String> = row.get(idx)?;
    value.map(|v| parse_time(idx, &v)).transpose()
}

fn get_parsed<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = wardwatch_core::WardError>,
{
    let value: String = row.get(idx)?;
    value
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// SQLite database for vitals schedules and alerts.
#[derive(Clone)]
pub struct VitalsDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl VitalsDatabase {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        debug!(path = %path.as_ref().display(), journal_mode = %mode, "Opened vitals database");
        Self::init(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    /// Execute a database operation with automatic retry on lock errors.
    fn with_retry<T, F>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 0;
        let mut delay = Duration::from_millis(DB_LOCK_INITIAL_DELAY_MS);

        loop {
            attempt += 1;

            match f() {
                Ok(result) => {
                    if attempt > 1 {
                        info!(attempt, operation, "Database operation succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(e) if e.is_database_locked() && attempt <= DB_LOCK_MAX_RETRIES => {
                    warn!(
                        attempt,
                        max_retries = DB_LOCK_MAX_RETRIES,
                        delay_ms = delay.as_millis(),
                        operation,
                        "Database locked, retrying with backoff"
                    );

                    std::thread::sleep(delay);

                    // Exponential backoff with cap
                    delay = std::cmp::min(delay * 2, DB_LOCK_MAX_DELAY);
                }
                Err(e) if e.is_database_locked() => {
                    return Err(StoreError::DatabaseLocked {
                        retry_count: attempt - 1,
                        max_retries: DB_LOCK_MAX_RETRIES,
                        message: format!("{operation}: {e}"),
                    });
                }
                Err(e) => {
                    if attempt > 1 {
                        warn!(attempt, operation, error = %e, "Database operation failed after retries");
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Run `f` inside an immediate transaction, retrying on lock errors.
    fn write<T, F>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut(&Transaction<'_>) -> Result<T>,
    {
        self.with_retry(operation, || {
            let mut conn = self.lock()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
    }

    /// Run a read against the connection.
    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    // ============ Migrations ============

    /// Run database migrations.
    fn migrate(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Migration(format!("failed to acquire lock: {e}")))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )?;

        if current_version < SCHEMA_VERSION {
            info!(
                current = current_version,
                target = SCHEMA_VERSION,
                "Running database migrations"
            );
            Self::run_migrations(&conn, current_version)
                .map_err(|e| StoreError::Migration(e.to_string()))?;
        }

        Ok(())
    }

    /// Run migrations from current version to target.
    fn run_migrations(conn: &Connection, from_version: i32) -> Result<()> {
        if from_version < 1 {
            Self::migration_v1(conn)?;
        }
        if from_version < 2 {
            Self::migration_v2(conn)?;
        }
        if from_version < 3 {
            Self::migration_v3(conn)?;
        }

        Ok(())
    }

    /// Migration to version 1: wards, admissions and schedules.
    fn migration_v1(conn: &Connection) -> Result<()> {
        debug!("Running migration v1: registry and schedules");

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS wards (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS admissions (
                id INTEGER PRIMARY KEY,
                ward_id INTEGER NOT NULL REFERENCES wards(id),
                bed_label TEXT NOT NULL,
                patient_name TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'admitted'
                    CHECK (status IN ('admitted', 'discharged', 'transferred')),
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_admissions_ward
             ON admissions(ward_id);

            CREATE TABLE IF NOT EXISTS vitals_schedules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                admission_id INTEGER NOT NULL REFERENCES admissions(id),
                interval_minutes INTEGER NOT NULL CHECK (interval_minutes > 0),
                next_due_at TEXT NOT NULL,
                anchored_at TEXT NOT NULL,
                last_recorded_at TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_by INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- One active schedule per admission
            CREATE UNIQUE INDEX IF NOT EXISTS idx_schedules_one_active
             ON vitals_schedules(admission_id) WHERE is_active = 1;

            CREATE INDEX IF NOT EXISTS idx_schedules_due
             ON vitals_schedules(is_active, next_due_at);

            INSERT INTO schema_version (version) VALUES (1);",
        )?;

        info!("Migration v1 completed");
        Ok(())
    }

    /// Migration to version 2: alert instances.
    fn migration_v2(conn: &Connection) -> Result<()> {
        debug!("Running migration v2: vitals alerts");

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS vitals_alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                schedule_id INTEGER NOT NULL REFERENCES vitals_schedules(id),
                admission_id INTEGER NOT NULL REFERENCES admissions(id),
                due_at TEXT NOT NULL,
                status TEXT NOT NULL
                    CHECK (status IN ('pending', 'due', 'overdue', 'completed', 'dismissed')),
                acknowledged_at TEXT,
                acknowledged_by INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                closed_at TEXT
            );

            -- At most one open alert per schedule
            CREATE UNIQUE INDEX IF NOT EXISTS idx_alerts_one_open
             ON vitals_alerts(schedule_id) WHERE status IN ('pending', 'due', 'overdue');

            -- One alert per due occurrence, so a closed occurrence is never raised again
            CREATE UNIQUE INDEX IF NOT EXISTS idx_alerts_occurrence
             ON vitals_alerts(schedule_id, due_at);

            CREATE INDEX IF NOT EXISTS idx_alerts_status
             ON vitals_alerts(status);

            CREATE INDEX IF NOT EXISTS idx_alerts_admission
             ON vitals_alerts(admission_id);

            INSERT INTO schema_version (version) VALUES (2);",
        )?;

        info!("Migration v2 completed");
        Ok(())
    }

    /// Migration to version 3: overdue re-notification markers.
    fn migration_v3(conn: &Connection) -> Result<()> {
        debug!("Running migration v3: re-notification markers");

        conn.execute_batch(
            "ALTER TABLE vitals_alerts ADD COLUMN notify_count INTEGER NOT NULL DEFAULT 0;
             ALTER TABLE vitals_alerts ADD COLUMN last_notified_at TEXT;
             INSERT INTO schema_version (version) VALUES (3);",
        )?;

        info!("Migration v3 completed");
        Ok(())
    }

    /// Current schema version.
    pub fn schema_version(&self) -> Result<i32> {
        self.read(|conn| {
            Ok(conn.query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )?)
        })
    }

    // ============ Registry ============

    /// Insert or rename a ward.
    pub fn upsert_ward(&self, ward: &Ward, now: DateTime<Utc>) -> Result<()> {
        self.write("upsert_ward", |tx| {
            tx.execute(
                "INSERT INTO wards (id, name, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    updated_at = excluded.updated_at",
                params![ward.id, ward.name, to_db_time(now)],
            )?;
            Ok(())
        })?;

        debug!(ward_id = ward.id, name = %ward.name, "Upserted ward");
        Ok(())
    }

    /// Get a ward by id.
    pub fn get_ward(&self, ward_id: WardId) -> Result<Option<Ward>> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name FROM wards WHERE id = ?1",
                    params![ward_id],
                    |row| {
                        Ok(Ward {
                            id: row.get(0)?,
                            name: row.get(1)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    /// All wards, ordered by name.
    pub fn list_wards(&self) -> Result<Vec<Ward>> {
        self.read(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM wards ORDER BY name, id")?;
            let wards = stmt
                .query_map([], |row| {
                    Ok(Ward {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(wards)
        })
    }

    /// Insert or update an admission projection.
    ///
    /// Returns `None` when the admission's ward is unknown.
    pub fn upsert_admission(&self, admission: &Admission) -> Result<Option<Admission>> {
        let saved = self.write("upsert_admission", |tx| {
            if !Self::ward_exists(tx, admission.ward_id)? {
                return Ok(None);
            }

            tx.execute(
                "INSERT INTO admissions (id, ward_id, bed_label, patient_name, status, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    ward_id = excluded.ward_id,
                    bed_label = excluded.bed_label,
                    patient_name = excluded.patient_name,
                    status = excluded.status,
                    updated_at = excluded.updated_at",
                params![
                    admission.id,
                    admission.ward_id,
                    admission.bed_label,
                    admission.patient_name,
                    admission.status.as_str(),
                    to_db_time(admission.updated_at),
                ],
            )?;

            Self::admission_in(tx, admission.id)
        })?;

        if saved.is_some() {
            debug!(admission_id = admission.id, ward_id = admission.ward_id, "Upserted admission");
        }
        Ok(saved)
    }

    /// Get an admission by id.
    pub fn get_admission(&self, admission_id: AdmissionId) -> Result<Option<Admission>> {
        self.read(|conn| Self::admission_in(conn, admission_id))
    }

    /// Admissions on a ward, ordered by bed.
    pub fn admissions_on_ward(&self, ward_id: WardId) -> Result<Vec<Admission>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, ward_id, bed_label, patient_name, status, updated_at
                 FROM admissions WHERE ward_id = ?1
                 ORDER BY bed_label, id",
            )?;
            let admissions = stmt
                .query_map(params![ward_id], Self::row_to_admission)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(admissions)
        })
    }

    /// Move a monitorable admission to another ward/bed and mark it transferred.
    ///
    /// Returns `None` if the admission is missing or already discharged.
    pub fn transfer_admission(
        &self,
        admission_id: AdmissionId,
        ward_id: WardId,
        bed_label: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Admission>> {
        self.write("transfer_admission", |tx| {
            let changed = tx.execute(
                "UPDATE admissions
                 SET ward_id = ?2, bed_label = ?3, status = 'transferred', updated_at = ?4
                 WHERE id = ?1 AND status != 'discharged'",
                params![admission_id, ward_id, bed_label, to_db_time(now)],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            Self::admission_in(tx, admission_id)
        })
    }

    fn ward_exists(conn: &Connection, ward_id: WardId) -> Result<bool> {
        Ok(conn
            .query_row("SELECT 1 FROM wards WHERE id = ?1", params![ward_id], |_| Ok(()))
            .optional()?
            .is_some())
    }

    fn admission_in(conn: &Connection, admission_id: AdmissionId) -> Result<Option<Admission>> {
        Ok(conn
            .query_row(
                "SELECT id, ward_id, bed_label, patient_name, status, updated_at
                 FROM admissions WHERE id = ?1",
                params![admission_id],
                Self::row_to_admission,
            )
            .optional()?)
    }

    // ============ Schedules ============

    /// Create the admission's schedule, or update the interval of its active one.
    ///
    /// Either way `next_due_at` becomes `now + interval_minutes`. Updating
    /// dismisses the open alert of the superseded occurrence in the same
    /// transaction.
    pub fn upsert_schedule(
        &self,
        admission_id: AdmissionId,
        interval_minutes: i64,
        created_by: StaffId,
        now: DateTime<Utc>,
    ) -> Result<ScheduleWrite> {
        self.write("upsert_schedule", |tx| {
            let Some(admission) = Self::admission_in(tx, admission_id)? else {
                return Ok(ScheduleWrite::AdmissionMissing);
            };
            if !admission.status.is_monitorable() {
                return Ok(ScheduleWrite::AdmissionNotMonitorable(admission.status));
            }

            let now_s = to_db_time(now);
            let next_due_s = to_db_time(compute_next_due(now, interval_minutes));

            match Self::active_schedule_in(tx, admission_id)? {
                None => {
                    tx.execute(
                        "INSERT INTO vitals_schedules
                         (admission_id, interval_minutes, next_due_at, anchored_at,
                          last_recorded_at, is_active, created_by, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, NULL, 1, ?5, ?4, ?4)",
                        params![admission_id, interval_minutes, next_due_s, now_s, created_by],
                    )?;
                    let schedule = Self::schedule_in(tx, tx.last_insert_rowid())?
                        .ok_or(StoreError::Database(rusqlite::Error::QueryReturnedNoRows))?;
                    Ok(ScheduleWrite::Created(schedule))
                }
                Some(existing) => {
                    let superseded = Self::open_alert_id_in(tx, existing.id)?;
                    if let Some(alert_id) = superseded {
                        Self::close_alert_in(tx, alert_id, AlertStatus::Dismissed, now)?;
                    }

                    tx.execute(
                        "UPDATE vitals_schedules
                         SET interval_minutes = ?2, next_due_at = ?3, anchored_at = ?4,
                             updated_at = ?4
                         WHERE id = ?1",
                        params![existing.id, interval_minutes, next_due_s, now_s],
                    )?;
                    let schedule = Self::schedule_in(tx, existing.id)?
                        .ok_or(StoreError::Database(rusqlite::Error::QueryReturnedNoRows))?;
                    Ok(ScheduleWrite::Updated {
                        schedule,
                        superseded_alert: superseded,
                    })
                }
            }
        })
    }

    /// Get a schedule by id.
    pub fn get_schedule(&self, schedule_id: ScheduleId) -> Result<Option<Schedule>> {
        self.read(|conn| Self::schedule_in(conn, schedule_id))
    }

    /// The admission's active schedule, if any.
    pub fn active_schedule_for_admission(
        &self,
        admission_id: AdmissionId,
    ) -> Result<Option<Schedule>> {
        self.read(|conn| Self::active_schedule_in(conn, admission_id))
    }

    /// Every schedule the admission has had, newest first.
    pub fn schedules_for_admission(&self, admission_id: AdmissionId) -> Result<Vec<Schedule>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SCHEDULE_COLUMNS} FROM vitals_schedules
                 WHERE admission_id = ?1 ORDER BY id DESC"
            ))?;
            let schedules = stmt
                .query_map(params![admission_id], Self::row_to_schedule)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(schedules)
        })
    }

    /// Active schedules with `next_due_at <= cutoff` whose current occurrence
    /// has not been raised yet.
    pub fn schedules_due_by(&self, cutoff: DateTime<Utc>) -> Result<Vec<Schedule>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SCHEDULE_COLUMNS} FROM vitals_schedules s
                 WHERE s.is_active = 1 AND s.next_due_at <= ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM vitals_alerts a
                       WHERE a.schedule_id = s.id
                         AND (a.status IN {OPEN_STATUSES} OR a.due_at = s.next_due_at)
                   )
                 ORDER BY s.next_due_at, s.id"
            ))?;
            let schedules = stmt
                .query_map(params![to_db_time(cutoff)], Self::row_to_schedule)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(schedules)
        })
    }

    /// Deactivate a schedule and dismiss its open alert in one transaction.
    pub fn deactivate_schedule(
        &self,
        schedule_id: ScheduleId,
        now: DateTime<Utc>,
    ) -> Result<Deactivation> {
        self.write("deactivate_schedule", |tx| {
            let Some(schedule) = Self::schedule_in(tx, schedule_id)? else {
                return Ok(Deactivation::Missing);
            };
            if !schedule.active {
                return Ok(Deactivation::AlreadyInactive);
            }

            tx.execute(
                "UPDATE vitals_schedules SET is_active = 0, updated_at = ?2 WHERE id = ?1",
                params![schedule_id, to_db_time(now)],
            )?;

            let mut dismissed_alerts = Vec::new();
            if let Some(alert_id) = Self::open_alert_id_in(tx, schedule_id)? {
                Self::close_alert_in(tx, alert_id, AlertStatus::Dismissed, now)?;
                dismissed_alerts.push(alert_id);
            }

            Ok(Deactivation::Deactivated { dismissed_alerts })
        })
    }

    /// Deactivate every schedule of an admission and dismiss its open alerts,
    /// optionally marking the admission discharged in the same transaction.
    ///
    /// Returns `None` when the admission does not exist.
    pub fn dismiss_admission(
        &self,
        admission_id: AdmissionId,
        discharge: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<AdmissionDismissal>> {
        self.write("dismiss_admission", |tx| {
            if Self::admission_in(tx, admission_id)?.is_none() {
                return Ok(None);
            }
            let now_s = to_db_time(now);

            if discharge {
                tx.execute(
                    "UPDATE admissions SET status = 'discharged', updated_at = ?2 WHERE id = ?1",
                    params![admission_id, now_s],
                )?;
            }

            let deactivated_schedules = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM vitals_schedules WHERE admission_id = ?1 AND is_active = 1",
                )?;
                stmt.query_map(params![admission_id], |row| row.get::<_, ScheduleId>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            };
            tx.execute(
                "UPDATE vitals_schedules SET is_active = 0, updated_at = ?2
                 WHERE admission_id = ?1 AND is_active = 1",
                params![admission_id, now_s],
            )?;

            let dismissed_alerts = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT id FROM vitals_alerts
                     WHERE admission_id = ?1 AND status IN {OPEN_STATUSES}"
                ))?;
                stmt.query_map(params![admission_id], |row| row.get::<_, AlertId>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            };
            for alert_id in &dismissed_alerts {
                Self::close_alert_in(tx, *alert_id, AlertStatus::Dismissed, now)?;
            }

            Ok(Some(AdmissionDismissal {
                deactivated_schedules,
                dismissed_alerts,
            }))
        })
    }

    /// Apply a vitals recording: complete the open alert (if any) and advance
    /// the active schedule from the recording time.
    ///
    /// A recording at or before the current anchor (a backdated entry, or one
    /// taken before the last interval edit) is reported as
    /// [`RecordingApplied::Stale`] and leaves the schedule and its open alert
    /// untouched. Otherwise `next_due_at` always moves strictly past the
    /// completed occurrence.
    pub fn apply_recording(
        &self,
        admission_id: AdmissionId,
        recorded_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<RecordingApplied> {
        self.write("apply_recording", |tx| {
            if Self::admission_in(tx, admission_id)?.is_none() {
                return Ok(RecordingApplied::AdmissionMissing);
            }
            let Some(schedule) = Self::active_schedule_in(tx, admission_id)? else {
                return Ok(RecordingApplied::NoActiveSchedule);
            };

            if recorded_at <= schedule.anchored_at {
                return Ok(RecordingApplied::Stale { schedule });
            }

            let completed_alert = Self::open_alert_id_in(tx, schedule.id)?;
            if let Some(alert_id) = completed_alert {
                Self::close_alert_in(tx, alert_id, AlertStatus::Completed, now)?;
            }

            let next_due = compute_next_due(recorded_at, schedule.interval_minutes);

            tx.execute(
                "UPDATE vitals_schedules
                 SET next_due_at = ?2, anchored_at = ?3, last_recorded_at = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![
                    schedule.id,
                    to_db_time(next_due),
                    to_db_time(recorded_at),
                    to_db_time(recorded_at),
                    to_db_time(now),
                ],
            )?;

            let schedule = Self::schedule_in(tx, schedule.id)?
                .ok_or(StoreError::Database(rusqlite::Error::QueryReturnedNoRows))?;
            Ok(RecordingApplied::Resolved {
                schedule,
                completed_alert,
            })
        })
    }

    fn schedule_in(conn: &Connection, schedule_id: ScheduleId) -> Result<Option<Schedule>> {
        Ok(conn
            .query_row(
                &format!("SELECT {SCHEDULE_COLUMNS} FROM vitals_schedules WHERE id = ?1"),
                params![schedule_id],
                Self::row_to_schedule,
            )
            .optional()?)
    }

    fn active_schedule_in(conn: &Connection, admission_id: AdmissionId) -> Result<Option<Schedule>> {
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {SCHEDULE_COLUMNS} FROM vitals_schedules
                     WHERE admission_id = ?1 AND is_active = 1"
                ),
                params![admission_id],
                Self::row_to_schedule,
            )
            .optional()?)
    }

    // ============ Alerts ============

    /// Atomically create the open alert for a schedule's current occurrence.
    ///
    /// Nothing is created when the schedule is inactive, when `next_due_at`
    /// lies beyond `not_after`, when another alert is still open, or when the
    /// occurrence was already raised. The status is derived from `now`, so a
    /// late tick creates the alert directly as `due` or `overdue`.
    pub fn insert_open_alert(
        &self,
        schedule_id: ScheduleId,
        now: DateTime<Utc>,
        grace: chrono::Duration,
        not_after: DateTime<Utc>,
    ) -> Result<Option<AlertInsert>> {
        self.write("insert_open_alert", |tx| {
            let Some(schedule) = Self::schedule_in(tx, schedule_id)? else {
                return Ok(Some(AlertInsert::ScheduleMissing));
            };
            if !schedule.active {
                return Ok(Some(AlertInsert::ScheduleInactive));
            }
            if schedule.next_due_at > not_after {
                return Ok(None);
            }

            let status = status_at(schedule.next_due_at, now, grace);
            let now_s = to_db_time(now);
            let due_s = to_db_time(schedule.next_due_at);

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO vitals_alerts
                 (schedule_id, admission_id, due_at, status, created_at, updated_at)
                 SELECT id, admission_id, ?2, ?3, ?4, ?4
                 FROM vitals_schedules
                 WHERE id = ?1 AND is_active = 1 AND next_due_at = ?2",
                params![schedule_id, due_s, status.as_str(), now_s],
            )?;

            if inserted == 1 {
                let alert = Self::alert_in(tx, tx.last_insert_rowid())?
                    .ok_or(StoreError::Database(rusqlite::Error::QueryReturnedNoRows))?;
                return Ok(Some(AlertInsert::Created(alert)));
            }

            let (existing_id, existing_status): (AlertId, String) = tx.query_row(
                &format!(
                    "SELECT id, status FROM vitals_alerts
                     WHERE schedule_id = ?1 AND (status IN {OPEN_STATUSES} OR due_at = ?2)
                     ORDER BY (status IN {OPEN_STATUSES}) DESC, id DESC
                     LIMIT 1"
                ),
                params![schedule_id, due_s],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            if matches!(existing_status.as_str(), "pending" | "due" | "overdue") {
                Ok(Some(AlertInsert::AlreadyOpen(existing_id)))
            } else {
                Ok(Some(AlertInsert::OccurrenceClosed(existing_id)))
            }
        })
    }

    /// Compare-and-set an alert's status from `from` to `to`.
    ///
    /// Returns false if the alert is no longer in `from`.
    pub fn transition_alert(
        &self,
        alert_id: AlertId,
        from: AlertStatus,
        to: AlertStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Ok(false);
        }
        self.write("transition_alert", |tx| {
            let closed_at = to.is_terminal().then(|| to_db_time(now));
            let changed = tx.execute(
                "UPDATE vitals_alerts
                 SET status = ?3, updated_at = ?4, closed_at = COALESCE(?5, closed_at)
                 WHERE id = ?1 AND status = ?2",
                params![alert_id, from.as_str(), to.as_str(), to_db_time(now), closed_at],
            )?;
            Ok(changed == 1)
        })
    }

    /// Raise the overdue notification counter to `count`.
    ///
    /// Only applies while the alert is overdue and the stored count is lower,
    /// so replays and overlapping ticks never double-count.
    pub fn mark_notified(&self, alert_id: AlertId, count: u32, now: DateTime<Utc>) -> Result<bool> {
        self.write("mark_notified", |tx| {
            let changed = tx.execute(
                "UPDATE vitals_alerts
                 SET notify_count = ?2, last_notified_at = ?3, updated_at = ?3
                 WHERE id = ?1 AND status = 'overdue' AND notify_count < ?2",
                params![alert_id, count, to_db_time(now)],
            )?;
            Ok(changed == 1)
        })
    }

    /// Stamp acknowledgement on an open alert without closing it.
    pub fn acknowledge_alert(
        &self,
        alert_id: AlertId,
        staff_id: StaffId,
        now: DateTime<Utc>,
    ) -> Result<AlertUpdate> {
        self.write("acknowledge_alert", |tx| {
            let Some(alert) = Self::alert_in(tx, alert_id)? else {
                return Ok(AlertUpdate::Missing);
            };
            if alert.status.is_terminal() {
                return Ok(AlertUpdate::AlreadyClosed(alert));
            }

            let now_s = to_db_time(now);
            tx.execute(
                &format!(
                    "UPDATE vitals_alerts
                     SET acknowledged_at = ?2, acknowledged_by = ?3, updated_at = ?2
                     WHERE id = ?1 AND status IN {OPEN_STATUSES}"
                ),
                params![alert_id, now_s, staff_id],
            )?;

            let alert = Self::alert_in(tx, alert_id)?
                .ok_or(StoreError::Database(rusqlite::Error::QueryReturnedNoRows))?;
            Ok(AlertUpdate::Applied(alert))
        })
    }

    /// Close an open alert as dismissed on behalf of a staff member.
    ///
    /// An earlier acknowledgement is kept; otherwise the dismissal stamps one.
    pub fn dismiss_alert(
        &self,
        alert_id: AlertId,
        staff_id: StaffId,
        now: DateTime<Utc>,
    ) -> Result<AlertUpdate> {
        self.write("dismiss_alert", |tx| {
            let Some(alert) = Self::alert_in(tx, alert_id)? else {
                return Ok(AlertUpdate::Missing);
            };
            if alert.status.is_terminal() {
                return Ok(AlertUpdate::AlreadyClosed(alert));
            }

            tx.execute(
                "UPDATE vitals_alerts
                 SET acknowledged_at = COALESCE(acknowledged_at, ?2),
                     acknowledged_by = COALESCE(acknowledged_by, ?3)
                 WHERE id = ?1",
                params![alert_id, to_db_time(now), staff_id],
            )?;
            Self::close_alert_in(tx, alert_id, AlertStatus::Dismissed, now)?;

            let alert = Self::alert_in(tx, alert_id)?
                .ok_or(StoreError::Database(rusqlite::Error::QueryReturnedNoRows))?;
            Ok(AlertUpdate::Applied(alert))
        })
    }

    /// Get an alert by id.
    pub fn get_alert(&self, alert_id: AlertId) -> Result<Option<Alert>> {
        self.read(|conn| Self::alert_in(conn, alert_id))
    }

    /// All open alerts, oldest occurrence first.
    pub fn open_alerts(&self) -> Result<Vec<Alert>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ALERT_COLUMNS} FROM vitals_alerts
                 WHERE status IN {OPEN_STATUSES}
                 ORDER BY due_at, id"
            ))?;
            let alerts = stmt
                .query_map([], Self::row_to_alert)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(alerts)
        })
    }

    /// Full alert history of a schedule, oldest first.
    pub fn alerts_for_schedule(&self, schedule_id: ScheduleId) -> Result<Vec<Alert>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ALERT_COLUMNS} FROM vitals_alerts
                 WHERE schedule_id = ?1 ORDER BY due_at, id"
            ))?;
            let alerts = stmt
                .query_map(params![schedule_id], Self::row_to_alert)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(alerts)
        })
    }

    /// The open alert of a schedule, if any.
    pub fn open_alert_for_schedule(&self, schedule_id: ScheduleId) -> Result<Option<Alert>> {
        self.read(|conn| match Self::open_alert_id_in(conn, schedule_id)? {
            Some(alert_id) => Self::alert_in(conn, alert_id),
            None => Ok(None),
        })
    }

    fn alert_in(conn: &Connection, alert_id: AlertId) -> Result<Option<Alert>> {
        Ok(conn
            .query_row(
                &format!("SELECT {ALERT_COLUMNS} FROM vitals_alerts WHERE id = ?1"),
                params![alert_id],
                Self::row_to_alert,
            )
            .optional()?)
    }

    fn open_alert_id_in(conn: &Connection, schedule_id: ScheduleId) -> Result<Option<AlertId>> {
        Ok(conn
            .query_row(
                &format!(
                    "SELECT id FROM vitals_alerts
                     WHERE schedule_id = ?1 AND status IN {OPEN_STATUSES}"
                ),
                params![schedule_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Move an open alert to a terminal status. No-op if already terminal.
    fn close_alert_in(
        conn: &Connection,
        alert_id: AlertId,
        to: AlertStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let now_s = to_db_time(now);
        let changed = conn.execute(
            &format!(
                "UPDATE vitals_alerts SET status = ?2, closed_at = ?3, updated_at = ?3
                 WHERE id = ?1 AND status IN {OPEN_STATUSES}"
            ),
            params![alert_id, to.as_str(), now_s],
        )?;
        Ok(changed == 1)
    }

    // ============ Feed ============

    /// Open alerts in `scope`, joined with schedule, admission and ward.
    ///
    /// A single statement, so the result is one consistent snapshot.
    pub fn feed_rows(&self, scope: FeedScope) -> Result<Vec<FeedRow>> {
        let (ward_id, admission_id) = match scope {
            FeedScope::Ward(id) => (Some(id), None),
            FeedScope::Admission(id) => (None, Some(id)),
            FeedScope::All => (None, None),
        };

        self.read(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT a.id, a.schedule_id, a.admission_id, ad.ward_id, w.name,
                        ad.bed_label, ad.patient_name, a.status, a.due_at,
                        s.interval_minutes, a.acknowledged_at, a.notify_count
                 FROM vitals_alerts a
                 JOIN vitals_schedules s ON s.id = a.schedule_id
                 JOIN admissions ad ON ad.id = a.admission_id
                 JOIN wards w ON w.id = ad.ward_id
                 WHERE a.status IN {OPEN_STATUSES}
                   AND (?1 IS NULL OR ad.ward_id = ?1)
                   AND (?2 IS NULL OR a.admission_id = ?2)
                 ORDER BY a.id"
            ))?;
            let rows = stmt
                .query_map(params![ward_id, admission_id], |row| {
                    Ok(FeedRow {
                        alert_id: row.get(0)?,
                        schedule_id: row.get(1)?,
                        admission_id: row.get(2)?,
                        ward_id: row.get(3)?,
                        ward_name: row.get(4)?,
                        bed_label: row.get(5)?,
                        patient_name: row.get(6)?,
                        status: get_parsed(row, 7)?,
                        due_at: get_time(row, 8)?,
                        interval_minutes: row.get(9)?,
                        acknowledged_at: get_opt_time(row, 10)?,
                        notify_count: row.get(11)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Get the underlying connection (for advanced queries).
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    // ============ Row helpers ============

    fn row_to_admission(row: &Row) -> rusqlite::Result<Admission> {
        Ok(Admission {
            id: row.get(0)?,
            ward_id: row.get(1)?,
            bed_label: row.get(2)?,
            patient_name: row.get(3)?,
            status: get_parsed::<AdmissionStatus>(row, 4)?,
            updated_at: get_time(row, 5)?,
        })
    }

    fn row_to_schedule(row: &Row) -> rusqlite::Result<Schedule> {
        Ok(Schedule {
            id: row.get(0)?,
            admission_id: row.get(1)?,
            interval_minutes: row.get(2)?,
            next_due_at: get_time(row, 3)?,
            anchored_at: get_time(row, 4)?,
            last_recorded_at: get_opt_time(row, 5)?,
            active: row.get::<_, i64>(6)? != 0,
            created_by: row.get(7)?,
            created_at: get_time(row, 8)?,
            updated_at: get_time(row, 9)?,
        })
    }

    fn row_to_alert(row: &Row) -> rusqlite::Result<Alert> {
        Ok(Alert {
            id: row.get(0)?,
            schedule_id: row.get(1)?,
            admission_id: row.get(2)?,
            due_at: get_time(row, 3)?,
            status: get_parsed::<AlertStatus>(row, 4)?,
            acknowledged_at: get_opt_time(row, 5)?,
            acknowledged_by: row.get(6)?,
            notify_count: row.get(7)?,
            last_notified_at: get_opt_time(row, 8)?,
            created_at: get_time(row, 9)?,
            updated_at: get_time(row, 10)?,
            closed_at: get_opt_time(row, 11)?,
        })
    }
}
