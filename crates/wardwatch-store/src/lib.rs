//! # wardwatch-store
//!
//! Durable storage for wards, admissions, vitals schedules and alert
//! instances, backed by SQLite.
//!
//! The store exposes atomic primitives rather than raw field writes: each
//! method is a single transaction that either applies a whole transition or
//! reports why it did not. Callers outside `wardwatch-alerts` should not need
//! to use it directly.
//!
//! ## Invariants held by the schema
//!
//! - one active schedule per admission
//! - at most one open (`pending | due | overdue`) alert per schedule
//! - at most one alert per `(schedule, due_at)` occurrence

pub mod db;
pub mod error;
pub mod models;

pub use db::{VitalsDatabase, to_db_time};
pub use error::{Result, StoreError};
pub use models::{
    Admission, AdmissionDismissal, Alert, AlertInsert, AlertUpdate, Deactivation, FeedRow,
    FeedScope, RecordingApplied, Schedule, ScheduleWrite, Ward,
};
