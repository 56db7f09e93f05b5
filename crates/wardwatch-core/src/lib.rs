//! # wardwatch-core
//!
//! Core types, errors, and utilities for the wardwatch vitals scheduler.
//!
//! This crate provides:
//! - [`WardError`] - Error taxonomy shared by every wardwatch crate
//! - [`due`] - The due-time calculator and grace-period arithmetic
//! - [`types`] - Identifiers and the alert/admission status enums
//! - [`config`] - YAML configuration
//! - [`logging`] - Tracing setup and lifecycle event macros
//!
//! ## Example
//!
//! ```no_run
//! use wardwatch_core::{WardwatchConfig, logging};
//!
//! fn main() -> wardwatch_core::Result<()> {
//!     let _guard = logging::init_logging(None, false)?;
//!     let config = WardwatchConfig::load()?;
//!     tracing::info!(tick_secs = config.escalation.tick_interval_secs, "config loaded");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod due;
pub mod error;
pub mod logging;
pub mod types;

// Re-export main types for convenience
pub use config::{ClientConfig, EscalationConfig, ScheduleConfig, WardwatchConfig};
pub use due::{IntervalBounds, ScheduleState, ScheduleStatus, compute_next_due, status_at};
pub use error::{Result, WardError};
pub use logging::{LogGuard, init_logging};
pub use types::{AdmissionId, AdmissionStatus, AlertId, AlertStatus, ScheduleId, StaffId, WardId};
