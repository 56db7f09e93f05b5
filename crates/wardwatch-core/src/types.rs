//! Shared type definitions used across wardwatch crates.
//!
//! Identifiers are plain integer row ids handed to us by the admission,
//! staff, and ward collaborators; statuses are the closed sets the schedule
//! and alert state machines move through.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WardError;

/// Identifier of a patient admission (one stay in a ward/bed).
pub type AdmissionId = i64;

/// Identifier of a vitals schedule.
pub type ScheduleId = i64;

/// Identifier of a single alert instance.
pub type AlertId = i64;

/// Identifier of a ward.
pub type WardId = i64;

/// Identifier of a staff member (supplied by the identity source).
pub type StaffId = i64;

/// Lifecycle status of an alert instance.
///
/// `Pending`, `Due` and `Overdue` are open; `Completed` and `Dismissed` are
/// terminal. Open statuses only ever move forward, and any open status may
/// move to a terminal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// Materialised ahead of its due time
    Pending,
    /// Due time reached, still inside the grace period
    Due,
    /// Grace period elapsed without a recording
    Overdue,
    /// Closed by a vitals recording
    Completed,
    /// Closed without a recording (acknowledgement, cancellation, discharge)
    Dismissed,
}

impl AlertStatus {
    /// All statuses that count as "open".
    pub const OPEN: [AlertStatus; 3] = [AlertStatus::Pending, AlertStatus::Due, AlertStatus::Overdue];

    /// Returns true for `pending`, `due` and `overdue`.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Due | Self::Overdue)
    }

    /// Returns true for `completed` and `dismissed`.
    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    /// Position along the open progression (`pending < due < overdue`).
    ///
    /// Terminal statuses sit above every open status.
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Due => 1,
            Self::Overdue => 2,
            Self::Completed | Self::Dismissed => 3,
        }
    }

    /// Whether moving from `self` to `next` is a legal forward transition.
    ///
    /// Open statuses may advance (`pending -> due -> overdue`) or close.
    /// Nothing leaves a terminal status and nothing moves backwards.
    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() > self.rank()
    }

    /// Stable lowercase name used in storage and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Due => "due",
            Self::Overdue => "overdue",
            Self::Completed => "completed",
            Self::Dismissed => "dismissed",
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = WardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "due" => Ok(Self::Due),
            "overdue" => Ok(Self::Overdue),
            "completed" => Ok(Self::Completed),
            "dismissed" => Ok(Self::Dismissed),
            other => Err(WardError::validation(
                "status",
                format!("unknown alert status '{other}'"),
            )),
        }
    }
}

/// Admission status as reported by the admission source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionStatus {
    /// Patient is on the ward
    #[default]
    Admitted,
    /// Patient has left; monitoring ends
    Discharged,
    /// Patient moved to another ward/bed; monitoring continues
    Transferred,
}

impl AdmissionStatus {
    /// Returns true if vitals monitoring may run for this admission.
    pub fn is_monitorable(&self) -> bool {
        matches!(self, Self::Admitted | Self::Transferred)
    }

    /// Stable lowercase name used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admitted => "admitted",
            Self::Discharged => "discharged",
            Self::Transferred => "transferred",
        }
    }
}

impl std::fmt::Display for AdmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdmissionStatus {
    type Err = WardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admitted" => Ok(Self::Admitted),
            "discharged" => Ok(Self::Discharged),
            "transferred" => Ok(Self::Transferred),
            other => Err(WardError::validation(
                "admission_status",
                format!("unknown admission status '{other}'"),
            )),
        }
    }
}

/// Check that a collaborator-supplied identifier is a plausible row id.
pub fn validate_id(field: &str, id: i64) -> Result<i64, WardError> {
    if id <= 0 {
        return Err(WardError::validation(
            field,
            format!("must be a positive identifier, got {id}"),
        ));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_terminal_sets() {
        for status in AlertStatus::OPEN {
            assert!(status.is_open());
        }
        assert!(AlertStatus::Completed.is_terminal());
        assert!(AlertStatus::Dismissed.is_terminal());
    }

    #[test]
    fn test_transitions_are_monotonic() {
        assert!(AlertStatus::Pending.can_transition_to(AlertStatus::Due));
        assert!(AlertStatus::Pending.can_transition_to(AlertStatus::Overdue));
        assert!(AlertStatus::Due.can_transition_to(AlertStatus::Overdue));
        assert!(AlertStatus::Overdue.can_transition_to(AlertStatus::Completed));
        assert!(AlertStatus::Pending.can_transition_to(AlertStatus::Dismissed));

        assert!(!AlertStatus::Overdue.can_transition_to(AlertStatus::Due));
        assert!(!AlertStatus::Due.can_transition_to(AlertStatus::Pending));
        assert!(!AlertStatus::Due.can_transition_to(AlertStatus::Due));
        assert!(!AlertStatus::Completed.can_transition_to(AlertStatus::Dismissed));
        assert!(!AlertStatus::Dismissed.can_transition_to(AlertStatus::Due));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("overdue".parse::<AlertStatus>().unwrap(), AlertStatus::Overdue);
        assert_eq!(AlertStatus::Completed.to_string(), "completed");
        assert!("invalid_status".parse::<AlertStatus>().is_err());

        assert_eq!(
            "transferred".parse::<AdmissionStatus>().unwrap(),
            AdmissionStatus::Transferred
        );
        assert!(!AdmissionStatus::Discharged.is_monitorable());
    }

    #[test]
    fn test_validate_id() {
        assert_eq!(validate_id("admission_id", 7).unwrap(), 7);
        let err = validate_id("ward_id", 0).unwrap_err();
        assert!(err.is_validation());
    }
}
