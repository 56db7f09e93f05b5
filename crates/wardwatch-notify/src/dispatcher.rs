//! Notification dispatcher.
//!
//! Turns consecutive feed snapshots into one-shot notifications. The
//! dispatcher remembers the last status and notification count it saw per
//! alert and fires only on edges:
//!
//! - an alert seen as `due` for the first time: gentle, shown for 10s
//! - an alert seen as `overdue` for the first time: urgent, shown for 15s
//! - an overdue alert whose notification count went up: urgent reminder
//!
//! Seeing the same snapshot twice never repeats a notification, and each
//! visible notification expires on its own timer.

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use wardwatch_alerts::{FeedEntry, FeedSnapshot};
use wardwatch_core::{AdmissionId, AlertId, AlertStatus, ClientConfig, Result};

use crate::preferences::{AlertPreferences, SoundType};
use crate::sound::SoundPlayer;

/// Why a notification fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Alert became due
    Due,
    /// Alert became overdue
    Overdue,
    /// Overdue alert reached another re-notify interval
    Reminder,
}

impl NotificationKind {
    /// Sound that accompanies this kind.
    pub fn sound(&self) -> SoundType {
        match self {
            Self::Due => SoundType::Gentle,
            Self::Overdue | Self::Reminder => SoundType::Urgent,
        }
    }
}

/// A notification shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub alert_id: AlertId,
    pub admission_id: AdmissionId,
    pub ward_name: String,
    pub bed_label: String,
    pub patient_name: String,
    pub kind: NotificationKind,
    pub sound: SoundType,
    pub notify_count: u32,
    pub due_at: DateTime<Utc>,
    pub shown_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// False when sound was disabled or playback failed
    pub sound_played: bool,
}

impl Notification {
    /// One-line message, e.g. "Vitals overdue: Ada (Ward A, bed A-1)".
    pub fn message(&self) -> String {
        let what = match self.kind {
            NotificationKind::Due => "Vitals due".to_string(),
            NotificationKind::Overdue => "Vitals overdue".to_string(),
            NotificationKind::Reminder => format!("Vitals still overdue (#{})", self.notify_count),
        };
        format!(
            "{what}: {} ({}, bed {})",
            self.patient_name, self.ward_name, self.bed_label
        )
    }

    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// How long notifications stay on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySettings {
    pub due_display: StdDuration,
    pub overdue_display: StdDuration,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            due_display: StdDuration::from_secs(10),
            overdue_display: StdDuration::from_secs(15),
        }
    }
}

impl DisplaySettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            due_display: StdDuration::from_secs(config.due_toast_secs),
            overdue_display: StdDuration::from_secs(config.overdue_toast_secs),
        }
    }

    fn display_for(&self, kind: NotificationKind) -> Duration {
        let display = match kind {
            NotificationKind::Due => self.due_display,
            NotificationKind::Overdue | NotificationKind::Reminder => self.overdue_display,
        };
        Duration::from_std(display).unwrap_or_else(|_| Duration::seconds(15))
    }
}

#[derive(Debug, Clone, Copy)]
struct Seen {
    status: AlertStatus,
    notify_count: u32,
}

/// Client-side edge detector and sound player.
pub struct NotificationDispatcher<P: SoundPlayer> {
    player: P,
    preferences: AlertPreferences,
    display: DisplaySettings,
    seen: HashMap<AlertId, Seen>,
    visible: Vec<Notification>,
}

impl<P: SoundPlayer> NotificationDispatcher<P> {
    pub fn new(player: P, preferences: AlertPreferences, display: DisplaySettings) -> Self {
        Self {
            player,
            preferences,
            display,
            seen: HashMap::new(),
            visible: Vec::new(),
        }
    }

    pub fn preferences(&self) -> &AlertPreferences {
        &self.preferences
    }

    /// Apply new preferences; takes effect from the next notification.
    pub fn set_preferences(&mut self, preferences: AlertPreferences) {
        self.preferences = preferences;
    }

    /// Process a snapshot and return the notifications it triggers.
    ///
    /// Alerts absent from the snapshot are forgotten, so an alert that
    /// leaves and re-enters the feed notifies again.
    pub fn observe(&mut self, snapshot: &FeedSnapshot, now: DateTime<Utc>) -> Vec<Notification> {
        let mut next_seen = HashMap::with_capacity(snapshot.entries.len());
        let mut fired = Vec::new();

        for entry in &snapshot.entries {
            let previous = self.seen.get(&entry.alert_id).copied();
            if let Some(kind) = edge(previous, entry) {
                fired.push(self.notify(entry, kind, now));
            }
            next_seen.insert(
                entry.alert_id,
                Seen {
                    status: entry.status,
                    notify_count: entry.notify_count,
                },
            );
        }

        let forgotten = self
            .seen
            .keys()
            .filter(|id| !next_seen.contains_key(*id))
            .count();
        if forgotten > 0 {
            debug!(forgotten, "Alerts left the feed");
        }
        self.seen = next_seen;
        self.prune(now);
        self.visible.extend(fired.iter().cloned());
        fired
    }

    fn notify(&mut self, entry: &FeedEntry, kind: NotificationKind, now: DateTime<Utc>) -> Notification {
        let sound = kind.sound();
        let sound_played = if self.preferences.is_audible() {
            match self.player.play(sound, self.preferences.volume) {
                Ok(()) => true,
                Err(e) => {
                    warn!(alert_id = entry.alert_id, error = %e, "Sound failed, showing notification only");
                    false
                }
            }
        } else {
            false
        };

        info!(
            alert_id = entry.alert_id,
            admission_id = entry.admission_id,
            kind = ?kind,
            notify_count = entry.notify_count,
            sound_played,
            "Vitals notification"
        );

        Notification {
            alert_id: entry.alert_id,
            admission_id: entry.admission_id,
            ward_name: entry.ward_name.clone(),
            bed_label: entry.bed_label.clone(),
            patient_name: entry.patient_name.clone(),
            kind,
            sound,
            notify_count: entry.notify_count,
            due_at: entry.due_at,
            shown_at: now,
            expires_at: now + self.display.display_for(kind),
            sound_played,
        }
    }

    /// Drop expired notifications; returns how many were removed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.visible.len();
        self.visible.retain(|n| n.is_visible(now));
        before - self.visible.len()
    }

    /// Notifications still on screen at `now`.
    pub fn visible(&self, now: DateTime<Utc>) -> Vec<&Notification> {
        self.visible.iter().filter(|n| n.is_visible(now)).collect()
    }

    /// Play the preferred sound once, regardless of the enabled flag.
    pub fn preview(&mut self) -> Result<()> {
        self.player
            .play(self.preferences.sound_type, self.preferences.volume)
    }
}

fn edge(previous: Option<Seen>, entry: &FeedEntry) -> Option<NotificationKind> {
    match (entry.status, previous) {
        (AlertStatus::Due, None) => Some(NotificationKind::Due),
        (AlertStatus::Due, Some(seen)) if seen.status == AlertStatus::Pending => {
            Some(NotificationKind::Due)
        }
        (AlertStatus::Overdue, Some(seen)) if seen.status == AlertStatus::Overdue => {
            (entry.notify_count > seen.notify_count).then_some(NotificationKind::Reminder)
        }
        (AlertStatus::Overdue, _) => Some(NotificationKind::Overdue),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seen(status: AlertStatus, notify_count: u32) -> Option<Seen> {
        Some(Seen {
            status,
            notify_count,
        })
    }

    fn entry(status: AlertStatus, notify_count: u32) -> FeedEntry {
        FeedEntry {
            alert_id: 1,
            schedule_id: 1,
            admission_id: 10,
            ward_id: 1,
            ward_name: "Ward A".into(),
            bed_label: "A-1".into(),
            patient_name: "Ada".into(),
            status,
            due_at: Utc::now(),
            interval_minutes: 60,
            acknowledged: false,
            notify_count,
            minutes_overdue: None,
        }
    }

    #[test]
    fn test_edges() {
        use AlertStatus::*;
        assert_eq!(edge(None, &entry(Pending, 0)), None);
        assert_eq!(edge(None, &entry(Due, 0)), Some(NotificationKind::Due));
        assert_eq!(edge(seen(Pending, 0), &entry(Due, 0)), Some(NotificationKind::Due));
        assert_eq!(edge(seen(Due, 0), &entry(Due, 0)), None);
        assert_eq!(edge(seen(Due, 0), &entry(Overdue, 1)), Some(NotificationKind::Overdue));
        assert_eq!(edge(None, &entry(Overdue, 3)), Some(NotificationKind::Overdue));
        assert_eq!(edge(seen(Overdue, 1), &entry(Overdue, 1)), None);
        assert_eq!(edge(seen(Overdue, 1), &entry(Overdue, 2)), Some(NotificationKind::Reminder));
    }

    #[test]
    fn test_display_durations() {
        let display = DisplaySettings::default();
        assert_eq!(display.display_for(NotificationKind::Due), Duration::seconds(10));
        assert_eq!(display.display_for(NotificationKind::Reminder), Duration::seconds(15));
    }

    #[test]
    fn test_message() {
        let n = Notification {
            alert_id: 1,
            admission_id: 10,
            ward_name: "Ward A".into(),
            bed_label: "A-1".into(),
            patient_name: "Ada".into(),
            kind: NotificationKind::Reminder,
            sound: SoundType::Urgent,
            notify_count: 3,
            due_at: Utc::now(),
            shown_at: Utc::now(),
            expires_at: Utc::now(),
            sound_played: true,
        };
        assert_eq!(n.message(), "Vitals still overdue (#3): Ada (Ward A, bed A-1)");
    }
}
