//! Locally persisted alert preferences.
//!
//! Preferences live only on the client, in `~/.wardwatch/alert-preferences.json`:
//!
//! ```json
//! {"enabled":true,"volume":0.7,"soundType":"gentle"}
//! ```
//!
//! A missing or unreadable file is never an error for the dispatcher; it
//! falls back to defaults so notifications keep working.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use wardwatch_core::{Result, WardError};

/// Default playback volume.
pub const DEFAULT_VOLUME: f32 = 0.7;

/// Sound variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundType {
    /// Soft chime, used for due notices
    #[default]
    Gentle,
    /// Insistent alarm, used for overdue notices
    Urgent,
}

impl std::fmt::Display for SoundType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gentle => write!(f, "gentle"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

impl std::str::FromStr for SoundType {
    type Err = WardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gentle" => Ok(Self::Gentle),
            "urgent" => Ok(Self::Urgent),
            other => Err(WardError::validation(
                "sound_type",
                format!("expected 'gentle' or 'urgent', got '{other}'"),
            )),
        }
    }
}

/// Client-side sound preferences.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertPreferences {
    /// Whether notification sounds play at all
    pub enabled: bool,
    /// Playback volume in `0.0..=1.0`
    pub volume: f32,
    /// Sound used for previews
    pub sound_type: SoundType,
}

impl Default for AlertPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: DEFAULT_VOLUME,
            sound_type: SoundType::Gentle,
        }
    }
}

impl AlertPreferences {
    /// Set the volume, clamped to `0.0..=1.0`.
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = clamp_volume(volume);
        self
    }

    /// Whether a notification should make a sound.
    pub fn is_audible(&self) -> bool {
        self.enabled && self.volume > 0.0
    }

    fn sanitized(self) -> Self {
        self.with_volume(self.volume)
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        DEFAULT_VOLUME
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Reads and writes [`AlertPreferences`] as a JSON document.
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the preference file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load preferences, falling back to defaults if the file is missing or
    /// cannot be parsed.
    pub fn load(&self) -> AlertPreferences {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No alert preferences saved, using defaults");
                return AlertPreferences::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot read alert preferences, using defaults");
                return AlertPreferences::default();
            }
        };

        match serde_json::from_str::<AlertPreferences>(&content) {
            Ok(prefs) => prefs.sanitized(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt alert preferences, using defaults");
                AlertPreferences::default()
            }
        }
    }

    /// Persist preferences, creating the parent directory if needed.
    pub fn save(&self, prefs: &AlertPreferences) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| WardError::DirectoryCreation {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let json = serde_json::to_string_pretty(&prefs.sanitized())
            .map_err(|e| WardError::json_parse("alert preferences", e))?;
        std::fs::write(&self.path, json)
            .map_err(|e| WardError::io("writing alert preferences", &self.path, e))?;

        debug!(path = %self.path.display(), "Saved alert preferences");
        Ok(())
    }

    /// Load, modify and save in one step.
    pub fn update<F>(&self, f: F) -> Result<AlertPreferences>
    where
        F: FnOnce(&mut AlertPreferences),
    {
        let mut prefs = self.load();
        f(&mut prefs);
        let prefs = prefs.sanitized();
        self.save(&prefs)?;
        Ok(prefs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let prefs = AlertPreferences::default();
        assert!(prefs.enabled);
        assert!((prefs.volume - 0.7).abs() < f32::EPSILON);
        assert_eq!(prefs.sound_type, SoundType::Gentle);
        assert!(prefs.is_audible());
    }

    #[test]
    fn test_volume_clamped() {
        assert_eq!(AlertPreferences::default().with_volume(1.5).volume, 1.0);
        assert_eq!(AlertPreferences::default().with_volume(-0.2).volume, 0.0);
        assert_eq!(AlertPreferences::default().with_volume(f32::NAN).volume, DEFAULT_VOLUME);
        assert!(!AlertPreferences::default().with_volume(0.0).is_audible());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let store = PreferenceStore::new(dir.path().join("prefs.json"));
        assert_eq!(store.load(), AlertPreferences::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = PreferenceStore::new(dir.path().join("nested").join("prefs.json"));
        let prefs = AlertPreferences {
            enabled: false,
            volume: 0.25,
            sound_type: SoundType::Urgent,
        };
        store.save(&prefs).unwrap();

        assert_eq!(store.load(), prefs);
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"soundType\": \"urgent\""));
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(PreferenceStore::new(path).load(), AlertPreferences::default());
    }

    #[test]
    fn test_partial_file_and_out_of_range_volume() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, r#"{"volume": 3.0}"#).unwrap();

        let prefs = PreferenceStore::new(path).load();
        assert!(prefs.enabled);
        assert_eq!(prefs.volume, 1.0);
    }

    #[test]
    fn test_update() {
        let dir = TempDir::new().unwrap();
        let store = PreferenceStore::new(dir.path().join("prefs.json"));
        let prefs = store.update(|p| p.enabled = false).unwrap();
        assert!(!prefs.enabled);
        assert!(!store.load().enabled);
    }

    #[test]
    fn test_sound_type_parse() {
        assert_eq!("Urgent".parse::<SoundType>().unwrap(), SoundType::Urgent);
        assert!("loud".parse::<SoundType>().unwrap_err().is_validation());
    }
}
