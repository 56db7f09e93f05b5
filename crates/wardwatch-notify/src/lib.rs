//! # wardwatch-notify
//!
//! Client side of wardwatch: polls the alert feed, turns status changes
//! into sound and on-screen notifications, and keeps the user's local
//! sound preferences.

pub mod dispatcher;
pub mod poller;
pub mod preferences;
pub mod sound;

pub use dispatcher::{DisplaySettings, Notification, NotificationDispatcher, NotificationKind};
pub use poller::{FeedSource, LocalFeedSource, PollStats, run_poller};
pub use preferences::{AlertPreferences, PreferenceStore, SoundType};
pub use sound::{SilentPlayer, SoundPlayer, TerminalBell};
