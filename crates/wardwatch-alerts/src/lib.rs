//! # wardwatch-alerts
//!
//! The vitals alert engine:
//!
//! - [`AlertLifecycleManager`] owns every schedule and alert transition
//! - [`EscalationClock`] drives `pending -> due -> overdue` on a fixed tick
//! - [`AlertFeed`] is the ranked, ward- or admission-scoped read model
//! - [`ranker`] is the pure dashboard ordering

pub mod clock;
pub mod feed;
pub mod lifecycle;
pub mod ranker;

pub use clock::{EscalationClock, TickReport};
pub use feed::{AlertFeed, FeedEntry, FeedSnapshot, FeedSummary};
pub use lifecycle::{AlertLifecycleManager, LifecycleSettings, RecordingOutcome, notification_count};
pub use ranker::{UrgencyClass, UrgencyKey, sort_by_urgency, urgency_key};
pub use wardwatch_store::FeedScope;
