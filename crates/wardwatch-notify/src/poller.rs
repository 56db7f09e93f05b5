//! Feed polling loop for clients.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use wardwatch_alerts::{AlertFeed, FeedScope, FeedSnapshot};
use wardwatch_core::{Result, WardError};

use crate::dispatcher::{Notification, NotificationDispatcher};
use crate::sound::SoundPlayer;

/// Source of feed snapshots.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the current snapshot for `scope`.
    async fn fetch(&self, scope: FeedScope) -> Result<FeedSnapshot>;
}

/// Reads the feed straight from the local database.
#[derive(Clone)]
pub struct LocalFeedSource {
    feed: AlertFeed,
}

impl LocalFeedSource {
    pub fn new(feed: AlertFeed) -> Self {
        Self { feed }
    }
}

#[async_trait]
impl FeedSource for LocalFeedSource {
    async fn fetch(&self, scope: FeedScope) -> Result<FeedSnapshot> {
        let feed = self.feed.clone();
        tokio::task::spawn_blocking(move || feed.query(scope, Utc::now()))
            .await
            .map_err(|e| WardError::internal(format!("feed query task failed: {e}")))?
    }
}

#[async_trait]
impl<S: FeedSource + ?Sized> FeedSource for Arc<S> {
    async fn fetch(&self, scope: FeedScope) -> Result<FeedSnapshot> {
        (**self).fetch(scope).await
    }
}

/// Counters for one poller run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub polls: u64,
    pub failures: u64,
    pub notifications: u64,
}

/// Poll `source` every `interval` until `shutdown` flips to true.
///
/// Every notification is passed to `sink`. A failed fetch is logged and
/// retried on the next poll; only fatal errors end the loop.
pub async fn run_poller<S, P, F>(
    source: &S,
    scope: FeedScope,
    dispatcher: &mut NotificationDispatcher<P>,
    interval: StdDuration,
    mut shutdown: watch::Receiver<bool>,
    mut sink: F,
) -> Result<PollStats>
where
    S: FeedSource + ?Sized,
    P: SoundPlayer,
    F: FnMut(&Notification) + Send,
{
    let mut stats = PollStats::default();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(scope = %scope, interval_secs = interval.as_secs(), "Feed poller started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match source.fetch(scope).await {
                    Ok(snapshot) => {
                        stats.polls += 1;
                        for notification in dispatcher.observe(&snapshot, Utc::now()) {
                            stats.notifications += 1;
                            sink(&notification);
                        }
                        debug!(entries = snapshot.entries.len(), "Polled feed");
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        stats.failures += 1;
                        warn!(error = %e, "Feed poll failed, retrying next interval");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!(polls = stats.polls, notifications = stats.notifications, "Feed poller stopped");
    Ok(stats)
}
