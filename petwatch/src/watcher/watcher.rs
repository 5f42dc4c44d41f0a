//! Per-target detection.
//!
//! Each watcher owns the detection state for exactly one identity: the post
//! watermark, the last observed live flag, and the lazily fetched profile
//! metadata. Every fetch failure degrades into a [`CheckOutcome`]; nothing
//! here ever propagates an error upward or rewinds a watermark.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use bili_api::{ApiError, PostEntry};

use super::ProfileClient;
use super::events::{CheckOutcome, NotificationEvent};
use super::target::{WatchTarget, WatcherState};
use crate::credentials::Credentials;

pub struct TargetWatcher {
    /// Shared-read snapshot; mutated only by this watcher.
    target: RwLock<WatchTarget>,
    /// Touched only from the coordinator's sweep, one check at a time.
    state: Mutex<WatcherState>,
}

impl TargetWatcher {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            target: RwLock::new(WatchTarget::new(uid)),
            state: Mutex::new(WatcherState::default()),
        }
    }

    /// Snapshot of the cached target metadata.
    pub fn target(&self) -> WatchTarget {
        self.target.read().clone()
    }

    pub(crate) fn last_post_watermark(&self) -> i64 {
        self.state.lock().last_post_watermark
    }

    /// Run one detection pass: posts feed, then live status. Returns the
    /// aggregate outcome and any events detected, in detection order.
    pub async fn check<C: ProfileClient + ?Sized>(
        &self,
        client: &C,
        credentials: &Credentials,
    ) -> (CheckOutcome, Vec<NotificationEvent>) {
        let mut outcome = CheckOutcome::Success;
        let mut events = Vec::new();

        if !self.state.lock().initialized {
            self.ensure_initialized(client, credentials).await;
        }

        let uid = self.target.read().uid.clone();

        match client.fetch_posts(&uid, credentials).await {
            Ok(entries) => {
                let (candidate, dedup) = scan_feed(&entries);
                let mut state = self.state.lock();
                if let Some(entry) = dedup {
                    if entry.publish_ts > state.last_post_watermark {
                        events.push(NotificationEvent::NewPost {
                            target: self.target.read().clone(),
                            post_id: entry.id.clone(),
                            excerpt: entry.excerpt.clone(),
                            timestamp: Utc::now(),
                        });
                    }
                }
                // the watermark only ever advances, event or not
                if let Some(candidate) = candidate {
                    state.last_post_watermark = state.last_post_watermark.max(candidate);
                }
            }
            Err(e) => {
                warn!(%uid, error = %e, "posts fetch failed");
                // skip the live fetch for this round
                return (classify(&e), events);
            }
        }

        let room_id = self.target.read().live_room_id.clone();
        if let Some(room_id) = room_id {
            match client.fetch_live_status(&room_id, credentials).await {
                Ok(status) => {
                    self.target.write().live_room_title = status.title.clone();
                    let mut state = self.state.lock();
                    if status.is_live && !state.last_live_status {
                        events.push(NotificationEvent::LiveStarted {
                            target: self.target.read().clone(),
                            timestamp: Utc::now(),
                        });
                    }
                    state.last_live_status = status.is_live;
                }
                Err(e) => {
                    warn!(%uid, %room_id, error = %e, "live status fetch failed");
                    outcome = outcome.worst(classify(&e));
                }
            }
        }

        (outcome, events)
    }

    /// Fetch profile metadata once. Failures are non-fatal; the fetch is
    /// retried on every check until it succeeds.
    async fn ensure_initialized<C: ProfileClient + ?Sized>(
        &self,
        client: &C,
        credentials: &Credentials,
    ) {
        let uid = self.target.read().uid.clone();
        match client.fetch_profile(&uid, credentials).await {
            Ok(profile) => {
                {
                    let mut target = self.target.write();
                    target.display_name = profile.name;
                    target.live_room_id = profile.room_id;
                    target.live_room_title = profile.room_title;
                }
                self.state.lock().initialized = true;
                debug!(%uid, "target initialized");
            }
            Err(e) => {
                debug!(%uid, error = %e, "profile fetch failed, will retry next check");
            }
        }
    }
}

fn classify(error: &ApiError) -> CheckOutcome {
    if error.is_rate_limited() {
        CheckOutcome::RateLimited
    } else {
        CheckOutcome::TransientFailure
    }
}

/// Scan a feed for the watermark candidate and the dedup identity.
///
/// The candidate is the max publish timestamp over the first two valid
/// (non-filtered) entries, which tolerates a single pinned entry sitting
/// newest-by-position but not newest-by-time.
///
/// The dedup identity is asymmetric on purpose: when the very first feed
/// entry is pinned, the identity is the first valid entry that is *not*
/// pinned; otherwise it is simply the first valid entry.
fn scan_feed(entries: &[PostEntry]) -> (Option<i64>, Option<&PostEntry>) {
    let valid: Vec<&PostEntry> = entries.iter().filter(|e| !e.is_filtered()).collect();

    let candidate = valid.iter().take(2).map(|e| e.publish_ts).max();

    let dedup = if entries.first().is_some_and(|e| e.pinned) {
        valid.iter().copied().find(|e| !e.pinned)
    } else {
        valid.first().copied()
    };

    (candidate, dedup)
}
