//! Watched-identity data types.

/// Identity plus cached profile metadata for one monitored user.
///
/// `uid` is the immutable key; the rest is refreshed opportunistically on
/// successful fetches. A target without a `live_room_id` is permanently
/// live-ineligible: live checks are skipped, not errored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub uid: String,
    pub display_name: String,
    pub live_room_id: Option<String>,
    pub live_room_title: String,
}

impl WatchTarget {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: String::new(),
            live_room_id: None,
            live_room_title: String::new(),
        }
    }
}

/// Detection state, owned exclusively by the target's watcher.
#[derive(Debug, Default)]
pub(crate) struct WatcherState {
    /// Publish timestamp of the most recent post seen; never rewound.
    pub last_post_watermark: i64,
    /// Last observed live/not-live value.
    pub last_live_status: bool,
    /// Whether profile metadata has been fetched successfully at least once.
    pub initialized: bool,
}
