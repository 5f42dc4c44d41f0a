//! Remote presence watcher: per-target detection, polling coordination,
//! and the detection-to-delivery queue.

pub mod coordinator;
pub mod events;
pub mod target;
pub mod update;
#[allow(clippy::module_inception)]
pub mod watcher;

pub use coordinator::{WatchConfig, WatchCoordinator};
pub use events::{CheckOutcome, NotificationEvent};
pub use target::WatchTarget;
pub use watcher::TargetWatcher;

use async_trait::async_trait;

use crate::credentials::Credentials;
use bili_api::{ApiError, BiliClient, LiveRoomStatus, PostEntry, UserProfile};

/// The remote fetches a check needs. Implemented by [`bili_api::BiliClient`];
/// mocked in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileClient: Send + Sync {
    /// Recent posts for a user, newest first in feed order (pinned and
    /// non-post entries included as the platform returns them).
    async fn fetch_posts(
        &self,
        uid: &str,
        credentials: &Credentials,
    ) -> Result<Vec<PostEntry>, ApiError>;

    /// Live/not-live status and current title of a broadcast room.
    async fn fetch_live_status(
        &self,
        room_id: &str,
        credentials: &Credentials,
    ) -> Result<LiveRoomStatus, ApiError>;

    /// Display name and broadcast-room metadata for a user.
    async fn fetch_profile(
        &self,
        uid: &str,
        credentials: &Credentials,
    ) -> Result<UserProfile, ApiError>;
}

#[async_trait]
impl ProfileClient for BiliClient {
    async fn fetch_posts(
        &self,
        uid: &str,
        credentials: &Credentials,
    ) -> Result<Vec<PostEntry>, ApiError> {
        BiliClient::fetch_posts(self, uid, &credentials.cookies, &credentials.user_agent).await
    }

    async fn fetch_live_status(
        &self,
        room_id: &str,
        credentials: &Credentials,
    ) -> Result<LiveRoomStatus, ApiError> {
        BiliClient::fetch_live_status(self, room_id, &credentials.cookies, &credentials.user_agent)
            .await
    }

    async fn fetch_profile(
        &self,
        uid: &str,
        credentials: &Credentials,
    ) -> Result<UserProfile, ApiError> {
        BiliClient::fetch_profile(self, uid, &credentials.cookies, &credentials.user_agent).await
    }
}
