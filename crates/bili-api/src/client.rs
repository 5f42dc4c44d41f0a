//! HTTP client for the three fetches the presence watcher needs.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{COOKIE, REFERER, USER_AGENT};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ApiError;
use crate::models::{
    FeedResponse, LiveRoomStatus, PostEntry, ProfileResponse, RoomInfoResponse, UserProfile,
};
use crate::wbi::WbiSigner;

const FEED_URL: &str = "https://api.bilibili.com/x/polymer/web-dynamic/v1/feed/space";
const ROOM_INFO_URL: &str = "https://api.live.bilibili.com/room/v1/Room/get_info";
const PROFILE_URL: &str = "https://api.bilibili.com/x/space/wbi/acc/info";
const BASE_REFERER: &str = "https://www.bilibili.com";

const WBI_WEB_LOCATION: &str = "333.999";

/// Short per-request timeout so one unreachable endpoint cannot stall a
/// whole polling sweep.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

pub struct BiliClient {
    client: Client,
    signer: WbiSigner,
}

impl BiliClient {
    pub fn new() -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ApiError::Http)?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        let signer = WbiSigner::new(client.clone());
        Self { client, signer }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &str,
        cookies: &str,
        user_agent: &str,
    ) -> Result<T, ApiError> {
        let api_url = format!("{url}?{query}");
        debug!(url = %api_url, "api request");

        let response = self
            .client
            .get(&api_url)
            .header(USER_AGENT, user_agent)
            .header(REFERER, BASE_REFERER)
            .header(COOKIE, cookies)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 412 {
            // 412 is the platform's request-intercepted status
            return Err(ApiError::Status(412));
        }
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        Ok(response.json::<T>().await?)
    }

    /// Fetch a user's recent dynamics, newest first in feed order. The feed
    /// may lead with a pinned entry and may contain non-post cards; entries
    /// are returned as-is and the caller applies its own filtering.
    pub async fn fetch_posts(
        &self,
        uid: &str,
        cookies: &str,
        user_agent: &str,
    ) -> Result<Vec<PostEntry>, ApiError> {
        let params = vec![
            ("host_mid", uid.to_string()),
            ("web_location", WBI_WEB_LOCATION.to_string()),
        ];
        let query = self.signer.sign(params, cookies, user_agent).await?;

        let response: FeedResponse = self
            .get_json(FEED_URL, &query, cookies, user_agent)
            .await?;

        if response.code != 0 {
            return Err(ApiError::from_platform_code(response.code, response.message));
        }

        let items = response.data.map(|data| data.items).unwrap_or_default();
        Ok(items
            .into_iter()
            .filter_map(|item| item.into_entry())
            .collect())
    }

    /// Fetch the live/not-live status and current title of a broadcast room.
    pub async fn fetch_live_status(
        &self,
        room_id: &str,
        cookies: &str,
        user_agent: &str,
    ) -> Result<LiveRoomStatus, ApiError> {
        let params = vec![("room_id", room_id.to_string())];
        let query = self.signer.sign(params, cookies, user_agent).await?;

        let response: RoomInfoResponse = self
            .get_json(ROOM_INFO_URL, &query, cookies, user_agent)
            .await?;

        if response.code != 0 {
            return Err(ApiError::from_platform_code(response.code, response.message));
        }

        let data = response
            .data
            .ok_or_else(|| ApiError::Other("no room data".to_string()))?;

        Ok(LiveRoomStatus {
            // live_status 1 is live; 0 (idle) and 2 (round replay) are not
            is_live: data.live_status == 1,
            title: data.title,
        })
    }

    /// Fetch profile metadata: display name plus the broadcast room, when
    /// the user has one.
    pub async fn fetch_profile(
        &self,
        uid: &str,
        cookies: &str,
        user_agent: &str,
    ) -> Result<UserProfile, ApiError> {
        let params = vec![
            ("mid", uid.to_string()),
            ("web_location", WBI_WEB_LOCATION.to_string()),
        ];
        let query = self.signer.sign(params, cookies, user_agent).await?;

        let response: ProfileResponse = self
            .get_json(PROFILE_URL, &query, cookies, user_agent)
            .await?;

        if response.code != 0 {
            return Err(ApiError::from_platform_code(response.code, response.message));
        }

        let data = response
            .data
            .ok_or_else(|| ApiError::Other("no profile data".to_string()))?;

        Ok(data.into_profile())
    }
}
