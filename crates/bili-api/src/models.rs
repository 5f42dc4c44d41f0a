//! Response models for the dynamics feed, live-room info, and profile card,
//! plus the flattened types consumers work with.

use serde::Deserialize;

/// Dynamic-entry type tags that are not posts and must be ignored when
/// computing watermarks or dedup identities.
pub const FILTERED_DYNAMIC_TYPES: [&str; 1] = ["DYNAMIC_TYPE_LIVE_RCMD"];

/// The pinned-entry badge text on the feed.
const PINNED_TAG_TEXT: &str = "置顶";

const VIDEO_DYNAMIC_TYPE: &str = "DYNAMIC_TYPE_AV";

/// Broad classification of a feed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostKind {
    /// A published video; the excerpt is the video title.
    Video,
    /// A live-recommendation card injected into the feed; never a post.
    LiveRecommendation,
    /// Everything else (text, images, forwards); the excerpt is the text body.
    Other,
}

impl PostKind {
    fn from_tag(tag: &str) -> Self {
        if tag == VIDEO_DYNAMIC_TYPE {
            PostKind::Video
        } else if FILTERED_DYNAMIC_TYPES.contains(&tag) {
            PostKind::LiveRecommendation
        } else {
            PostKind::Other
        }
    }
}

/// One entry of a user's dynamics feed, in feed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostEntry {
    /// Opaque dynamic id, the dedup identity of the entry.
    pub id: String,
    /// Publish timestamp, unix seconds.
    pub publish_ts: i64,
    /// Whether the entry carries the pinned badge.
    pub pinned: bool,
    pub kind: PostKind,
    /// Short human-readable content for notifications.
    pub excerpt: String,
}

impl PostEntry {
    /// Entries that are not posts (live-recommendation cards) are excluded
    /// from both the watermark candidate and dedup identity.
    pub fn is_filtered(&self) -> bool {
        self.kind == PostKind::LiveRecommendation
    }
}

/// Live/not-live snapshot of a broadcast room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveRoomStatus {
    pub is_live: bool,
    pub title: String,
}

/// Profile metadata for a watched user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub name: String,
    /// Absent when the user has never opened a broadcast room.
    pub room_id: Option<String>,
    pub room_title: String,
}

// --- wire formats ---

#[derive(Debug, Deserialize)]
pub(crate) struct FeedResponse {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<FeedData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeedData {
    #[serde(default)]
    pub items: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeedItem {
    pub id_str: Option<String>,
    #[serde(rename = "type")]
    pub dyn_type: String,
    pub modules: Option<Modules>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Modules {
    pub module_author: Option<ModuleAuthor>,
    pub module_tag: Option<ModuleTag>,
    pub module_dynamic: Option<ModuleDynamic>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModuleAuthor {
    pub pub_ts: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModuleTag {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModuleDynamic {
    pub desc: Option<DynamicDesc>,
    pub major: Option<DynamicMajor>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DynamicDesc {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DynamicMajor {
    pub archive: Option<MajorArchive>,
    pub opus: Option<MajorOpus>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MajorArchive {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MajorOpus {
    pub summary: Option<OpusSummary>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpusSummary {
    #[serde(default)]
    pub text: String,
}

impl FeedItem {
    /// Flatten a wire entry. Entries missing an id or publish timestamp are
    /// dropped (the feed occasionally carries placeholder cards).
    pub(crate) fn into_entry(self) -> Option<PostEntry> {
        let id = self.id_str?;
        let modules = self.modules?;
        let publish_ts = modules.module_author.as_ref()?.pub_ts;
        let pinned = modules
            .module_tag
            .as_ref()
            .is_some_and(|tag| tag.text == PINNED_TAG_TEXT);
        let kind = PostKind::from_tag(&self.dyn_type);

        let excerpt = match &modules.module_dynamic {
            Some(dynamic) => {
                let video_title = dynamic
                    .major
                    .as_ref()
                    .and_then(|major| major.archive.as_ref())
                    .map(|archive| archive.title.clone());
                match (kind, video_title) {
                    (PostKind::Video, Some(title)) => title,
                    _ => dynamic
                        .desc
                        .as_ref()
                        .map(|desc| desc.text.clone())
                        .or_else(|| {
                            dynamic
                                .major
                                .as_ref()
                                .and_then(|major| major.opus.as_ref())
                                .and_then(|opus| opus.summary.as_ref())
                                .map(|summary| summary.text.clone())
                        })
                        .unwrap_or_default(),
                }
            }
            None => String::new(),
        };

        Some(PostEntry {
            id,
            publish_ts,
            pinned,
            kind,
            excerpt,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RoomInfoResponse {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<RoomInfoData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RoomInfoData {
    pub live_status: i64,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileResponse {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<ProfileData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileData {
    #[serde(default)]
    pub name: String,
    pub live_room: Option<ProfileLiveRoom>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileLiveRoom {
    #[serde(default)]
    pub roomid: u64,
    #[serde(default)]
    pub title: String,
}

impl ProfileData {
    pub(crate) fn into_profile(self) -> UserProfile {
        let (room_id, room_title) = match self.live_room {
            // roomid 0 means the user has never opened a room
            Some(room) if room.roomid > 0 => (Some(room.roomid.to_string()), room.title),
            _ => (None, String::new()),
        };
        UserProfile {
            name: self.name,
            room_id,
            room_title,
        }
    }
}
