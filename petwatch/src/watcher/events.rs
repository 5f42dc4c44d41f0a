//! Notification events and per-check outcomes.

use chrono::{DateTime, Utc};

use super::target::WatchTarget;

/// Capacity of the detection-to-delivery queue.
pub const QUEUE_CAPACITY: usize = 256;

/// A delivery-worthy state transition detected for one target.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    /// The target started broadcasting (false→true edge only).
    LiveStarted {
        target: WatchTarget,
        timestamp: DateTime<Utc>,
    },
    /// The target published a new public post.
    NewPost {
        target: WatchTarget,
        post_id: String,
        excerpt: String,
        timestamp: DateTime<Utc>,
    },
}

impl NotificationEvent {
    pub fn uid(&self) -> &str {
        match self {
            NotificationEvent::LiveStarted { target, .. } => &target.uid,
            NotificationEvent::NewPost { target, .. } => &target.uid,
        }
    }

    /// When the transition was detected; delivery may lag behind this.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            NotificationEvent::LiveStarted { timestamp, .. }
            | NotificationEvent::NewPost { timestamp, .. } => *timestamp,
        }
    }

    /// Notification headline.
    pub fn title(&self) -> String {
        match self {
            NotificationEvent::LiveStarted { target, .. } => {
                format!("{} - 直播中", target.display_name)
            }
            NotificationEvent::NewPost { target, .. } => {
                format!("{} - 新动态", target.display_name)
            }
        }
    }

    /// Notification body text.
    pub fn body(&self) -> &str {
        match self {
            NotificationEvent::LiveStarted { target, .. } => &target.live_room_title,
            NotificationEvent::NewPost { excerpt, .. } => excerpt,
        }
    }

    /// Click-activation URL.
    pub fn url(&self) -> String {
        match self {
            NotificationEvent::LiveStarted { target, .. } => format!(
                "https://live.bilibili.com/{}",
                target.live_room_id.as_deref().unwrap_or_default()
            ),
            NotificationEvent::NewPost { post_id, .. } => {
                format!("https://t.bilibili.com/{post_id}")
            }
        }
    }
}

/// Tri-state result of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Success,
    /// Network/parse error; retried next sweep.
    TransientFailure,
    /// The platform signaled throttling or stale auth; triggers credential
    /// refresh on top of backoff.
    RateLimited,
}

impl CheckOutcome {
    /// Combine two outcomes, keeping the more severe
    /// (`RateLimited > TransientFailure > Success`).
    pub fn worst(self, other: CheckOutcome) -> CheckOutcome {
        use CheckOutcome::*;
        match (self, other) {
            (RateLimited, _) | (_, RateLimited) => RateLimited,
            (TransientFailure, _) | (_, TransientFailure) => TransientFailure,
            (Success, Success) => Success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_target() -> WatchTarget {
        WatchTarget {
            uid: "475210".to_string(),
            display_name: "测试主播".to_string(),
            live_room_id: Some("21452505".to_string()),
            live_room_title: "晚间杂谈".to_string(),
        }
    }

    #[test]
    fn test_live_event_rendering() {
        let event = NotificationEvent::LiveStarted {
            target: live_target(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.title(), "测试主播 - 直播中");
        assert_eq!(event.body(), "晚间杂谈");
        assert_eq!(event.url(), "https://live.bilibili.com/21452505");
        assert_eq!(event.uid(), "475210");
    }

    #[test]
    fn test_post_event_rendering() {
        let event = NotificationEvent::NewPost {
            target: live_target(),
            post_id: "9001".to_string(),
            excerpt: "新视频标题".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.title(), "测试主播 - 新动态");
        assert_eq!(event.body(), "新视频标题");
        assert_eq!(event.url(), "https://t.bilibili.com/9001");
    }

    #[test]
    fn test_event_carries_detection_time() {
        let detected_at = Utc::now();
        let event = NotificationEvent::LiveStarted {
            target: live_target(),
            timestamp: detected_at,
        };
        assert_eq!(event.timestamp(), detected_at);
    }

    #[test]
    fn test_outcome_precedence() {
        use CheckOutcome::*;
        assert_eq!(Success.worst(Success), Success);
        assert_eq!(Success.worst(TransientFailure), TransientFailure);
        assert_eq!(TransientFailure.worst(RateLimited), RateLimited);
        assert_eq!(RateLimited.worst(Success), RateLimited);
        assert_eq!(RateLimited.worst(TransientFailure), RateLimited);
    }
}
