//! Delivery sink abstraction.
//!
//! The OS toast backend lives outside the core; the watcher only hands over
//! a title, a body, and a click-activation URL.

use async_trait::async_trait;
use tracing::{info, warn};

/// Terminal for delivery-worthy events.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Fire-and-forget notification; `url` is opened when the user
    /// activates it.
    async fn deliver(&self, title: &str, body: &str, url: &str);

    /// Surface a sustained-failure condition that needs user attention
    /// (typically an authentication challenge to resolve).
    async fn alert_degraded(&self, message: &str);
}

/// Structured-log sink so the core can run headless.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, title: &str, body: &str, url: &str) {
        info!(%title, %body, %url, "notification");
    }

    async fn alert_degraded(&self, message: &str) {
        warn!(%message, "degraded mode");
    }
}
