//! Session credentials harvested from an embedded browser surface.
//!
//! The watcher only ever sees a snapshot of the current cookies and user
//! agent; harvesting (and re-harvesting on request) is an external concern.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Notify, watch};
use tracing::debug;

/// Snapshot of the authenticated browser session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub cookies: String,
    pub user_agent: String,
}

impl Credentials {
    pub fn new(cookies: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            cookies: cookies.into(),
            user_agent: user_agent.into(),
        }
    }

    /// An empty cookie jar means no session has been harvested yet;
    /// unauthenticated requests would immediately trip risk control.
    pub fn is_ready(&self) -> bool {
        !self.cookies.is_empty()
    }
}

/// Supplier of the current session credentials.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Current snapshot. Never blocks on a harvest; returns whatever is
    /// cached (possibly empty before the first harvest completes).
    async fn current(&self) -> Credentials;

    /// Ask the harvesting surface to re-acquire a session. Best-effort and
    /// fire-and-forget; the caller keeps polling `current` for the result.
    fn request_refresh(&self);
}

/// Credential source fed by an external harvester through a watch channel.
pub struct HarvestedCredentials {
    rx: watch::Receiver<Credentials>,
    refresh: Arc<Notify>,
}

/// Writer half handed to the harvesting surface.
pub struct CredentialWriter {
    tx: watch::Sender<Credentials>,
    refresh: Arc<Notify>,
}

impl HarvestedCredentials {
    /// Create a connected writer/source pair.
    pub fn channel() -> (CredentialWriter, Self) {
        let (tx, rx) = watch::channel(Credentials::default());
        let refresh = Arc::new(Notify::new());
        (
            CredentialWriter {
                tx,
                refresh: refresh.clone(),
            },
            Self { rx, refresh },
        )
    }
}

#[async_trait]
impl CredentialSource for HarvestedCredentials {
    async fn current(&self) -> Credentials {
        self.rx.borrow().clone()
    }

    fn request_refresh(&self) {
        debug!("credential refresh requested");
        self.refresh.notify_one();
    }
}

impl CredentialWriter {
    /// Publish a freshly harvested session.
    pub fn set(&self, credentials: Credentials) {
        // send only fails when every receiver is gone, which means the
        // coordinator has shut down
        let _ = self.tx.send(credentials);
    }

    /// Resolves when the watcher asks for a re-harvest.
    pub async fn refresh_requested(&self) {
        self.refresh.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_current_reflects_latest_write() {
        let (writer, source) = HarvestedCredentials::channel();
        assert!(!source.current().await.is_ready());

        writer.set(Credentials::new("SESSDATA=abc", "Mozilla/5.0"));
        let creds = source.current().await;
        assert!(creds.is_ready());
        assert_eq!(creds.cookies, "SESSDATA=abc");

        writer.set(Credentials::new("SESSDATA=def", "Mozilla/5.0"));
        assert_eq!(source.current().await.cookies, "SESSDATA=def");
    }

    #[tokio::test]
    async fn test_refresh_request_wakes_writer() {
        let (writer, source) = HarvestedCredentials::channel();

        source.request_refresh();
        tokio::time::timeout(Duration::from_secs(1), writer.refresh_requested())
            .await
            .expect("refresh request should be observed");
    }
}
