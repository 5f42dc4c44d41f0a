//! Polling coordination.
//!
//! One background task owns the watcher registry, sweeps every registered
//! target in sequence, adapts its own cadence to aggregate sweep outcomes,
//! triggers credential recovery on rate limiting, and drains detected events
//! to the delivery sink.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ProfileClient;
use super::events::{CheckOutcome, NotificationEvent, QUEUE_CAPACITY};
use super::target::WatchTarget;
use super::watcher::TargetWatcher;
use crate::credentials::CredentialSource;
use crate::notification::NotificationSink;
use crate::{Error, Result};

/// Poll interval for the bounded startup credential wait.
const STARTUP_POLL: Duration = Duration::from_millis(250);

/// Shown when the delay ceiling is reached; asks the user to resolve the
/// platform's verification challenge through the harvesting surface.
const DEGRADED_MESSAGE: &str = "获取动态信息失败，请在出现的窗口中点击完成验证码";

/// Configuration for the watch coordinator.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Steady-state delay between sweeps.
    pub floor: Duration,
    /// Hard ceiling the delay holds at under sustained failure.
    pub ceiling: Duration,
    /// How long to wait for a harvested credential snapshot at startup.
    pub startup_wait: Duration,
    /// Initial live-start notification toggle.
    pub live_notify: bool,
    /// Initial new-post notification toggle.
    pub dynamic_notify: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(15),
            ceiling: Duration::from_secs(960),
            startup_wait: Duration::from_secs(10),
            live_notify: true,
            dynamic_notify: true,
        }
    }
}

/// Adaptive sweep delay: doubles on failure, relaxes by a factor of three
/// toward the floor on all-success sweeps, holds at the ceiling.
#[derive(Debug)]
struct Backoff {
    current: Duration,
    floor: Duration,
    ceiling: Duration,
}

impl Backoff {
    fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            current: floor,
            floor,
            ceiling,
        }
    }

    fn current(&self) -> Duration {
        self.current
    }

    fn grow(&mut self) {
        self.current = (self.current * 2).min(self.ceiling);
    }

    fn relax(&mut self) {
        if self.current > self.floor {
            self.current = (self.current / 3).max(self.floor);
        }
    }

    fn at_ceiling(&self) -> bool {
        self.current >= self.ceiling
    }
}

/// Aggregate outcomes of one sweep.
#[derive(Debug, Default)]
struct SweepStats {
    checked: usize,
    transient: usize,
    rate_limited: usize,
}

impl SweepStats {
    fn record(&mut self, outcome: CheckOutcome) {
        self.checked += 1;
        match outcome {
            CheckOutcome::Success => {}
            CheckOutcome::TransientFailure => self.transient += 1,
            CheckOutcome::RateLimited => self.rate_limited += 1,
        }
    }

    fn all_success(&self) -> bool {
        self.checked > 0 && self.transient == 0 && self.rate_limited == 0
    }
}

/// The watch coordinator service.
pub struct WatchCoordinator<C, S, N>
where
    C: ProfileClient + 'static,
    S: CredentialSource + 'static,
    N: NotificationSink + 'static,
{
    /// Registry of watchers, keyed by uid. Sweeps snapshot the values under
    /// the lock and release it before checking, so registry edits never
    /// block on an in-progress sweep (they take effect next sweep).
    registry: Mutex<HashMap<String, Arc<TargetWatcher>>>,
    client: Arc<C>,
    credentials: Arc<S>,
    sink: Arc<N>,
    /// Detection-to-delivery queue; producer is the sweep, consumer is the
    /// deliver step of the same loop.
    events_tx: mpsc::Sender<NotificationEvent>,
    events_rx: tokio::sync::Mutex<mpsc::Receiver<NotificationEvent>>,
    live_notify: AtomicBool,
    dynamic_notify: AtomicBool,
    cancellation: CancellationToken,
    config: WatchConfig,
}

impl<C, S, N> WatchCoordinator<C, S, N>
where
    C: ProfileClient + 'static,
    S: CredentialSource + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(
        client: Arc<C>,
        credentials: Arc<S>,
        sink: Arc<N>,
        initial_watch: &[String],
        config: WatchConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(QUEUE_CAPACITY);

        let mut registry = HashMap::new();
        for uid in initial_watch {
            if uid.is_empty() {
                warn!("skipping empty uid in initial watch list");
                continue;
            }
            registry
                .entry(uid.clone())
                .or_insert_with(|| Arc::new(TargetWatcher::new(uid.clone())));
        }

        Self {
            registry: Mutex::new(registry),
            client,
            credentials,
            sink,
            events_tx,
            events_rx: tokio::sync::Mutex::new(events_rx),
            live_notify: AtomicBool::new(config.live_notify),
            dynamic_notify: AtomicBool::new(config.dynamic_notify),
            cancellation: CancellationToken::new(),
            config,
        }
    }

    /// Register a new target. No-op when the uid is already watched; the
    /// watcher joins the next sweep's snapshot.
    pub fn add_watch(&self, uid: &str) -> Result<()> {
        if uid.is_empty() {
            return Err(Error::validation("uid must not be empty"));
        }

        let mut registry = self.registry.lock();
        if registry.contains_key(uid) {
            return Ok(());
        }
        registry.insert(uid.to_string(), Arc::new(TargetWatcher::new(uid)));
        info!(%uid, "watch added");
        Ok(())
    }

    /// Remove and discard a target's watcher, if present.
    pub fn remove_watch(&self, uid: &str) {
        if self.registry.lock().remove(uid).is_some() {
            info!(%uid, "watch removed");
        }
    }

    /// Snapshot of all watched targets, for UI/API consumers.
    pub fn list_targets(&self) -> Vec<WatchTarget> {
        self.registry
            .lock()
            .values()
            .map(|watcher| watcher.target())
            .collect()
    }

    /// Toggle live-start notifications. Detection keeps running either way;
    /// the toggle is applied at delivery time.
    pub fn set_live_notify(&self, enabled: bool) {
        self.live_notify.store(enabled, Ordering::Relaxed);
    }

    /// Toggle new-post notifications.
    pub fn set_dynamic_notify(&self, enabled: bool) {
        self.dynamic_notify.store(enabled, Ordering::Relaxed);
    }

    /// Request cooperative shutdown. In-flight requests complete; no further
    /// checks are started.
    pub fn stop(&self) {
        self.cancellation.cancel();
    }

    /// Run the polling loop until `stop` is called.
    pub async fn run(&self) {
        self.wait_for_credentials().await;

        let mut backoff = Backoff::new(self.config.floor, self.config.ceiling);
        let mut degraded_alerted = false;

        info!("watch loop started");
        while !self.cancellation.is_cancelled() {
            let stats = self.sweep().await;
            self.reconcile(&stats, &mut backoff, &mut degraded_alerted)
                .await;
            self.deliver().await;

            tokio::select! {
                _ = self.cancellation.cancelled() => break,
                _ = tokio::time::sleep(backoff.current()) => {}
            }
        }
        info!("watch loop stopped");
    }

    /// Bounded wait for a harvested session before the first sweep;
    /// unauthenticated requests would immediately classify as rate-limited
    /// and thrash the backoff.
    async fn wait_for_credentials(&self) {
        let deadline = Instant::now() + self.config.startup_wait;
        loop {
            if self.credentials.current().await.is_ready() {
                return;
            }
            if Instant::now() >= deadline {
                warn!("no credentials after startup wait, proceeding anyway");
                return;
            }
            tokio::select! {
                _ = self.cancellation.cancelled() => return,
                _ = tokio::time::sleep(STARTUP_POLL) => {}
            }
        }
    }

    /// One pass over a snapshot of the registry.
    async fn sweep(&self) -> SweepStats {
        let watchers: Vec<Arc<TargetWatcher>> =
            self.registry.lock().values().cloned().collect();

        let credentials = self.credentials.current().await;
        let mut stats = SweepStats::default();

        debug!(targets = watchers.len(), "sweep started");
        for watcher in watchers {
            if self.cancellation.is_cancelled() {
                debug!("sweep aborted by shutdown");
                break;
            }

            let (outcome, events) = watcher.check(self.client.as_ref(), &credentials).await;
            stats.record(outcome);

            for event in events {
                if let Err(e) = self.events_tx.try_send(event) {
                    warn!(error = %e, "notification queue full, dropping event");
                }
            }
        }
        stats
    }

    /// Adjust the delay from aggregate outcomes and surface degraded mode.
    async fn reconcile(&self, stats: &SweepStats, backoff: &mut Backoff, alerted: &mut bool) {
        if stats.rate_limited > 0 {
            backoff.grow();
            info!(
                delay_secs = backoff.current().as_secs(),
                "rate limited during sweep, requesting credential refresh"
            );
            self.credentials.request_refresh();
        } else if stats.transient > 0 {
            backoff.grow();
            debug!(
                delay_secs = backoff.current().as_secs(),
                "transient failures during sweep, delay grown"
            );
        } else if stats.all_success() {
            backoff.relax();
            // a clean sweep re-arms the degraded alert for a later episode
            *alerted = false;
        }

        if backoff.at_ceiling() && !*alerted {
            warn!("delay ceiling reached, surfacing degraded mode");
            self.sink.alert_degraded(DEGRADED_MESSAGE).await;
            *alerted = true;
        }
    }

    /// Drain the queue, forwarding enabled events to the sink.
    async fn deliver(&self) {
        let mut rx = self.events_rx.lock().await;
        while let Ok(event) = rx.try_recv() {
            let enabled = match &event {
                NotificationEvent::LiveStarted { .. } => self.live_notify.load(Ordering::Relaxed),
                NotificationEvent::NewPost { .. } => self.dynamic_notify.load(Ordering::Relaxed),
            };
            if !enabled {
                debug!(uid = event.uid(), "notification disabled, discarding event");
                continue;
            }
            debug!(
                uid = event.uid(),
                detected_at = %event.timestamp(),
                "delivering notification"
            );
            self.sink
                .deliver(&event.title(), event.body(), &event.url())
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::MockProfileClient;
    use super::*;
    use crate::credentials::{Credentials, MockCredentialSource};
    use crate::notification::MockNotificationSink;
    use chrono::Utc;

    fn ready_credentials() -> MockCredentialSource {
        let mut credentials = MockCredentialSource::new();
        credentials
            .expect_current()
            .returning(|| Credentials::new("SESSDATA=test", "test-agent"));
        credentials
    }

    fn quiet_sink() -> MockNotificationSink {
        MockNotificationSink::new()
    }

    fn coordinator(
        client: MockProfileClient,
        credentials: MockCredentialSource,
        sink: MockNotificationSink,
        initial: &[String],
    ) -> WatchCoordinator<MockProfileClient, MockCredentialSource, MockNotificationSink> {
        WatchCoordinator::new(
            Arc::new(client),
            Arc::new(credentials),
            Arc::new(sink),
            initial,
            WatchConfig::default(),
        )
    }

    fn target(uid: &str) -> WatchTarget {
        WatchTarget {
            uid: uid.to_string(),
            display_name: "主播".to_string(),
            live_room_id: Some("42".to_string()),
            live_room_title: "标题".to_string(),
        }
    }

    #[test]
    fn test_registry_add_remove_list() {
        let coordinator = coordinator(
            MockProfileClient::new(),
            MockCredentialSource::new(),
            quiet_sink(),
            &["u1".to_string()],
        );

        assert_eq!(coordinator.list_targets().len(), 1);

        coordinator.add_watch("u2").unwrap();
        // duplicate add is a no-op
        coordinator.add_watch("u2").unwrap();
        assert_eq!(coordinator.list_targets().len(), 2);

        coordinator.remove_watch("u1");
        coordinator.remove_watch("missing");
        let targets = coordinator.list_targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].uid, "u2");
    }

    #[test]
    fn test_add_watch_rejects_empty_uid() {
        let coordinator = coordinator(
            MockProfileClient::new(),
            MockCredentialSource::new(),
            quiet_sink(),
            &[],
        );
        assert!(matches!(
            coordinator.add_watch(""),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_empty_initial_uids_are_skipped() {
        let coordinator = coordinator(
            MockProfileClient::new(),
            MockCredentialSource::new(),
            quiet_sink(),
            &[String::new(), "u1".to_string()],
        );
        assert_eq!(coordinator.list_targets().len(), 1);
    }

    #[test]
    fn test_backoff_growth_and_decay() {
        let floor = Duration::from_secs(15);
        let mut backoff = Backoff::new(floor, Duration::from_secs(960));
        let d0 = backoff.current();

        // success at the floor: no change
        backoff.relax();
        assert_eq!(backoff.current(), d0);

        // two failures: strictly increasing
        backoff.grow();
        let d1 = backoff.current();
        assert!(d1 > d0);
        backoff.grow();
        let d2 = backoff.current();
        assert!(d2 > d1);

        // successes above the floor: strictly decreasing, never below floor
        backoff.relax();
        let d3 = backoff.current();
        assert!(d3 < d2);
        assert!(d3 >= floor);
        backoff.relax();
        backoff.relax();
        assert_eq!(backoff.current(), floor);
    }

    #[test]
    fn test_backoff_holds_at_ceiling() {
        let mut backoff = Backoff::new(Duration::from_secs(15), Duration::from_secs(960));
        for _ in 0..20 {
            backoff.grow();
        }
        assert_eq!(backoff.current(), Duration::from_secs(960));
        assert!(backoff.at_ceiling());
    }

    #[tokio::test]
    async fn test_snapshot_excludes_watch_added_after_it() {
        use parking_lot::Mutex as PlMutex;

        let checked: Arc<PlMutex<Vec<String>>> = Arc::new(PlMutex::new(Vec::new()));
        let checked_clone = checked.clone();

        let mut client = MockProfileClient::new();
        client
            .expect_fetch_profile()
            .returning(|_, _| Err(bili_api::ApiError::Other("no profile".to_string())));
        client.expect_fetch_posts().returning(move |uid, _| {
            checked_clone.lock().push(uid.to_string());
            Ok(vec![])
        });

        let coordinator = coordinator(
            client,
            ready_credentials(),
            quiet_sink(),
            &["u0".to_string()],
        );

        coordinator.sweep().await;
        assert_eq!(&*checked.lock(), &["u0".to_string()]);

        // the edit lands in the next sweep's snapshot
        coordinator.add_watch("u1").unwrap();
        checked.lock().clear();
        coordinator.sweep().await;
        let mut uids = checked.lock().clone();
        uids.sort();
        assert_eq!(uids, vec!["u0".to_string(), "u1".to_string()]);
    }

    #[tokio::test]
    async fn test_rate_limited_sweep_doubles_delay_and_refreshes_once() {
        let mut credentials = ready_credentials();
        credentials.expect_request_refresh().times(1).return_const(());

        let coordinator = coordinator(
            MockProfileClient::new(),
            credentials,
            quiet_sink(),
            &[],
        );

        let mut backoff = Backoff::new(Duration::from_secs(15), Duration::from_secs(960));
        let mut alerted = false;

        let mut stats = SweepStats::default();
        stats.record(CheckOutcome::Success);
        stats.record(CheckOutcome::RateLimited);

        coordinator
            .reconcile(&stats, &mut backoff, &mut alerted)
            .await;
        assert_eq!(backoff.current(), Duration::from_secs(30));
        assert!(!alerted);
    }

    #[tokio::test]
    async fn test_transient_failures_grow_without_refresh() {
        let credentials = ready_credentials();
        // no expect_request_refresh: a call would panic

        let coordinator = coordinator(
            MockProfileClient::new(),
            credentials,
            quiet_sink(),
            &[],
        );

        let mut backoff = Backoff::new(Duration::from_secs(15), Duration::from_secs(960));
        let mut alerted = false;

        let mut stats = SweepStats::default();
        stats.record(CheckOutcome::TransientFailure);

        coordinator
            .reconcile(&stats, &mut backoff, &mut alerted)
            .await;
        assert_eq!(backoff.current(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_degraded_alert_fires_once_per_episode() {
        let mut sink = MockNotificationSink::new();
        sink.expect_alert_degraded().times(2).return_const(());

        let coordinator = coordinator(
            MockProfileClient::new(),
            ready_credentials(),
            sink,
            &[],
        );

        let mut backoff = Backoff::new(Duration::from_secs(15), Duration::from_secs(960));
        let mut alerted = false;

        let mut failing = SweepStats::default();
        failing.record(CheckOutcome::TransientFailure);

        // grow to the ceiling: exactly one alert despite repeated failures
        for _ in 0..10 {
            coordinator
                .reconcile(&failing, &mut backoff, &mut alerted)
                .await;
        }
        assert!(backoff.at_ceiling());
        assert!(alerted);

        // a clean sweep re-arms the alert
        let mut clean = SweepStats::default();
        clean.record(CheckOutcome::Success);
        coordinator
            .reconcile(&clean, &mut backoff, &mut alerted)
            .await;
        assert!(!alerted);

        // a second episode alerts again (second expected call)
        for _ in 0..10 {
            coordinator
                .reconcile(&failing, &mut backoff, &mut alerted)
                .await;
        }
        assert!(alerted);
    }

    #[tokio::test]
    async fn test_deliver_respects_toggles() {
        let mut sink = MockNotificationSink::new();
        // only the NewPost event goes out; live notifications are disabled
        sink.expect_deliver()
            .times(1)
            .withf(|title, _, _| title.contains("新动态"))
            .return_const(());

        let coordinator = coordinator(
            MockProfileClient::new(),
            ready_credentials(),
            sink,
            &[],
        );
        coordinator.set_live_notify(false);

        coordinator
            .events_tx
            .try_send(NotificationEvent::LiveStarted {
                target: target("u1"),
                timestamp: Utc::now(),
            })
            .unwrap();
        coordinator
            .events_tx
            .try_send(NotificationEvent::NewPost {
                target: target("u1"),
                post_id: "9001".to_string(),
                excerpt: "内容".to_string(),
                timestamp: Utc::now(),
            })
            .unwrap();

        coordinator.deliver().await;
    }

    #[tokio::test]
    async fn test_deliver_drains_queue_in_order() {
        let order: Arc<parking_lot::Mutex<Vec<String>>> =
            Arc::new(parking_lot::Mutex::new(Vec::new()));
        let order_clone = order.clone();

        let mut sink = MockNotificationSink::new();
        sink.expect_deliver()
            .times(2)
            .returning(move |title, _, _| {
                order_clone.lock().push(title.to_string());
            });

        let coordinator = coordinator(
            MockProfileClient::new(),
            ready_credentials(),
            sink,
            &[],
        );

        coordinator
            .events_tx
            .try_send(NotificationEvent::NewPost {
                target: target("u1"),
                post_id: "1".to_string(),
                excerpt: "第一条".to_string(),
                timestamp: Utc::now(),
            })
            .unwrap();
        coordinator
            .events_tx
            .try_send(NotificationEvent::LiveStarted {
                target: target("u1"),
                timestamp: Utc::now(),
            })
            .unwrap();

        coordinator.deliver().await;

        let delivered = order.lock().clone();
        assert_eq!(delivered.len(), 2);
        assert!(delivered[0].contains("新动态"));
        assert!(delivered[1].contains("直播中"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_wait_is_bounded() {
        let mut credentials = MockCredentialSource::new();
        credentials
            .expect_current()
            .returning(Credentials::default);

        let coordinator = coordinator(
            MockProfileClient::new(),
            credentials,
            quiet_sink(),
            &[],
        );

        // with paused time this returns promptly once the deadline passes;
        // without the bound it would hang forever
        coordinator.wait_for_credentials().await;
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let coordinator = Arc::new(coordinator(
            MockProfileClient::new(),
            ready_credentials(),
            quiet_sink(),
            &[],
        ));

        let runner = coordinator.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        coordinator.stop();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("run should stop after cancellation")
            .unwrap();
    }
}
