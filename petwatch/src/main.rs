use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use bili_api::BiliClient;
use petwatch::config::Profile;
use petwatch::credentials::{Credentials, HarvestedCredentials};
use petwatch::notification::LogSink;
use petwatch::watcher::{WatchConfig, WatchCoordinator, update};

/// Cookie header seeding the credential channel in headless runs.
const COOKIES_ENV: &str = "PETWATCH_COOKIES";
/// When set, logs are also written to daily-rotated files in this directory.
const LOG_DIR_ENV: &str = "PETWATCH_LOG_DIR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_dir = std::env::var_os(LOG_DIR_ENV).map(PathBuf::from);
    let _guard = petwatch::logging::init(log_dir.as_deref());

    let profile_path = Profile::default_path();
    let profile = Profile::load(&profile_path)
        .with_context(|| format!("loading profile from {}", profile_path.display()))?;
    info!(targets = profile.watch_list.len(), "profile loaded");

    let (writer, source) = HarvestedCredentials::channel();
    match std::env::var(COOKIES_ENV) {
        Ok(cookies) if !cookies.is_empty() => {
            writer.set(Credentials::new(cookies, profile.user_agent.clone()));
        }
        _ => warn!("{COOKIES_ENV} not set, requests will be unauthenticated"),
    }

    let client = Arc::new(BiliClient::new().context("building api client")?);
    let sink = Arc::new(LogSink);

    // startup version check, independent of the watch loop
    let update_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("building update-check client")?;
    update::check_for_update(&update_client, sink.as_ref()).await;

    let config = WatchConfig {
        live_notify: profile.live_notify,
        dynamic_notify: profile.dynamic_notify,
        ..WatchConfig::default()
    };
    let coordinator = Arc::new(WatchCoordinator::new(
        client,
        Arc::new(source),
        sink,
        &profile.watch_list,
        config,
    ));

    let runner = coordinator.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    // headless builds have no harvesting surface; refresh requests can only
    // be answered by re-seeding the env and restarting
    tokio::spawn(async move {
        loop {
            writer.refresh_requested().await;
            warn!("credential refresh requested, update {COOKIES_ENV} and restart");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown requested");
    coordinator.stop();
    handle.await.context("joining watch loop")?;

    Ok(())
}
