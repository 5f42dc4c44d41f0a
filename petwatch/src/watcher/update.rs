//! One-shot startup version check.

use tracing::{debug, info, warn};

use crate::notification::NotificationSink;

const VERSION_ENDPOINT: &str = "https://pet.vjoi.cn/version.txt";
const DOWNLOAD_URL: &str = "https://pet.vjoi.cn";

/// Build code of this release; compared against the published one.
const BUILD_CODE: u32 = 1;

/// Fetch the published build code once and notify if it is newer than ours.
/// Any failure is logged and swallowed; the watch loop must start regardless.
pub async fn check_for_update<N: NotificationSink + ?Sized>(client: &reqwest::Client, sink: &N) {
    match fetch_build_code(client, VERSION_ENDPOINT).await {
        Ok(published) if published > BUILD_CODE => {
            info!(published, current = BUILD_CODE, "newer version available");
            sink.deliver("检测到新版本", "点击前往下载页面", DOWNLOAD_URL)
                .await;
        }
        Ok(published) => {
            debug!(published, current = BUILD_CODE, "version is up to date");
        }
        Err(e) => {
            warn!(error = %e, "version check failed");
        }
    }
}

async fn fetch_build_code(client: &reqwest::Client, url: &str) -> crate::Result<u32> {
    let body = client
        .get(url)
        .send()
        .await
        .map_err(bili_api::ApiError::from)?
        .error_for_status()
        .map_err(bili_api::ApiError::from)?
        .text()
        .await
        .map_err(bili_api::ApiError::from)?;

    body.trim()
        .parse::<u32>()
        .map_err(|e| crate::Error::validation(format!("malformed version payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_failure_is_an_error() {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(200))
            .build()
            .unwrap();

        // nothing listens on port 1
        let result = fetch_build_code(&client, "http://127.0.0.1:1/version.txt").await;
        assert!(result.is_err());
    }

    #[test]
    fn test_build_code_parsing() {
        assert_eq!("7\n".trim().parse::<u32>().unwrap(), 7);
        assert!("v1.2".trim().parse::<u32>().is_err());
    }
}
