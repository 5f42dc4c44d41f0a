//! WBI request signing.
//!
//! Signed endpoints expect the query string to carry a `wts` timestamp and a
//! `w_rid` md5 signature computed over the sorted, url-encoded parameters
//! plus a "mixin key" derived from two rotating keys published on the nav
//! endpoint. The keys rotate slowly, so a fetched pair is cached for ~20
//! hours before being refreshed.

use md5::Digest;
use reqwest::Client;
use reqwest::header::{COOKIE, REFERER, USER_AGENT};
use serde::Deserialize;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ApiError;

const KEY_EXPIRATION: Duration = Duration::from_secs(20 * 60 * 60);

const NAV_URL: &str = "https://api.bilibili.com/x/web-interface/nav";
const NAV_REFERER: &str = "https://www.bilibili.com";

const MIXIN_KEY_ENC_TAB: [usize; 64] = [
    46, 47, 18, 2, 53, 8, 23, 32, 15, 50, 10, 31, 58, 3, 45, 35, 27, 43, 5, 49, 33, 9, 42, 19, 29,
    28, 14, 39, 12, 38, 41, 13, 37, 48, 7, 16, 24, 55, 40, 61, 26, 17, 0, 1, 60, 51, 30, 4, 22, 25,
    54, 21, 56, 59, 6, 63, 57, 62, 11, 36, 20, 34, 44, 52,
];

#[derive(Clone, Debug)]
struct WbiKeys {
    img_key: String,
    sub_key: String,
    fetched_at: Instant,
}

impl WbiKeys {
    fn new(img_key: String, sub_key: String) -> Self {
        Self {
            img_key,
            sub_key,
            fetched_at: Instant::now(),
        }
    }

    fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() > KEY_EXPIRATION
    }
}

#[derive(Deserialize)]
struct WbiImg {
    img_url: String,
    sub_url: String,
}

#[derive(Deserialize)]
struct NavData {
    wbi_img: WbiImg,
}

#[derive(Deserialize)]
struct NavResponse {
    data: NavData,
}

// 对 imgKey 和 subKey 进行字符顺序打乱编码
// The table permutes 64 bytes of key material; shorter input means the nav
// response was mangled and there is no valid key to derive.
fn get_mixin_key(orig: &[u8]) -> Option<String> {
    if orig.len() < MIXIN_KEY_ENC_TAB.len() {
        return None;
    }
    Some(
        MIXIN_KEY_ENC_TAB
            .iter()
            .take(32)
            .map(|&i| orig[i] as char)
            .collect(),
    )
}

fn get_url_encoded(s: &str) -> String {
    let mut encoded = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            // Unreserved characters that do not need to be encoded.
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '~' => {
                encoded.push(c);
            }
            // Characters the signer filters out entirely.
            '!' | '\'' | '(' | ')' | '*' => {}
            // All other characters are percent-encoded.
            _ => {
                let mut buf = [0; 4];
                for b in c.encode_utf8(&mut buf).bytes() {
                    encoded.push_str(&format!("%{b:02X}"));
                }
            }
        }
    }
    encoded
}

fn encode_wbi(
    mut params: Vec<(&str, String)>,
    (img_key, sub_key): (&str, &str),
    timestamp: u64,
) -> Option<String> {
    let mixin_key = get_mixin_key((img_key.to_owned() + sub_key).as_bytes())?;
    // 添加当前时间戳
    params.push(("wts", timestamp.to_string()));
    // 重新排序
    params.sort_by(|a, b| a.0.cmp(b.0));
    // 拼接参数
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", get_url_encoded(k), get_url_encoded(v)))
        .collect::<Vec<_>>()
        .join("&");
    // 计算签名
    let mut hasher = md5::Md5::new();
    hasher.update(query.clone() + &mixin_key);
    let md5_hash = hasher.finalize();
    let web_sign = format!("{md5_hash:x}");
    Some(query + &format!("&w_rid={web_sign}"))
}

fn take_filename(url: String) -> Option<String> {
    url.rsplit_once('/')
        .and_then(|(_, s)| s.rsplit_once('.'))
        .map(|(s, _)| s.to_string())
}

/// Produces signed query strings, caching the signing keys per instance.
pub struct WbiSigner {
    client: Client,
    keys: Mutex<Option<WbiKeys>>,
}

impl WbiSigner {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            keys: Mutex::new(None),
        }
    }

    /// Sign `params`, returning the final query string including `wts` and
    /// `w_rid`. May perform a network round-trip to refresh stale keys.
    pub async fn sign(
        &self,
        params: Vec<(&str, String)>,
        cookies: &str,
        user_agent: &str,
    ) -> Result<String, ApiError> {
        let keys = self.keys(cookies, user_agent).await?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| ApiError::Other("SystemTime before UNIX EPOCH!".to_string()))?
            .as_secs();
        encode_wbi(params, (&keys.img_key, &keys.sub_key), timestamp)
            .ok_or_else(|| ApiError::Other("malformed wbi keys".to_string()))
    }

    async fn keys(&self, cookies: &str, user_agent: &str) -> Result<WbiKeys, ApiError> {
        let mut guard = self.keys.lock().await;
        if let Some(keys) = &*guard {
            if !keys.is_stale() {
                return Ok(keys.clone());
            }
        }

        let fresh = self.fetch_keys(cookies, user_agent).await?;
        debug!("refreshed wbi keys");
        *guard = Some(fresh.clone());
        Ok(fresh)
    }

    async fn fetch_keys(&self, cookies: &str, user_agent: &str) -> Result<WbiKeys, ApiError> {
        let NavResponse {
            data: NavData { wbi_img },
        } = self
            .client
            .get(NAV_URL)
            .header(USER_AGENT, user_agent)
            .header(REFERER, NAV_REFERER)
            .header(COOKIE, cookies)
            .send()
            .await?
            .json::<NavResponse>()
            .await?;

        let img_key = take_filename(wbi_img.img_url)
            .ok_or_else(|| ApiError::Other("malformed wbi img_url".to_string()))?;
        let sub_key = take_filename(wbi_img.sub_url)
            .ok_or_else(|| ApiError::Other("malformed wbi sub_url".to_string()))?;

        // reject truncated key material here so it never enters the cache
        if img_key.len() + sub_key.len() < MIXIN_KEY_ENC_TAB.len() {
            return Err(ApiError::Other("malformed wbi keys".to_string()));
        }

        Ok(WbiKeys::new(img_key, sub_key))
    }
}

// 取自文档描述的测试用例
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_filename() {
        assert_eq!(
            take_filename(
                "https://i0.hdslb.com/bfs/wbi/7cd084941338484aae1ad9425b84077c.png".to_string()
            ),
            Some("7cd084941338484aae1ad9425b84077c".to_string())
        );
    }

    #[test]
    fn test_get_mixin_key() {
        let concat_key =
            "7cd084941338484aae1ad9425b84077c".to_string() + "4932caff0ff746eab6f01bf08b70ac45";
        assert_eq!(
            get_mixin_key(concat_key.as_bytes()).unwrap(),
            "ea1db124af3c7062474693fa704f4ff8"
        );
    }

    #[test]
    fn test_short_key_material_is_rejected() {
        assert!(get_mixin_key(b"shortkey").is_none());

        let params = vec![("foo", String::from("114"))];
        assert!(encode_wbi(params, ("short", "keys"), 1702204169).is_none());
    }

    #[test]
    fn test_encode_wbi() {
        let params = vec![
            ("foo", String::from("114")),
            ("bar", String::from("514")),
            ("zab", String::from("1919810")),
        ];
        let keys = (
            "7cd084941338484aae1ad9425b84077c",
            "4932caff0ff746eab6f01bf08b70ac45",
        );
        assert_eq!(
            encode_wbi(params, keys, 1702204169).unwrap(),
            "bar=514&foo=114&wts=1702204169&zab=1919810&w_rid=8f6f2b5b3d485fe1886cec6a0be8c5d4"
        )
    }

    #[test]
    fn test_keys_staleness() {
        let keys = WbiKeys::new("img".to_string(), "sub".to_string());
        assert!(!keys.is_stale());
    }
}
