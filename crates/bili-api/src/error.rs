use thiserror::Error;

/// Platform response codes that signal a stale or throttled session.
///
/// -352 is the web risk-control code, -401 is "not logged in / abnormal
/// request", -412 mirrors the HTTP 412 request-intercepted status.
const RATE_LIMIT_CODES: [i64; 3] = [-352, -401, -412];

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected http status: {0}")]
    Status(u16),
    #[error("rate limited by platform (code {code})")]
    RateLimited { code: i64 },
    #[error("platform error {code}: {message}")]
    Platform { code: i64, message: String },
    #[error("other: {0}")]
    Other(String),
}

impl ApiError {
    /// Build the right variant for a non-zero platform response code.
    pub fn from_platform_code(code: i64, message: String) -> Self {
        if RATE_LIMIT_CODES.contains(&code) {
            ApiError::RateLimited { code }
        } else {
            ApiError::Platform { code, message }
        }
    }

    /// Whether the platform explicitly signaled throttling or stale auth,
    /// as opposed to a transient transport/parse failure.
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited { .. } | ApiError::Status(412)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_codes() {
        assert!(ApiError::from_platform_code(-352, String::new()).is_rate_limited());
        assert!(ApiError::from_platform_code(-401, String::new()).is_rate_limited());
        assert!(ApiError::from_platform_code(-412, String::new()).is_rate_limited());
        assert!(ApiError::Status(412).is_rate_limited());
    }

    #[test]
    fn test_other_codes_are_not_rate_limits() {
        let err = ApiError::from_platform_code(-404, "not found".to_string());
        assert!(!err.is_rate_limited());
        assert!(matches!(err, ApiError::Platform { code: -404, .. }));
        assert!(!ApiError::Status(500).is_rate_limited());
        assert!(!ApiError::Other("boom".to_string()).is_rate_limited());
    }
}
