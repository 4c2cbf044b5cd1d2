use chrono::{DateTime, Utc};
use http::{header, HeaderMap, Method, Request, Uri};
use std::time::Duration;

/// A GET request against the GitHub REST API, keyed by method, path and query.
#[derive(Debug, Clone)]
pub struct GithubRequest {
    uri: Uri,
    headers: HeaderMap,
    key: String,
}

impl GithubRequest {
    pub fn new(inner: Request<Vec<u8>>) -> anyhow::Result<Self> {
        if inner.method() != Method::GET {
            return Err(anyhow::anyhow!(
                "only GET requests are supported, got {}",
                inner.method()
            ));
        }
        if !inner.headers().contains_key(header::USER_AGENT) {
            return Err(anyhow::anyhow!("user-agent header required"));
        }
        let key = format!(
            "{} {}{}",
            inner.method(),
            inner.uri().path(),
            inner
                .uri()
                .query()
                .map(|q| format!("?{}", q))
                .unwrap_or_default()
        );
        let (parts, _) = inner.into_parts();
        Ok(Self {
            uri: parts.uri,
            headers: parts.headers,
            key,
        })
    }

    pub fn request(&self) -> Request<Vec<u8>> {
        let mut request = Request::new(Vec::new());
        *request.uri_mut() = self.uri.clone();
        *request.headers_mut() = self.headers.clone();
        request
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitUpdate {
    pub limit: i64,
    pub remaining: i64,
    pub reset: DateTime<Utc>,
}

pub fn parse_rate_limit(headers: &HeaderMap) -> Option<RateLimitUpdate> {
    let limit = headers
        .get("x-ratelimit-limit")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())?;
    let remaining = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())?;
    let reset_ts = headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())?;
    let reset = DateTime::from_timestamp(reset_ts, 0)?;
    Some(RateLimitUpdate {
        limit,
        remaining,
        reset,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAdvice {
    pub wait: Duration,
    pub reason: &'static str,
}

pub fn parse_retry_after(headers: &HeaderMap) -> Option<RetryAdvice> {
    let value = headers.get(header::RETRY_AFTER)?.to_str().ok()?;
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(RetryAdvice {
            wait: Duration::from_secs(seconds),
            reason: "retry_after",
        });
    }
    let date = httpdate::parse_http_date(value).ok()?;
    let wait = date
        .duration_since(std::time::SystemTime::now())
        .unwrap_or_default();
    Some(RetryAdvice {
        wait,
        reason: "retry_after_date",
    })
}
