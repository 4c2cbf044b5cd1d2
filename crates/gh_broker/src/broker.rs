use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use common::config::GithubToken;
use futures::future::BoxFuture;
use futures::FutureExt;
use http::{header, HeaderValue, Request, Response, StatusCode};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::cache::{CachedResponse, ResponseCache};
use crate::error::HttpStatusError;
use crate::metrics;
use crate::model::{parse_rate_limit, parse_retry_after, GithubRequest};
use crate::retry::RetryPolicy;
use crate::token::{TokenPool, TokenSelection};

#[async_trait]
pub trait HttpExec: Send + Sync {
    async fn execute(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpExec for ReqwestExecutor {
    async fn execute(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let (parts, body) = req.into_parts();
        let resp = self
            .client
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers)
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.bytes().await?;
        let mut response = Response::new(bytes.to_vec());
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Authenticated, rate-limit aware access to the GitHub REST API.
pub trait GithubBroker: Send + Sync {
    fn get(&self, request: Request<Vec<u8>>) -> BoxFuture<'static, Result<Response<Vec<u8>>>>;
}

pub struct GithubBrokerBuilder {
    tokens: Vec<GithubToken>,
    http_exec: Option<Arc<dyn HttpExec>>,
    user_agent: String,
    cache_capacity: usize,
    retry: RetryPolicy,
}

impl GithubBrokerBuilder {
    pub fn new(tokens: Vec<GithubToken>) -> Self {
        Self {
            tokens,
            http_exec: None,
            user_agent: "spec-pr-insights".to_string(),
            cache_capacity: 2000,
            retry: RetryPolicy::default(),
        }
    }

    pub fn http_exec(mut self, exec: Arc<dyn HttpExec>) -> Self {
        self.http_exec = Some(exec);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn build(self) -> Result<Arc<dyn GithubBroker>> {
        let http_exec = match self.http_exec {
            Some(exec) => exec,
            None => Arc::new(ReqwestExecutor::new(&self.user_agent)?),
        };
        Ok(Arc::new(LocalGithubBroker {
            inner: Arc::new(Inner {
                http_exec,
                token_pool: TokenPool::new(self.tokens),
                cache: ResponseCache::new(self.cache_capacity),
                retry: self.retry,
            }),
        }))
    }
}

struct Inner {
    http_exec: Arc<dyn HttpExec>,
    token_pool: TokenPool,
    cache: ResponseCache,
    retry: RetryPolicy,
}

#[derive(Clone)]
pub struct LocalGithubBroker {
    inner: Arc<Inner>,
}

impl GithubBroker for LocalGithubBroker {
    fn get(&self, request: Request<Vec<u8>>) -> BoxFuture<'static, Result<Response<Vec<u8>>>> {
        let inner = self.inner.clone();
        async move {
            let mut gh_req = GithubRequest::new(request)?;
            let cached = inner.cache.get(gh_req.key()).await;
            if let Some(entry) = &cached {
                gh_req
                    .headers_mut()
                    .insert(header::IF_NONE_MATCH, HeaderValue::from_str(&entry.etag)?);
            }
            let response = process(&inner, gh_req, cached).await?;
            Ok(response.into_response())
        }
        .boxed()
    }
}

#[derive(Clone, Debug)]
pub struct BrokerResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl BrokerResponse {
    pub fn from_http(resp: Response<Vec<u8>>) -> Self {
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|val| (k.as_str().to_string(), val.to_string()))
            })
            .collect();
        Self {
            status,
            headers,
            body: resp.into_body(),
        }
    }

    pub fn into_response(self) -> Response<Vec<u8>> {
        let mut response = Response::new(self.body);
        *response.status_mut() = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        for (key, value) in self.headers.iter() {
            if let (Ok(name), Ok(value)) = (
                header::HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                response.headers_mut().append(name, value);
            }
        }
        response
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

async fn process(
    inner: &Inner,
    request: GithubRequest,
    cached: Option<CachedResponse>,
) -> Result<BrokerResponse> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match execute_once(inner, &cached, request.clone()).await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };

        let (retryable, retry_after, reason) = match err.downcast_ref::<HttpStatusError>() {
            Some(http) => (
                RetryPolicy::is_retryable(http.status),
                http.retry_after,
                status_class(http.status),
            ),
            None => (true, None, "transport"),
        };
        if !retryable || !inner.retry.should_retry(attempt) {
            return Err(err);
        }

        let wait = inner.retry.delay_for(retry_after);
        warn!(
            attempt,
            request = %request.key(),
            wait_secs = wait.as_secs(),
            error = %err,
            "GitHub request attempt failed"
        );
        metrics::RETRIES_TOTAL.with_label_values(&[reason]).inc();
        metrics::SLEEP_SECONDS
            .with_label_values(&["retry"])
            .inc_by(wait.as_secs());
        sleep(wait).await;
    }
}

async fn execute_once(
    inner: &Inner,
    cached: &Option<CachedResponse>,
    mut request: GithubRequest,
) -> Result<BrokerResponse> {
    let token = loop {
        match inner.token_pool.pick_token().await {
            TokenSelection::Token(token) => break Some(token),
            TokenSelection::Anonymous => break None,
            TokenSelection::Wait(wait) => {
                warn!(wait_secs = wait.as_secs(), "all GitHub tokens exhausted, waiting for reset");
                metrics::SLEEP_SECONDS
                    .with_label_values(&["rate_limit"])
                    .inc_by(wait.as_secs());
                sleep(wait + Duration::from_secs(1)).await;
            }
        }
    };
    let token_label = token.as_ref().map_or("anonymous", |t| t.id.as_str());

    if let Some(token) = &token {
        request.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("token {}", token.secret))?,
        );
    }

    let start = Instant::now();
    let resp = inner.http_exec.execute(request.request()).await?;
    metrics::LATENCY.observe(start.elapsed().as_secs_f64());
    let status = resp.status();
    metrics::REQUESTS_TOTAL
        .with_label_values(&[token_label, status_class(status)])
        .inc();

    if let Some(update) = parse_rate_limit(resp.headers()) {
        metrics::RATE_REMAINING
            .with_label_values(&[token_label])
            .set(update.remaining);
        if let Some(token) = &token {
            inner.token_pool.update(&token.id, update).await;
        }
    }

    if status == StatusCode::NOT_MODIFIED {
        if let Some(entry) = cached {
            metrics::CACHE_HITS.inc();
            debug!(request = %request.key(), "served from ETag cache");
            return Ok(BrokerResponse {
                status: entry.status,
                headers: entry.headers.clone(),
                body: entry.body.clone(),
            });
        }
    }

    if status.is_success() {
        let response = BrokerResponse::from_http(resp);
        metrics::CACHE_MISSES.inc();
        if let Some(etag) = response.header("etag") {
            let entry = CachedResponse {
                etag: etag.to_string(),
                body: response.body.clone(),
                status: response.status,
                headers: response.headers.clone(),
            };
            inner.cache.put(request.key().to_string(), entry).await;
        }
        if let Some(token) = &token {
            inner.token_pool.consume(&token.id, 1).await;
        }
        return Ok(response);
    }

    let headers = resp.headers();
    let retry_after = parse_retry_after(headers).map(|advice| advice.wait);
    warn!(
        status = %status,
        request = %request.key(),
        github_request_id = headers
            .get("x-github-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-"),
        retry_after_secs = retry_after.map(|wait| wait.as_secs()),
        body_preview = %body_preview(resp.body()),
        "GitHub returned error response"
    );
    Err(HttpStatusError::with_endpoint(status, request.key())
        .retry_after(retry_after)
        .into())
}

fn body_preview(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let mut truncated: String = text.chars().take(256).collect();
    if truncated.len() < text.len() {
        truncated.push('…');
    }
    truncated
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}
