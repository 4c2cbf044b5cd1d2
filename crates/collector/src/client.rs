use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use gh_broker::{GithubBroker, HttpStatusError};
use http::{header, Request, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

#[derive(Debug, Error)]
pub enum GithubApiError {
    #[error("github api error: {status} for {endpoint}")]
    Http {
        status: StatusCode,
        endpoint: String,
    },
}

impl GithubApiError {
    pub fn status(status: StatusCode, endpoint: impl Into<String>) -> Self {
        Self::Http {
            status,
            endpoint: endpoint.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match *self {
            GithubApiError::Http { status, .. } => status,
        }
    }
}

/// Paged REST listings for one repository. Items are returned as raw JSON so
/// that one malformed item can be skipped without failing the page.
#[async_trait]
pub trait GithubClient: Send + Sync {
    async fn list_pulls(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Value>>;

    async fn list_contributors(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Value>>;
}

pub struct BrokerGithubClient {
    broker: Arc<dyn GithubBroker>,
    base: Url,
    user_agent: String,
}

impl BrokerGithubClient {
    pub fn new(broker: Arc<dyn GithubBroker>, user_agent: String) -> Result<Self> {
        Ok(Self {
            broker,
            base: Url::parse("https://api.github.com/")?,
            user_agent,
        })
    }

    async fn get_json(&self, url: Url) -> Result<Value> {
        let endpoint = url.path().trim_start_matches('/').to_string();
        debug!(endpoint = %endpoint, url = %url, "Dispatching GitHub request");
        let response = match self.execute(url).await {
            Ok(resp) => resp,
            Err(err) => {
                if let Some(status_err) = err.downcast_ref::<HttpStatusError>() {
                    return Err(GithubApiError::status(status_err.status, endpoint).into());
                }
                return Err(err);
            }
        };
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            // Empty repositories answer the contributors listing with 204.
            Ok(Value::Null)
        } else if status.is_success() {
            let body = response.into_body();
            if body.is_empty() {
                return Ok(Value::Null);
            }
            Ok(serde_json::from_slice(&body)?)
        } else {
            Err(GithubApiError::status(status, endpoint).into())
        }
    }

    async fn get_json_array(&self, url: Url) -> Result<Vec<Value>> {
        match self.get_json(url).await? {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            _ => Err(anyhow!("expected array response")),
        }
    }

    #[instrument(skip(self), fields(url = %url))]
    async fn execute(&self, url: Url) -> Result<http::Response<Vec<u8>>> {
        let uri: http::Uri = url.as_str().parse()?;
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::USER_AGENT, self.user_agent.clone())
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .body(Vec::new())?;
        self.broker.get(request).await
    }

    fn paged(&self, path: &str, extra: &[(&str, &str)], page: u32, per_page: u32) -> Result<Url> {
        let mut url = self.base.join(path)?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in extra {
                query.append_pair(key, value);
            }
            query.append_pair("page", &page.to_string());
            query.append_pair("per_page", &per_page.to_string());
        }
        Ok(url)
    }
}

#[async_trait]
impl GithubClient for BrokerGithubClient {
    async fn list_pulls(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Value>> {
        let url = self.paged(
            &format!("repos/{owner}/{repo}/pulls"),
            &[("state", "all"), ("sort", "created"), ("direction", "asc")],
            page,
            per_page,
        )?;
        self.get_json_array(url).await
    }

    async fn list_contributors(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Value>> {
        let url = self.paged(
            &format!("repos/{owner}/{repo}/contributors"),
            &[],
            page,
            per_page,
        )?;
        self.get_json_array(url).await
    }
}
