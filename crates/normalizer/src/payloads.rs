use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Item of `GET /repos/{owner}/{repo}/pulls?state=all`.
#[derive(Debug, Clone, Deserialize)]
pub struct PullPayload {
    pub id: i64,
    pub number: i64,
    pub title: String,
    pub state: String,
    pub html_url: String,
    pub user: Option<UserRef>,
    #[serde(default)]
    pub labels: Vec<LabelRef>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
}

/// Item of `GET /repos/{owner}/{repo}/contributors`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContributorPayload {
    pub id: i64,
    pub login: String,
    pub html_url: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub contributions: i64,
    #[serde(rename = "type", default = "default_account_type")]
    pub account_type: String,
}

fn default_account_type() -> String {
    "User".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRef {
    pub id: i64,
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelRef {
    pub name: String,
}
