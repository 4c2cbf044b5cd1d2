use chrono::{DateTime, Utc};
use common::SpecType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedPullRequest {
    pub id: i64,
    pub number: i64,
    pub spec_type: SpecType,
    pub repo_full_name: String,
    pub title: String,
    pub author: Option<String>,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub raw_labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedContributor {
    pub spec_type: SpecType,
    pub id: i64,
    pub login: String,
    pub html_url: Option<String>,
    pub avatar_url: Option<String>,
    pub contributions: i64,
    pub account_type: String,
}
