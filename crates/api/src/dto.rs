use chrono::{DateTime, Utc};
use common::{Category, SpecType};
use serde::Serialize;

use db::models::{ChartKind, ChartRow, ContributorRow, PullRequestRow, SnapshotRow};

#[derive(Debug, Serialize)]
pub struct PullRequestDto {
    pub id: i64,
    pub number: i64,
    pub spec_type: SpecType,
    pub repo: String,
    pub title: String,
    pub author: Option<String>,
    pub html_url: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub raw_labels: Vec<String>,
    pub refined_labels: Vec<String>,
    pub custom_labels: Vec<String>,
}

impl From<PullRequestRow> for PullRequestDto {
    fn from(row: PullRequestRow) -> Self {
        Self {
            id: row.id,
            number: row.number,
            spec_type: row.spec_type,
            repo: row.repo_full_name,
            title: row.title,
            author: row.author,
            html_url: row.html_url,
            state: row.state.as_str().to_string(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            closed_at: row.closed_at,
            merged_at: row.merged_at,
            raw_labels: row.raw_labels,
            refined_labels: row.refined_labels,
            custom_labels: row.custom_labels,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ContributorDto {
    pub id: i64,
    pub login: String,
    pub html_url: Option<String>,
    pub avatar_url: Option<String>,
    pub contributions: i64,
    #[serde(rename = "type")]
    pub account_type: String,
}

impl From<ContributorRow> for ContributorDto {
    fn from(row: ContributorRow) -> Self {
        Self {
            id: row.id,
            login: row.login,
            html_url: row.html_url,
            avatar_url: row.avatar_url,
            contributions: row.contributions,
            account_type: row.account_type,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SnapshotDto {
    pub spec_type: SpecType,
    pub taken_at: DateTime<Utc>,
    pub total: i64,
    pub open: i64,
    pub merged: i64,
    pub closed: i64,
    pub contributors: i64,
}

impl From<SnapshotRow> for SnapshotDto {
    fn from(row: SnapshotRow) -> Self {
        Self {
            spec_type: row.spec_type,
            taken_at: row.taken_at,
            total: row.total,
            open: row.open,
            merged: row.merged,
            closed: row.closed,
            contributors: row.contributors,
        }
    }
}

/// One precomputed chart point; the series key is `type` for activity
/// charts and `label` for label charts.
#[derive(Debug, Serialize)]
pub struct ChartDto {
    #[serde(rename = "monthYear")]
    pub month_year: String,
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none", rename = "type")]
    pub activity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub count: i64,
    pub generated_at: DateTime<Utc>,
}

impl From<ChartRow> for ChartDto {
    fn from(row: ChartRow) -> Self {
        let (activity, label) = match row.kind {
            ChartKind::Activity => (Some(row.key), None),
            _ => (None, Some(row.key)),
        };
        Self {
            month_year: row.month_year,
            category: row.category,
            activity,
            label,
            count: row.count,
            generated_at: row.generated_at,
        }
    }
}
