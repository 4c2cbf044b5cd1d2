use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{Category, SpecType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
}

impl PrState {
    /// GitHub reports state separately, but a PR is closed iff it has been closed or merged.
    pub fn derive(closed_at: Option<DateTime<Utc>>, merged_at: Option<DateTime<Utc>>) -> Self {
        if closed_at.is_some() || merged_at.is_some() {
            PrState::Closed
        } else {
            PrState::Open
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrState::Open => "open",
            PrState::Closed => "closed",
        }
    }
}

impl FromStr for PrState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(PrState::Open),
            "closed" => Ok(PrState::Closed),
            other => Err(format!("unknown pull request state: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PullRequestRow {
    pub id: i64,
    pub number: i64,
    pub spec_type: SpecType,
    pub repo_full_name: String,
    pub title: String,
    pub author: Option<String>,
    pub html_url: String,
    pub state: PrState,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub raw_labels: Vec<String>,
    pub refined_labels: Vec<String>,
    pub custom_labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContributorRow {
    pub spec_type: SpecType,
    pub id: i64,
    pub login: String,
    pub html_url: Option<String>,
    pub avatar_url: Option<String>,
    pub contributions: i64,
    pub account_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotRow {
    pub spec_type: SpecType,
    pub taken_at: DateTime<Utc>,
    pub total: i64,
    pub open: i64,
    pub merged: i64,
    pub closed: i64,
    pub contributors: i64,
}

/// Which aggregation a stored chart document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Activity,
    RefinedLabels,
    CustomLabels,
    RawLabels,
}

impl ChartKind {
    pub const ALL: [ChartKind; 4] = [
        ChartKind::Activity,
        ChartKind::RefinedLabels,
        ChartKind::CustomLabels,
        ChartKind::RawLabels,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Activity => "activity",
            ChartKind::RefinedLabels => "refined_labels",
            ChartKind::CustomLabels => "custom_labels",
            ChartKind::RawLabels => "raw_labels",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "activity" => Ok(ChartKind::Activity),
            "refined_labels" => Ok(ChartKind::RefinedLabels),
            "custom_labels" => Ok(ChartKind::CustomLabels),
            "raw_labels" => Ok(ChartKind::RawLabels),
            other => Err(format!("unknown chart kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartRow {
    pub id: Uuid,
    /// Position within the aggregator output for this kind and category.
    pub rank: i32,
    pub kind: ChartKind,
    pub category: Category,
    pub month_year: String,
    pub key: String,
    pub count: i64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct PullRequestQuery {
    pub spec_type: Option<SpecType>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl PullRequestQuery {
    pub fn for_spec(spec_type: SpecType) -> Self {
        Self {
            spec_type: Some(spec_type),
            ..Default::default()
        }
    }

    /// Inclusive `created_at` range check, mirroring the SQL filter.
    pub fn matches(&self, row: &PullRequestRow) -> bool {
        self.spec_type.map_or(true, |spec| row.spec_type == spec)
            && self.start.map_or(true, |start| row.created_at >= start)
            && self.end.map_or(true, |end| row.created_at <= end)
    }
}
