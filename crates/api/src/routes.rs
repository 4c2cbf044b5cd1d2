use std::str::FromStr;
use std::sync::Arc;

use analysis::{
    aggregate_combined, aggregate_event_counts, aggregate_hybrid, aggregate_label_counts,
    BucketOrder, LabelField, MonthlyBucket,
};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use common::{AppError, Category, SpecType};
use db::models::{ChartKind, PullRequestQuery, PullRequestRow};
use db::Repositories;
use once_cell::sync::Lazy;
use prometheus::{register_int_gauge_vec, Encoder, IntGaugeVec};
use serde::Deserialize;
use serde_json::json;
use tracing::{instrument, warn};

use crate::dto::{ChartDto, ContributorDto, PullRequestDto, SnapshotDto};
use crate::error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct ApiState {
    pub repositories: Arc<dyn Repositories>,
    pub metrics_path: &'static str,
}

pub fn build_router(state: Arc<ApiState>) -> Router {
    let metrics_path: &'static str = state.metrics_path;
    Router::new()
        .route("/healthz", get(healthz))
        .route("/pull-requests/:spec", get(list_pull_requests))
        .route("/contributors/:spec", get(list_contributors))
        .route("/snapshots/:spec", get(latest_snapshot))
        .route("/charts/:kind/:category", get(list_charts))
        .route("/stats/:spec/activity", get(activity_stats))
        .route("/stats/:spec/labels", get(label_stats))
        .route(metrics_path, get(metrics))
        .with_state(state)
}

static PULL_REQUESTS_BY_SPEC: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "db_pull_requests_total_by_spec",
        "Number of pull requests stored per specification type",
        &["spec_type"]
    )
    .expect("pull_requests_by_spec gauge")
});

async fn refresh_spec_counts(repositories: &dyn Repositories) -> Result<(), db::DbError> {
    let counts = repositories.pull_requests().count_by_spec().await?;
    for spec_type in SpecType::ALL {
        let count = counts
            .iter()
            .find(|(spec, _)| *spec == spec_type)
            .map_or(0, |(_, count)| *count);
        PULL_REQUESTS_BY_SPEC
            .with_label_values(&[spec_type.as_str()])
            .set(count);
    }
    Ok(())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// A `:spec` path segment: one specification type or `all` of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecScope {
    One(SpecType),
    All,
}

impl SpecScope {
    fn spec_types(self) -> Vec<SpecType> {
        match self {
            SpecScope::One(spec_type) => vec![spec_type],
            SpecScope::All => SpecType::ALL.to_vec(),
        }
    }
}

impl FromStr for SpecScope {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(SpecScope::All);
        }
        Ok(SpecScope::One(s.parse::<SpecType>()?))
    }
}

fn parse_spec(value: &str) -> common::Result<SpecType> {
    Ok(value.parse::<SpecType>()?)
}

#[derive(Debug, Deserialize)]
struct PullRequestsQuery {
    start: Option<String>,
    end: Option<String>,
    limit: Option<i64>,
}

#[instrument(skip(state))]
async fn list_pull_requests(
    State(state): State<Arc<ApiState>>,
    Path(spec): Path<String>,
    Query(query): Query<PullRequestsQuery>,
) -> ApiResult<Json<Vec<PullRequestDto>>> {
    let spec_type = parse_spec(&spec)?;
    let (start, end) = parse_range(query.start.as_deref(), query.end.as_deref())?;
    let rows = state
        .repositories
        .pull_requests()
        .query(PullRequestQuery {
            spec_type: Some(spec_type),
            start,
            end,
            limit: Some(query.limit.unwrap_or(500).clamp(1, 5000)),
        })
        .await?;
    Ok(Json(rows.into_iter().map(PullRequestDto::from).collect()))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

#[instrument(skip(state))]
async fn list_contributors(
    State(state): State<Arc<ApiState>>,
    Path(spec): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<ContributorDto>>> {
    let spec_type = parse_spec(&spec)?;
    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let rows = state
        .repositories
        .contributors()
        .list(spec_type, limit)
        .await?;
    Ok(Json(rows.into_iter().map(ContributorDto::from).collect()))
}

#[instrument(skip(state))]
async fn latest_snapshot(
    State(state): State<Arc<ApiState>>,
    Path(spec): Path<String>,
) -> ApiResult<Json<SnapshotDto>> {
    let spec_type = parse_spec(&spec)?;
    let snapshot = state
        .repositories
        .snapshots()
        .latest(spec_type)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no snapshot for {spec_type}")))?;
    Ok(Json(SnapshotDto::from(snapshot)))
}

#[instrument(skip(state))]
async fn list_charts(
    State(state): State<Arc<ApiState>>,
    Path((kind, category)): Path<(String, String)>,
) -> ApiResult<Json<Vec<ChartDto>>> {
    let kind = kind.parse::<ChartKind>().map_err(ApiError::bad_request)?;
    let category = category
        .parse::<Category>()
        .map_err(|err| ApiError::bad_request(err.to_string()))?;
    let rows = state.repositories.charts().list(kind, category).await?;
    Ok(Json(rows.into_iter().map(ChartDto::from).collect()))
}

#[derive(Debug, Deserialize)]
struct ActivityQuery {
    start: Option<String>,
    end: Option<String>,
    mode: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActivityMode {
    /// Open counts the backlog at each month end.
    Hybrid,
    /// Open counts PRs created in the month that are still open.
    Event,
}

fn parse_mode(value: Option<&str>) -> ApiResult<ActivityMode> {
    match value.map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("hybrid") => Ok(ActivityMode::Hybrid),
        Some("event") => Ok(ActivityMode::Event),
        Some(other) => Err(ApiError::bad_request(format!(
            "invalid activity mode: {other}"
        ))),
    }
}

#[instrument(skip(state))]
async fn activity_stats(
    State(state): State<Arc<ApiState>>,
    Path(spec): Path<String>,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<Json<Vec<MonthlyBucket>>> {
    let scope = spec.parse::<SpecScope>()?;
    let mode = parse_mode(query.mode.as_deref())?;
    let (start, end) = parse_range(query.start.as_deref(), query.end.as_deref())?;
    let per_spec = load_records(state.repositories.as_ref(), scope, start, end).await?;

    let aggregated: Vec<Vec<MonthlyBucket>> = per_spec
        .iter()
        .map(|(spec_type, rows)| match mode {
            ActivityMode::Hybrid => aggregate_hybrid(rows, *spec_type),
            ActivityMode::Event => aggregate_event_counts(rows, *spec_type),
        })
        .collect();
    Ok(Json(finish(scope, aggregated, BucketOrder::Activity)))
}

#[derive(Debug, Deserialize)]
struct LabelsQuery {
    field: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

#[instrument(skip(state))]
async fn label_stats(
    State(state): State<Arc<ApiState>>,
    Path(spec): Path<String>,
    Query(query): Query<LabelsQuery>,
) -> ApiResult<Json<Vec<MonthlyBucket>>> {
    let scope = spec.parse::<SpecScope>()?;
    let field = query
        .field
        .as_deref()
        .unwrap_or("refined")
        .parse::<LabelField>()
        .map_err(ApiError::bad_request)?;
    let (start, end) = parse_range(query.start.as_deref(), query.end.as_deref())?;
    let per_spec = load_records(state.repositories.as_ref(), scope, start, end).await?;

    let aggregated: Vec<Vec<MonthlyBucket>> = per_spec
        .iter()
        .map(|(spec_type, rows)| aggregate_label_counts(rows, field, *spec_type))
        .collect();
    Ok(Json(finish(scope, aggregated, BucketOrder::CountDesc)))
}

async fn load_records(
    repositories: &dyn Repositories,
    scope: SpecScope,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> ApiResult<Vec<(SpecType, Vec<PullRequestRow>)>> {
    let mut per_spec = Vec::new();
    for spec_type in scope.spec_types() {
        let rows = repositories
            .pull_requests()
            .query(PullRequestQuery {
                spec_type: Some(spec_type),
                start,
                end,
                limit: None,
            })
            .await?;
        per_spec.push((spec_type, rows));
    }
    Ok(per_spec)
}

fn finish(
    scope: SpecScope,
    mut aggregated: Vec<Vec<MonthlyBucket>>,
    order: BucketOrder,
) -> Vec<MonthlyBucket> {
    match scope {
        SpecScope::One(_) => aggregated.pop().unwrap_or_default(),
        SpecScope::All => {
            let inputs: Vec<&[MonthlyBucket]> = aggregated.iter().map(Vec::as_slice).collect();
            aggregate_combined(&inputs, order)
        }
    }
}

#[instrument(skip(state))]
async fn metrics(State(state): State<Arc<ApiState>>) -> ApiResult<impl IntoResponse> {
    if let Err(err) = refresh_spec_counts(state.repositories.as_ref()).await {
        warn!(error = %err, "failed to refresh pull request counts");
    }
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let content_type = encoder.format_type().to_string();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok((
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, content_type)],
        buffer,
    ))
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// Accepts RFC 3339 or `YYYY-MM-DD`. A bare end date covers the whole day.
fn parse_date(value: &str, bound: Bound) -> common::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::InvalidInput(format!("invalid date: {value}")))?;
    let start = date.and_time(chrono::NaiveTime::MIN).and_utc();
    Ok(match bound {
        Bound::Start => start,
        Bound::End => start + Duration::days(1) - Duration::milliseconds(1),
    })
}

fn parse_range(
    start: Option<&str>,
    end: Option<&str>,
) -> common::Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    let start = start.map(|v| parse_date(v, Bound::Start)).transpose()?;
    let end = end.map(|v| parse_date(v, Bound::End)).transpose()?;
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(AppError::InvalidInput("start is after end".into()));
        }
    }
    Ok((start, end))
}
