use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use analysis::{classify, summarize};
use anyhow::{Context, Result};
use chrono::Utc;
use common::config::{CollectorConfig, SpecRepo};
use common::SpecType;
use db::{ChartKind, ContributorRow, PrState, PullRequestQuery, PullRequestRow, Repositories};
use normalizer::{
    dedupe_by_id, normalize_contributor, normalize_pull, ContributorPayload,
    NormalizedContributor, NormalizedPullRequest, PullPayload,
};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::charts::{buckets_for_kind, to_chart_rows};
use crate::client::GithubClient;
use crate::metrics::{self, ActiveRepoGuard};

pub struct Collector<C: GithubClient + 'static> {
    config: CollectorConfig,
    client: Arc<C>,
    repos: Arc<dyn Repositories>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub repos_succeeded: usize,
    pub repos_failed: usize,
    /// Spec types whose stored pull requests and contributors were replaced.
    pub specs_refreshed: Vec<SpecType>,
    pub chart_rows: u64,
    /// False when the chart rebuild failed and the previous charts were kept.
    pub charts_rebuilt: bool,
}

#[derive(Default)]
struct SpecBatch {
    pulls: Vec<NormalizedPullRequest>,
    contributors: Vec<NormalizedContributor>,
}

impl<C: GithubClient + 'static> Collector<C> {
    pub fn new(config: CollectorConfig, client: Arc<C>, repos: Arc<dyn Repositories>) -> Self {
        Self {
            config,
            client,
            repos,
        }
    }

    pub async fn run(&self) -> Result<()> {
        loop {
            match self.run_once().await {
                Ok(_) => {}
                Err(err) if self.config.run_once => return Err(err),
                Err(err) => warn!(error = ?err, "collector run failed, retrying next interval"),
            }
            if self.config.run_once {
                break;
            }
            sleep(Duration::from_secs(self.config.interval_secs)).await;
        }
        Ok(())
    }

    /// One full refresh: fetch every configured repository, replace the stored
    /// pull requests and contributors per spec type, append snapshots and
    /// rebuild every chart from what is stored.
    ///
    /// A spec type with any failed repository keeps its previously stored
    /// rows; the failure is logged and the run continues.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<RunSummary> {
        let run_started = Utc::now();
        metrics::RUNS_TOTAL.inc();
        metrics::LAST_RUN_TIMESTAMP.set(run_started.timestamp());
        let _timer = metrics::RUN_DURATION.start_timer();

        let mut summary = RunSummary::default();
        let groups = group_by_spec(&self.config.repositories);
        let mut first = true;

        for (spec_type, repos) in groups {
            let mut batch = SpecBatch::default();
            let mut failed = false;
            for repo in repos {
                if !first && self.config.inter_repo_delay_secs > 0 {
                    sleep(Duration::from_secs(self.config.inter_repo_delay_secs)).await;
                }
                first = false;

                let repo_started = Instant::now();
                match self.fetch_repo(repo, &mut batch).await {
                    Ok(()) => {
                        summary.repos_succeeded += 1;
                        metrics::REPOS_PROCESSED_TOTAL
                            .with_label_values(&["success"])
                            .inc();
                        metrics::REPO_DURATION
                            .with_label_values(&["success"])
                            .observe(repo_started.elapsed().as_secs_f64());
                    }
                    Err(err) => {
                        failed = true;
                        summary.repos_failed += 1;
                        metrics::REPOS_PROCESSED_TOTAL
                            .with_label_values(&["error"])
                            .inc();
                        metrics::REPO_DURATION
                            .with_label_values(&["error"])
                            .observe(repo_started.elapsed().as_secs_f64());
                        warn!(
                            spec_type = %spec_type,
                            repo = %repo.full_name(),
                            error = ?err,
                            "failed to fetch repository, keeping stored data"
                        );
                    }
                }
            }

            if failed {
                continue;
            }
            if let Err(err) = self.store_spec(spec_type, batch).await {
                summary.repos_failed += 1;
                warn!(spec_type = %spec_type, error = ?err, "failed to store spec type");
                continue;
            }
            summary.specs_refreshed.push(spec_type);
        }

        match self.rebuild_charts().await {
            Ok(rows) => {
                summary.chart_rows = rows;
                summary.charts_rebuilt = true;
            }
            Err(err) => warn!(error = ?err, "failed to rebuild charts, keeping stored charts"),
        }

        if summary.repos_failed == 0 && summary.charts_rebuilt {
            metrics::RUN_SUCCESSES_TOTAL.inc();
            metrics::LAST_SUCCESS_TIMESTAMP.set(Utc::now().timestamp());
        } else {
            metrics::RUN_FAILURES_TOTAL.inc();
        }
        info!(
            succeeded = summary.repos_succeeded,
            failed = summary.repos_failed,
            chart_rows = summary.chart_rows,
            charts_rebuilt = summary.charts_rebuilt,
            "collector run finished"
        );
        Ok(summary)
    }

    async fn fetch_repo(&self, repo: &SpecRepo, batch: &mut SpecBatch) -> Result<()> {
        let _active_repo = ActiveRepoGuard::new();
        let full_name = repo.full_name();
        info!(repo = %full_name, spec_type = %repo.spec_type, "fetching repository");

        let contributors = self
            .fetch_all(|page, per_page| {
                self.client
                    .list_contributors(&repo.owner, &repo.name, page, per_page)
            })
            .await
            .with_context(|| format!("listing contributors of {full_name}"))?;
        for value in contributors {
            match serde_json::from_value::<ContributorPayload>(value) {
                Ok(payload) => batch
                    .contributors
                    .push(normalize_contributor(&payload, repo.spec_type)),
                Err(err) => skip_record("malformed_contributor", &full_name, &err),
            }
        }

        let pulls = self
            .fetch_all(|page, per_page| {
                self.client
                    .list_pulls(&repo.owner, &repo.name, page, per_page)
            })
            .await
            .with_context(|| format!("listing pull requests of {full_name}"))?;
        for value in pulls {
            let payload = match serde_json::from_value::<PullPayload>(value) {
                Ok(payload) => payload,
                Err(err) => {
                    skip_record("malformed_pull", &full_name, &err);
                    continue;
                }
            };
            match normalize_pull(&payload, repo.spec_type, &full_name) {
                Ok(pull) => batch.pulls.push(pull),
                Err(err) => skip_record("missing_created_at", &full_name, &err),
            }
        }
        Ok(())
    }

    /// Pages through a listing until GitHub returns a short page.
    async fn fetch_all<F, Fut>(&self, mut fetch_page: F) -> Result<Vec<Value>>
    where
        F: FnMut(u32, u32) -> Fut,
        Fut: std::future::Future<Output = Result<Vec<Value>>>,
    {
        let per_page = self.config.page_size.max(1);
        let mut items = Vec::new();
        let mut page = 1u32;
        loop {
            let batch = fetch_page(page, per_page).await?;
            let len = batch.len();
            items.extend(batch);
            if len < per_page as usize {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    async fn store_spec(&self, spec_type: SpecType, batch: SpecBatch) -> Result<()> {
        let contributors: Vec<ContributorRow> =
            batch.contributors.iter().map(to_contributor_row).collect();
        let contributor_count = self
            .repos
            .contributors()
            .replace_for_spec(spec_type, contributors)
            .await?;

        let rows: Vec<PullRequestRow> = dedupe_by_id(batch.pulls)
            .iter()
            .map(to_pull_request_row)
            .collect();
        let snapshot = summarize(&rows, contributor_count as usize, spec_type, Utc::now());
        let stored = self
            .repos
            .pull_requests()
            .replace_for_spec(spec_type, rows)
            .await?;
        metrics::PULL_REQUESTS_STORED_TOTAL
            .with_label_values(&[spec_type.as_str()])
            .inc_by(stored);

        self.repos.snapshots().insert(snapshot).await?;
        info!(
            spec_type = %spec_type,
            pull_requests = stored,
            contributors = contributor_count,
            "stored spec type"
        );
        Ok(())
    }

    async fn rebuild_charts(&self) -> Result<u64> {
        let mut records = Vec::with_capacity(SpecType::ALL.len());
        for spec_type in SpecType::ALL {
            let rows = self
                .repos
                .pull_requests()
                .query(PullRequestQuery::for_spec(spec_type))
                .await?;
            records.push((spec_type, rows));
        }

        let generated_at = Utc::now();
        let mut written = 0;
        for kind in ChartKind::ALL {
            let rows = to_chart_rows(kind, buckets_for_kind(kind, &records), generated_at);
            let count = self.repos.charts().replace_kind(kind, rows).await?;
            metrics::CHART_ROWS_WRITTEN_TOTAL
                .with_label_values(&[kind.as_str()])
                .inc_by(count);
            debug!(kind = %kind, rows = count, "replaced chart");
            written += count;
        }
        Ok(written)
    }
}

fn skip_record(reason: &str, repo: &str, err: &dyn std::fmt::Display) {
    metrics::RECORDS_SKIPPED_TOTAL
        .with_label_values(&[reason])
        .inc();
    warn!(repo = %repo, reason, error = %err, "skipping record");
}

/// Configured repositories grouped by spec type, in first-seen order.
fn group_by_spec(repositories: &[SpecRepo]) -> Vec<(SpecType, Vec<&SpecRepo>)> {
    let mut order = Vec::new();
    let mut groups: HashMap<SpecType, Vec<&SpecRepo>> = HashMap::new();
    for repo in repositories {
        groups
            .entry(repo.spec_type)
            .or_insert_with(|| {
                order.push(repo.spec_type);
                Vec::new()
            })
            .push(repo);
    }
    order
        .into_iter()
        .map(|spec| (spec, groups.remove(&spec).unwrap_or_default()))
        .collect()
}

fn to_pull_request_row(normalized: &NormalizedPullRequest) -> PullRequestRow {
    let classification = classify(
        &normalized.title,
        &normalized.raw_labels,
        normalized.spec_type,
    );
    PullRequestRow {
        id: normalized.id,
        number: normalized.number,
        spec_type: normalized.spec_type,
        repo_full_name: normalized.repo_full_name.clone(),
        title: normalized.title.clone(),
        author: normalized.author.clone(),
        html_url: normalized.html_url.clone(),
        state: PrState::derive(normalized.closed_at, normalized.merged_at),
        created_at: normalized.created_at,
        updated_at: normalized.updated_at,
        closed_at: normalized.closed_at,
        merged_at: normalized.merged_at,
        raw_labels: normalized.raw_labels.clone(),
        refined_labels: classification.refined_labels.into_iter().collect(),
        custom_labels: classification.custom_labels.into_iter().collect(),
    }
}

fn to_contributor_row(normalized: &NormalizedContributor) -> ContributorRow {
    ContributorRow {
        spec_type: normalized.spec_type,
        id: normalized.id,
        login: normalized.login.clone(),
        html_url: normalized.html_url.clone(),
        avatar_url: normalized.avatar_url.clone(),
        contributions: normalized.contributions,
        account_type: normalized.account_type.clone(),
    }
}
