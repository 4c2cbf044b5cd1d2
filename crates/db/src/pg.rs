use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Category, SpecType};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tokio::time::{sleep, Duration};
use tracing::{info, instrument, warn};

use crate::errors::{DbError, Result};
use crate::models::{
    ChartKind, ChartRow, ContributorRow, PrState, PullRequestQuery, PullRequestRow, SnapshotRow,
};
use crate::repositories::{
    ChartRepository, ContributorRepository, PullRequestRepository, Repositories,
    SnapshotRepository,
};

// Postgres caps a statement at 65535 bind parameters.
const INSERT_CHUNK: usize = 1_000;

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(DbError::Migration)
}

#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
    pull_request_repo: Arc<PgPullRequestRepository>,
    contributor_repo: Arc<PgContributorRepository>,
    snapshot_repo: Arc<PgSnapshotRepository>,
    chart_repo: Arc<PgChartRepository>,
}

impl PgDatabase {
    pub async fn connect(database_url: &str) -> Result<Self> {
        const MAX_ATTEMPTS: u32 = 5;
        const BASE_DELAY_MS: u64 = 500;

        let mut attempts = 0;
        loop {
            match PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await
            {
                Ok(pool) => {
                    run_migrations(&pool).await?;
                    return Ok(Self::from_pool(pool));
                }
                Err(err) => {
                    attempts += 1;
                    if attempts >= MAX_ATTEMPTS {
                        return Err(DbError::Query(err));
                    }

                    let exp = (attempts - 1).min(5);
                    let backoff = Duration::from_millis(BASE_DELAY_MS * (1u64 << exp));
                    warn!(
                        attempts,
                        error = %err,
                        wait_ms = backoff.as_millis(),
                        "database connection failed; retrying"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }

    pub fn from_pool(pool: PgPool) -> Self {
        let pull_request_repo = Arc::new(PgPullRequestRepository { pool: pool.clone() });
        let contributor_repo = Arc::new(PgContributorRepository { pool: pool.clone() });
        let snapshot_repo = Arc::new(PgSnapshotRepository { pool: pool.clone() });
        let chart_repo = Arc::new(PgChartRepository { pool: pool.clone() });

        Self {
            pool,
            pull_request_repo,
            contributor_repo,
            snapshot_repo,
            chart_repo,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Repositories for PgDatabase {
    fn pull_requests(&self) -> &dyn PullRequestRepository {
        &*self.pull_request_repo
    }

    fn contributors(&self) -> &dyn ContributorRepository {
        &*self.contributor_repo
    }

    fn snapshots(&self) -> &dyn SnapshotRepository {
        &*self.snapshot_repo
    }

    fn charts(&self) -> &dyn ChartRepository {
        &*self.chart_repo
    }
}

fn decode<T: FromStr>(value: String) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|err| DbError::Decode(err.to_string()))
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column).map_err(DbError::Query)
}

#[derive(Clone)]
struct PgPullRequestRepository {
    pool: PgPool,
}

impl PgPullRequestRepository {
    fn from_row(row: &PgRow) -> Result<PullRequestRow> {
        Ok(PullRequestRow {
            id: get(row, "id")?,
            number: get(row, "number")?,
            spec_type: decode(get(row, "spec_type")?)?,
            repo_full_name: get(row, "repo_full_name")?,
            title: get(row, "title")?,
            author: get(row, "author")?,
            html_url: get(row, "html_url")?,
            state: decode::<PrState>(get(row, "state")?)?,
            created_at: get(row, "created_at")?,
            updated_at: get(row, "updated_at")?,
            closed_at: get(row, "closed_at")?,
            merged_at: get(row, "merged_at")?,
            raw_labels: get(row, "raw_labels")?,
            refined_labels: get(row, "refined_labels")?,
            custom_labels: get(row, "custom_labels")?,
        })
    }
}

#[async_trait]
impl PullRequestRepository for PgPullRequestRepository {
    #[instrument(skip(self, rows), fields(spec_type = %spec_type, count = rows.len()))]
    async fn replace_for_spec(
        &self,
        spec_type: SpecType,
        rows: Vec<PullRequestRow>,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;
        sqlx::query("DELETE FROM pull_requests WHERE spec_type = $1")
            .bind(spec_type.as_str())
            .execute(&mut *tx)
            .await
            .map_err(DbError::Query)?;

        let mut inserted = 0u64;
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO pull_requests (id, number, spec_type, repo_full_name, title, author, \
                 html_url, state, created_at, updated_at, closed_at, merged_at, raw_labels, \
                 refined_labels, custom_labels) ",
            );
            builder.push_values(chunk, |mut b, pr| {
                b.push_bind(pr.id)
                    .push_bind(pr.number)
                    .push_bind(pr.spec_type.as_str())
                    .push_bind(pr.repo_full_name.clone())
                    .push_bind(pr.title.clone())
                    .push_bind(pr.author.clone())
                    .push_bind(pr.html_url.clone())
                    .push_bind(pr.state.as_str())
                    .push_bind(pr.created_at)
                    .push_bind(pr.updated_at)
                    .push_bind(pr.closed_at)
                    .push_bind(pr.merged_at)
                    .push_bind(pr.raw_labels.clone())
                    .push_bind(pr.refined_labels.clone())
                    .push_bind(pr.custom_labels.clone());
            });
            let result = builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(DbError::Query)?;
            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(DbError::Query)?;
        info!(inserted, "replaced pull requests");
        Ok(inserted)
    }

    async fn query(&self, query: PullRequestQuery) -> Result<Vec<PullRequestRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, number, spec_type, repo_full_name, title, author, html_url, state,
                   created_at, updated_at, closed_at, merged_at,
                   raw_labels, refined_labels, custom_labels
            FROM pull_requests
            WHERE ($1::text IS NULL OR spec_type = $1)
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at <= $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(query.spec_type.map(|spec| spec.as_str()))
        .bind(query.start)
        .bind(query.end)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn count_by_spec(&self) -> Result<Vec<(SpecType, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT spec_type, COUNT(*)::BIGINT AS count
            FROM pull_requests
            GROUP BY spec_type
            ORDER BY spec_type
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        rows.iter()
            .map(|row| Ok::<_, DbError>((decode(get(row, "spec_type")?)?, get(row, "count")?)))
            .collect()
    }
}

#[derive(Clone)]
struct PgContributorRepository {
    pool: PgPool,
}

#[async_trait]
impl ContributorRepository for PgContributorRepository {
    #[instrument(skip(self, rows), fields(spec_type = %spec_type, count = rows.len()))]
    async fn replace_for_spec(
        &self,
        spec_type: SpecType,
        rows: Vec<ContributorRow>,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;
        sqlx::query("DELETE FROM contributors WHERE spec_type = $1")
            .bind(spec_type.as_str())
            .execute(&mut *tx)
            .await
            .map_err(DbError::Query)?;

        let mut inserted = 0u64;
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO contributors (spec_type, id, login, html_url, avatar_url, \
                 contributions, account_type) ",
            );
            builder.push_values(chunk, |mut b, contributor| {
                b.push_bind(contributor.spec_type.as_str())
                    .push_bind(contributor.id)
                    .push_bind(contributor.login.clone())
                    .push_bind(contributor.html_url.clone())
                    .push_bind(contributor.avatar_url.clone())
                    .push_bind(contributor.contributions)
                    .push_bind(contributor.account_type.clone());
            });
            // Anonymous contributors share an id; keep the first.
            builder.push(" ON CONFLICT (spec_type, id) DO NOTHING");
            let result = builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(DbError::Query)?;
            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(DbError::Query)?;
        Ok(inserted)
    }

    async fn list(&self, spec_type: SpecType, limit: i64) -> Result<Vec<ContributorRow>> {
        let rows = sqlx::query(
            r#"
            SELECT spec_type, id, login, html_url, avatar_url, contributions, account_type
            FROM contributors
            WHERE spec_type = $1
            ORDER BY contributions DESC, login
            LIMIT $2
            "#,
        )
        .bind(spec_type.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        rows.iter()
            .map(|row| {
                Ok::<_, DbError>(ContributorRow {
                    spec_type: decode(get(row, "spec_type")?)?,
                    id: get(row, "id")?,
                    login: get(row, "login")?,
                    html_url: get(row, "html_url")?,
                    avatar_url: get(row, "avatar_url")?,
                    contributions: get(row, "contributions")?,
                    account_type: get(row, "account_type")?,
                })
            })
            .collect()
    }
}

#[derive(Clone)]
struct PgSnapshotRepository {
    pool: PgPool,
}

#[async_trait]
impl SnapshotRepository for PgSnapshotRepository {
    async fn insert(&self, snapshot: SnapshotRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (spec_type, taken_at, total, open, merged, closed, contributors)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(snapshot.spec_type.as_str())
        .bind(snapshot.taken_at)
        .bind(snapshot.total)
        .bind(snapshot.open)
        .bind(snapshot.merged)
        .bind(snapshot.closed)
        .bind(snapshot.contributors)
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(DbError::Query)
    }

    async fn latest(&self, spec_type: SpecType) -> Result<Option<SnapshotRow>> {
        let row = sqlx::query(
            r#"
            SELECT spec_type, taken_at, total, open, merged, closed, contributors
            FROM snapshots
            WHERE spec_type = $1
            ORDER BY taken_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(spec_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        row.map(|row| {
            Ok::<_, DbError>(SnapshotRow {
                spec_type: decode(get(&row, "spec_type")?)?,
                taken_at: get(&row, "taken_at")?,
                total: get(&row, "total")?,
                open: get(&row, "open")?,
                merged: get(&row, "merged")?,
                closed: get(&row, "closed")?,
                contributors: get(&row, "contributors")?,
            })
        })
        .transpose()
    }
}

#[derive(Clone)]
struct PgChartRepository {
    pool: PgPool,
}

#[async_trait]
impl ChartRepository for PgChartRepository {
    #[instrument(skip(self, rows), fields(kind = %kind, count = rows.len()))]
    async fn replace_kind(&self, kind: ChartKind, rows: Vec<ChartRow>) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;
        sqlx::query("DELETE FROM charts WHERE kind = $1")
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await
            .map_err(DbError::Query)?;

        let mut inserted = 0u64;
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO charts (id, rank, kind, category, month_year, key, count, \
                 generated_at) ",
            );
            builder.push_values(chunk, |mut b, chart| {
                b.push_bind(chart.id)
                    .push_bind(chart.rank)
                    .push_bind(chart.kind.as_str())
                    .push_bind(chart.category.as_str())
                    .push_bind(chart.month_year.clone())
                    .push_bind(chart.key.clone())
                    .push_bind(chart.count)
                    .push_bind(chart.generated_at);
            });
            let result = builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(DbError::Query)?;
            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(DbError::Query)?;
        Ok(inserted)
    }

    async fn list(&self, kind: ChartKind, category: Category) -> Result<Vec<ChartRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, rank, kind, category, month_year, key, count, generated_at
            FROM charts
            WHERE kind = $1 AND category = $2
            ORDER BY rank
            "#,
        )
        .bind(kind.as_str())
        .bind(category.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        rows.iter()
            .map(|row| {
                Ok::<_, DbError>(ChartRow {
                    id: get(row, "id")?,
                    rank: get(row, "rank")?,
                    kind: decode(get(row, "kind")?)?,
                    category: decode(get(row, "category")?)?,
                    month_year: get(row, "month_year")?,
                    key: get(row, "key")?,
                    count: get(row, "count")?,
                    generated_at: get(row, "generated_at")?,
                })
            })
            .collect()
    }
}
