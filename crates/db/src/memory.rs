//! In-process store with the same replace-all semantics as the Postgres backend.
//!
//! Backs the collector and api integration tests.

use std::sync::Arc;

use async_trait::async_trait;
use common::{Category, SpecType};
use tokio::sync::RwLock;

use crate::errors::Result;
use crate::models::{
    ChartKind, ChartRow, ContributorRow, PullRequestQuery, PullRequestRow, SnapshotRow,
};
use crate::repositories::{
    ChartRepository, ContributorRepository, PullRequestRepository, Repositories,
    SnapshotRepository,
};

#[derive(Clone, Default)]
pub struct MemoryDatabase {
    pull_requests: Arc<MemoryPullRequests>,
    contributors: Arc<MemoryContributors>,
    snapshots: Arc<MemorySnapshots>,
    charts: Arc<MemoryCharts>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Repositories for MemoryDatabase {
    fn pull_requests(&self) -> &dyn PullRequestRepository {
        &*self.pull_requests
    }

    fn contributors(&self) -> &dyn ContributorRepository {
        &*self.contributors
    }

    fn snapshots(&self) -> &dyn SnapshotRepository {
        &*self.snapshots
    }

    fn charts(&self) -> &dyn ChartRepository {
        &*self.charts
    }
}

#[derive(Default)]
struct MemoryPullRequests {
    rows: RwLock<Vec<PullRequestRow>>,
}

#[async_trait]
impl PullRequestRepository for MemoryPullRequests {
    async fn replace_for_spec(
        &self,
        spec_type: SpecType,
        rows: Vec<PullRequestRow>,
    ) -> Result<u64> {
        let mut guard = self.rows.write().await;
        guard.retain(|row| row.spec_type != spec_type);
        let inserted = rows.len() as u64;
        guard.extend(rows);
        Ok(inserted)
    }

    async fn query(&self, query: PullRequestQuery) -> Result<Vec<PullRequestRow>> {
        let guard = self.rows.read().await;
        let mut rows: Vec<PullRequestRow> =
            guard.iter().filter(|row| query.matches(row)).cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        if let Some(limit) = query.limit {
            rows.truncate(limit.max(0) as usize);
        }
        Ok(rows)
    }

    async fn count_by_spec(&self) -> Result<Vec<(SpecType, i64)>> {
        let guard = self.rows.read().await;
        Ok(SpecType::ALL
            .iter()
            .map(|spec| {
                let count = guard.iter().filter(|row| row.spec_type == *spec).count();
                (*spec, count as i64)
            })
            .filter(|(_, count)| *count > 0)
            .collect())
    }
}

#[derive(Default)]
struct MemoryContributors {
    rows: RwLock<Vec<ContributorRow>>,
}

#[async_trait]
impl ContributorRepository for MemoryContributors {
    async fn replace_for_spec(
        &self,
        spec_type: SpecType,
        rows: Vec<ContributorRow>,
    ) -> Result<u64> {
        let mut guard = self.rows.write().await;
        guard.retain(|row| row.spec_type != spec_type);
        let mut inserted = 0u64;
        for row in rows {
            if guard
                .iter()
                .any(|existing| existing.spec_type == row.spec_type && existing.id == row.id)
            {
                continue;
            }
            guard.push(row);
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn list(&self, spec_type: SpecType, limit: i64) -> Result<Vec<ContributorRow>> {
        let guard = self.rows.read().await;
        let mut rows: Vec<ContributorRow> = guard
            .iter()
            .filter(|row| row.spec_type == spec_type)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.contributions
                .cmp(&a.contributions)
                .then_with(|| a.login.cmp(&b.login))
        });
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}

#[derive(Default)]
struct MemorySnapshots {
    rows: RwLock<Vec<SnapshotRow>>,
}

#[async_trait]
impl SnapshotRepository for MemorySnapshots {
    async fn insert(&self, snapshot: SnapshotRow) -> Result<()> {
        self.rows.write().await.push(snapshot);
        Ok(())
    }

    async fn latest(&self, spec_type: SpecType) -> Result<Option<SnapshotRow>> {
        let guard = self.rows.read().await;
        // Later inserts win ties, matching `ORDER BY taken_at DESC, id DESC`.
        Ok(guard
            .iter()
            .enumerate()
            .filter(|(_, row)| row.spec_type == spec_type)
            .max_by_key(|(idx, row)| (row.taken_at, *idx))
            .map(|(_, row)| row.clone()))
    }
}

#[derive(Default)]
struct MemoryCharts {
    rows: RwLock<Vec<ChartRow>>,
}

#[async_trait]
impl ChartRepository for MemoryCharts {
    async fn replace_kind(&self, kind: ChartKind, rows: Vec<ChartRow>) -> Result<u64> {
        let mut guard = self.rows.write().await;
        guard.retain(|row| row.kind != kind);
        let inserted = rows.len() as u64;
        guard.extend(rows);
        Ok(inserted)
    }

    async fn list(&self, kind: ChartKind, category: Category) -> Result<Vec<ChartRow>> {
        let guard = self.rows.read().await;
        let mut rows: Vec<ChartRow> = guard
            .iter()
            .filter(|row| row.kind == kind && row.category == category)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.rank);
        Ok(rows)
    }
}
