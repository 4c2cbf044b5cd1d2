use async_trait::async_trait;
use common::{Category, SpecType};

use crate::errors::Result;
use crate::models::{
    ChartKind, ChartRow, ContributorRow, PullRequestQuery, PullRequestRow, SnapshotRow,
};

/// Pull requests are stored per specification type and replaced wholesale on every run.
#[async_trait]
pub trait PullRequestRepository: Send + Sync {
    async fn replace_for_spec(&self, spec_type: SpecType, rows: Vec<PullRequestRow>)
        -> Result<u64>;
    async fn query(&self, query: PullRequestQuery) -> Result<Vec<PullRequestRow>>;
    async fn count_by_spec(&self) -> Result<Vec<(SpecType, i64)>>;
}

#[async_trait]
pub trait ContributorRepository: Send + Sync {
    async fn replace_for_spec(&self, spec_type: SpecType, rows: Vec<ContributorRow>)
        -> Result<u64>;
    async fn list(&self, spec_type: SpecType, limit: i64) -> Result<Vec<ContributorRow>>;
}

#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn insert(&self, snapshot: SnapshotRow) -> Result<()>;
    async fn latest(&self, spec_type: SpecType) -> Result<Option<SnapshotRow>>;
}

#[async_trait]
pub trait ChartRepository: Send + Sync {
    async fn replace_kind(&self, kind: ChartKind, rows: Vec<ChartRow>) -> Result<u64>;
    async fn list(&self, kind: ChartKind, category: Category) -> Result<Vec<ChartRow>>;
}

pub trait Repositories: Send + Sync {
    fn pull_requests(&self) -> &dyn PullRequestRepository;
    fn contributors(&self) -> &dyn ContributorRepository;
    fn snapshots(&self) -> &dyn SnapshotRepository;
    fn charts(&self) -> &dyn ChartRepository;
}
