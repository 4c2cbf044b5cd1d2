use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use collector::{Collector, GithubClient};
use common::config::{CollectorConfig, SpecRepo};
use common::{Category, SpecType};
use db::pg::PgDatabase;
use db::{ChartKind, Repositories};
use db_test_fixture::DbFixture;
use serde_json::{json, Value};

struct SingleRepoClient;

#[async_trait]
impl GithubClient for SingleRepoClient {
    async fn list_pulls(
        &self,
        _owner: &str,
        _repo: &str,
        page: u32,
        _per_page: u32,
    ) -> Result<Vec<Value>> {
        if page > 1 {
            return Ok(Vec::new());
        }
        Ok(vec![json!({
            "id": 7001,
            "number": 12,
            "title": "Create RIP-7212 precompile",
            "state": "open",
            "html_url": "https://github.com/ethereum/RIPs/pull/12",
            "user": {"id": 5, "login": "dave"},
            "labels": [],
            "created_at": "2024-04-02T09:00:00Z",
            "updated_at": "2024-04-02T09:00:00Z",
            "closed_at": null,
            "merged_at": null
        })])
    }

    async fn list_contributors(
        &self,
        _owner: &str,
        _repo: &str,
        _page: u32,
        _per_page: u32,
    ) -> Result<Vec<Value>> {
        Ok(vec![json!({
            "id": 5,
            "login": "dave",
            "html_url": "https://github.com/dave",
            "avatar_url": null,
            "contributions": 3,
            "type": "User"
        })])
    }
}

#[tokio::test]
async fn collector_writes_through_postgres() -> Result<()> {
    let fixture = match DbFixture::from_env() {
        Ok(f) => f,
        Err(err) => {
            eprintln!("skipping collector_writes_through_postgres: {err}");
            return Ok(());
        }
    };
    let handle = fixture.create("collector_pg").await?;
    let db = Arc::new(PgDatabase::connect(handle.database_url()).await?);

    let config = CollectorConfig {
        interval_secs: 3600,
        page_size: 100,
        run_once: true,
        inter_repo_delay_secs: 0,
        repositories: vec![SpecRepo::new(SpecType::Rip, "ethereum", "RIPs")],
    };
    let collector = Collector::new(config, Arc::new(SingleRepoClient), db.clone());
    let summary = collector.run_once().await?;
    assert_eq!(summary.specs_refreshed, vec![SpecType::Rip]);

    let custom = db
        .charts()
        .list(ChartKind::CustomLabels, Category::Rips)
        .await?;
    assert_eq!(custom.len(), 1);
    assert_eq!(custom[0].key, "New RIP");
    assert_eq!(custom[0].month_year, "2024-04");

    let snapshot = db.snapshots().latest(SpecType::Rip).await?.unwrap();
    assert_eq!((snapshot.total, snapshot.open, snapshot.contributors), (1, 1, 1));

    handle.cleanup().await?;
    Ok(())
}
