use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use collector::{BrokerGithubClient, Collector};
use common::{config::AppConfig, logging};
use db::pg::{run_migrations, PgDatabase};
use db::Repositories;
use gh_broker::{GithubBrokerBuilder, RetryPolicy};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    logging::init_tracing(
        "collector",
        "info",
        config.observability.otlp_endpoint.as_deref(),
    );

    let tokens = config.github.resolved_tokens();
    if tokens.is_empty() {
        warn!("no GitHub tokens configured, requests will be unauthenticated");
    }

    let broker = GithubBrokerBuilder::new(tokens)
        .user_agent(config.github.user_agent.clone())
        .cache_capacity(config.broker.cache_capacity)
        .retry(RetryPolicy::new(
            config.broker.max_attempts,
            Duration::from_millis(config.broker.retry_delay_ms),
        ))
        .build()?;
    let client = Arc::new(BrokerGithubClient::new(
        broker,
        config.github.user_agent.clone(),
    )?);

    let database = Arc::new(PgDatabase::connect(&config.database.url).await?);
    run_migrations(database.pool()).await?;
    let repositories: Arc<dyn Repositories> = database.clone() as Arc<dyn Repositories>;

    let collector = Collector::new(config.collector.clone(), client, repositories);
    info!(
        interval = config.collector.interval_secs,
        repositories = config.collector.repositories.len(),
        "collector started"
    );
    let result = collector.run().await;
    logging::shutdown_tracer_provider();
    result
}
