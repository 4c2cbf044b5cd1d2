pub mod charts;
pub mod client;
pub mod metrics;
pub mod service;

pub use client::{BrokerGithubClient, GithubApiError, GithubClient};
pub use service::{Collector, RunSummary};
