use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::spec::SpecType;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub github: GithubConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(".")
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Config::builder()
            .add_source(
                File::with_name(
                    path.as_ref()
                        .join("config/default")
                        .to_string_lossy()
                        .as_ref(),
                )
                .required(false),
            )
            .add_source(
                File::with_name(
                    path.as_ref()
                        .join("config/local")
                        .to_string_lossy()
                        .as_ref(),
                )
                .required(false),
            )
            .add_source(Environment::default().separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default)]
    pub test_admin_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubToken {
    pub id: String,
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    #[serde(default)]
    pub tokens: Vec<GithubToken>,
    #[serde(default = "GithubConfig::default_user_agent")]
    pub user_agent: String,
}

impl GithubConfig {
    fn default_user_agent() -> String {
        "spec-pr-insights".to_string()
    }

    /// Configured tokens, falling back to a single `GITHUB_TOKEN` from the environment.
    pub fn resolved_tokens(&self) -> Vec<GithubToken> {
        if !self.tokens.is_empty() {
            return self.tokens.clone();
        }
        match std::env::var("GITHUB_TOKEN") {
            Ok(secret) if !secret.trim().is_empty() => vec![GithubToken {
                id: "env".to_string(),
                secret: secret.trim().to_string(),
            }],
            _ => Vec::new(),
        }
    }
}

/// A repository polled for one specification type.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SpecRepo {
    pub spec_type: SpecType,
    pub owner: String,
    pub name: String,
}

impl SpecRepo {
    pub fn new(spec_type: SpecType, owner: &str, name: &str) -> Self {
        Self {
            spec_type,
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "CollectorConfig::default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "CollectorConfig::default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub run_once: bool,
    #[serde(default = "CollectorConfig::default_inter_repo_delay_secs")]
    pub inter_repo_delay_secs: u64,
    #[serde(default = "CollectorConfig::default_repositories")]
    pub repositories: Vec<SpecRepo>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval_secs: Self::default_interval_secs(),
            page_size: Self::default_page_size(),
            run_once: false,
            inter_repo_delay_secs: Self::default_inter_repo_delay_secs(),
            repositories: Self::default_repositories(),
        }
    }
}

impl CollectorConfig {
    const fn default_interval_secs() -> u64 {
        3600
    }

    const fn default_page_size() -> u32 {
        100
    }

    const fn default_inter_repo_delay_secs() -> u64 {
        2
    }

    fn default_repositories() -> Vec<SpecRepo> {
        vec![
            SpecRepo::new(SpecType::Eip, "ethereum", "EIPs"),
            SpecRepo::new(SpecType::Erc, "ethereum", "ERCs"),
            SpecRepo::new(SpecType::Rip, "ethereum", "RIPs"),
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "BrokerConfig::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "BrokerConfig::default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "BrokerConfig::default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            retry_delay_ms: Self::default_retry_delay_ms(),
            cache_capacity: Self::default_cache_capacity(),
        }
    }
}

impl BrokerConfig {
    const fn default_max_attempts() -> u32 {
        3
    }

    const fn default_retry_delay_ms() -> u64 {
        5_000
    }

    const fn default_cache_capacity() -> usize {
        2_000
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "ObservabilityConfig::default_metrics_path")]
    pub metrics_path: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_path: Self::default_metrics_path(),
            otlp_endpoint: None,
        }
    }
}

impl ObservabilityConfig {
    fn default_metrics_path() -> String {
        "/metrics".to_string()
    }
}
