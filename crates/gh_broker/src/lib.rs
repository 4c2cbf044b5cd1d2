pub mod broker;
pub mod cache;
pub mod error;
pub mod metrics;
pub mod model;
pub mod retry;
pub mod token;

pub use broker::{GithubBroker, GithubBrokerBuilder, HttpExec, ReqwestExecutor};
pub use common::config::GithubToken;
pub use error::HttpStatusError;
pub use model::GithubRequest;
pub use retry::RetryPolicy;
pub use token::RateLimitState;
