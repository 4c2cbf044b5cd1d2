use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::config::GithubToken;
use tokio::sync::Mutex;

use crate::model::RateLimitUpdate;

#[derive(Debug, Clone)]
pub struct RateLimitState {
    pub limit: i64,
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitState {
    pub fn new() -> Self {
        Self {
            limit: 5000,
            remaining: 5000,
            reset_at: Utc::now(),
        }
    }

    pub fn update(&mut self, update: RateLimitUpdate) {
        self.limit = update.limit;
        self.remaining = update.remaining;
        self.reset_at = update.reset;
    }

    pub fn consume(&mut self, cost: i64) {
        self.remaining = (self.remaining - cost).max(0);
    }

    fn available(&self, now: DateTime<Utc>) -> bool {
        self.remaining > 0 || self.reset_at <= now
    }
}

#[derive(Debug)]
struct TokenState {
    token: GithubToken,
    rate: RateLimitState,
}

pub enum TokenSelection {
    Token(GithubToken),
    /// Every token is exhausted until the earliest reset.
    Wait(Duration),
    /// No tokens are configured; send the request unauthenticated.
    Anonymous,
}

#[derive(Clone)]
pub struct TokenPool {
    inner: Arc<Mutex<Vec<TokenState>>>,
}

impl TokenPool {
    pub fn new(tokens: Vec<GithubToken>) -> Self {
        let states = tokens
            .into_iter()
            .map(|token| TokenState {
                token,
                rate: RateLimitState::new(),
            })
            .collect();
        Self {
            inner: Arc::new(Mutex::new(states)),
        }
    }

    /// Picks the token with the largest remaining share of its limit.
    pub async fn pick_token(&self) -> TokenSelection {
        let guard = self.inner.lock().await;
        if guard.is_empty() {
            return TokenSelection::Anonymous;
        }
        let now = Utc::now();
        let mut best: Option<(f64, &GithubToken)> = None;
        let mut next_reset: Option<Duration> = None;

        for state in guard.iter() {
            let rl = &state.rate;
            if rl.available(now) {
                let score = rl.remaining as f64 / rl.limit.max(1) as f64;
                if best.map_or(true, |(best_score, _)| score > best_score) {
                    best = Some((score, &state.token));
                }
            } else {
                let wait = (rl.reset_at - now).to_std().unwrap_or_default();
                next_reset = Some(next_reset.map_or(wait, |existing| existing.min(wait)));
            }
        }

        match (best, next_reset) {
            (Some((_, token)), _) => TokenSelection::Token(token.clone()),
            (None, Some(wait)) => TokenSelection::Wait(wait),
            (None, None) => TokenSelection::Anonymous,
        }
    }

    pub async fn update(&self, token_id: &str, update: RateLimitUpdate) {
        let mut guard = self.inner.lock().await;
        if let Some(state) = guard.iter_mut().find(|s| s.token.id == token_id) {
            state.rate.update(update);
        }
    }

    pub async fn consume(&self, token_id: &str, amount: i64) {
        let mut guard = self.inner.lock().await;
        if let Some(state) = guard.iter_mut().find(|s| s.token.id == token_id) {
            state.rate.consume(amount);
        }
    }

    pub async fn remaining(&self, token_id: &str) -> Option<i64> {
        let guard = self.inner.lock().await;
        guard
            .iter()
            .find(|s| s.token.id == token_id)
            .map(|s| s.rate.remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(id: &str) -> GithubToken {
        GithubToken {
            id: id.into(),
            secret: format!("secret-{id}"),
        }
    }

    fn update(remaining: i64, reset: DateTime<Utc>) -> RateLimitUpdate {
        RateLimitUpdate {
            limit: 5000,
            remaining,
            reset,
        }
    }

    #[tokio::test]
    async fn prefers_token_with_most_remaining() {
        let pool = TokenPool::new(vec![token("a"), token("b")]);
        let reset = Utc::now() + chrono::Duration::minutes(30);
        pool.update("a", update(10, reset)).await;
        pool.update("b", update(4000, reset)).await;
        match pool.pick_token().await {
            TokenSelection::Token(t) => assert_eq!(t.id, "b"),
            _ => panic!("expected a token"),
        }
    }

    #[tokio::test]
    async fn waits_until_earliest_reset_when_exhausted() {
        let pool = TokenPool::new(vec![token("a"), token("b")]);
        let now = Utc::now();
        pool.update("a", update(0, now + chrono::Duration::seconds(600))).await;
        pool.update("b", update(0, now + chrono::Duration::seconds(120))).await;
        match pool.pick_token().await {
            TokenSelection::Wait(wait) => {
                assert!(wait <= Duration::from_secs(120));
                assert!(wait > Duration::from_secs(100));
            }
            _ => panic!("expected to wait"),
        }
    }

    #[tokio::test]
    async fn empty_pool_is_anonymous() {
        let pool = TokenPool::new(vec![]);
        assert!(matches!(pool.pick_token().await, TokenSelection::Anonymous));
    }

    #[tokio::test]
    async fn consume_never_goes_negative() {
        let pool = TokenPool::new(vec![token("a")]);
        pool.update("a", update(1, Utc::now())).await;
        pool.consume("a", 5).await;
        assert_eq!(pool.remaining("a").await, Some(0));
    }
}
