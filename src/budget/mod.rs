//! Process-wide admission budgets shared by every chunk task.
//!
//! Three budgets gate each completion request, always acquired in the same
//! order: tokens, then requests, then connections.

pub mod connections;
pub mod limiter;

pub use connections::*;
pub use limiter::*;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OwnedSemaphorePermit;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BudgetError {
    #[error("budget has been closed")]
    Closed,

    #[error("requested {requested} units but the budget only holds {capacity}")]
    ExceedsCapacity { requested: u64, capacity: u64 },
}

/// Proof of admission. Units held by concurrency budgets are returned on drop;
/// rate budgets replenish on their own schedule and hold nothing.
#[derive(Debug)]
#[must_use = "dropping the permit releases it immediately"]
pub struct BudgetPermit {
    _held: Option<OwnedSemaphorePermit>,
}

impl BudgetPermit {
    /// A permit with nothing to release
    pub fn consumed() -> Self {
        Self { _held: None }
    }

    pub fn held(permit: OwnedSemaphorePermit) -> Self {
        Self {
            _held: Some(permit),
        }
    }
}

/// A shared, replenishing or capacity-bounded pool of units
#[async_trait]
pub trait RateBudget: Send + Sync {
    /// Wait until `units` are available and take them
    async fn acquire(&self, units: u64) -> Result<BudgetPermit, BudgetError>;
}

/// Budget sizes for a run
#[derive(Debug, Clone)]
pub struct BudgetConfig {
    /// Prompt tokens admitted per `period`
    pub tokens_per_period: u64,
    /// Requests admitted per `period`
    pub requests_per_period: u64,
    /// Replenishment window for the token and request budgets
    pub period: Duration,
    /// Maximum simultaneously open connections
    pub max_connections: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            tokens_per_period: 1_250_000,
            requests_per_period: 250,
            period: Duration::from_secs(1),
            max_connections: 2_000,
        }
    }
}

/// The three budgets injected into the request executor
#[derive(Clone)]
pub struct Budgets {
    pub tokens: Arc<dyn RateBudget>,
    pub requests: Arc<dyn RateBudget>,
    pub connections: Arc<dyn RateBudget>,
}

impl Budgets {
    pub fn new(
        tokens: Arc<dyn RateBudget>,
        requests: Arc<dyn RateBudget>,
        connections: Arc<dyn RateBudget>,
    ) -> Self {
        Self {
            tokens,
            requests,
            connections,
        }
    }

    pub fn from_config(config: &BudgetConfig) -> Self {
        Self {
            tokens: Arc::new(RateLimiter::new(config.tokens_per_period, config.period)),
            requests: Arc::new(RateLimiter::new(config.requests_per_period, config.period)),
            connections: Arc::new(ConnectionLimiter::new(config.max_connections)),
        }
    }
}

impl Default for Budgets {
    fn default() -> Self {
        Self::from_config(&BudgetConfig::default())
    }
}
