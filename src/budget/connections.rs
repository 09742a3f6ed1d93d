use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::{BudgetError, BudgetPermit, RateBudget};

/// Caps simultaneously held units; not time-windowed
pub struct ConnectionLimiter {
    capacity: u64,
    semaphore: Arc<Semaphore>,
}

impl ConnectionLimiter {
    pub fn new(capacity: u64) -> Self {
        let capacity = capacity.clamp(1, (Semaphore::MAX_PERMITS as u64).min(u32::MAX as u64));
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity as usize)),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Units not currently held
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Refuse all further acquisitions; outstanding permits stay valid
    pub fn close(&self) {
        self.semaphore.close();
    }
}

#[async_trait]
impl RateBudget for ConnectionLimiter {
    async fn acquire(&self, units: u64) -> Result<BudgetPermit, BudgetError> {
        if units > self.capacity {
            return Err(BudgetError::ExceedsCapacity {
                requested: units,
                capacity: self.capacity,
            });
        }

        let permit = self
            .semaphore
            .clone()
            .acquire_many_owned(units as u32)
            .await
            .map_err(|_| BudgetError::Closed)?;

        Ok(BudgetPermit::held(permit))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_permits_are_released_on_drop() {
        let limiter = ConnectionLimiter::new(2);

        let first = limiter.acquire(1).await.unwrap();
        let second = limiter.acquire(1).await.unwrap();
        assert_eq!(limiter.available(), 0);

        drop(first);
        assert_eq!(limiter.available(), 1);
        drop(second);
        assert_eq!(limiter.available(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocks_at_capacity() {
        let limiter = Arc::new(ConnectionLimiter::new(1));
        let held = limiter.acquire(1).await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire(1).await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_rejects_more_than_capacity() {
        let limiter = ConnectionLimiter::new(3);
        let err = limiter.acquire(4).await.unwrap_err();
        assert_eq!(
            err,
            BudgetError::ExceedsCapacity {
                requested: 4,
                capacity: 3
            }
        );
    }

    #[tokio::test]
    async fn test_closed_limiter() {
        let limiter = ConnectionLimiter::new(3);
        limiter.close();
        assert_eq!(limiter.acquire(1).await.unwrap_err(), BudgetError::Closed);
    }
}
