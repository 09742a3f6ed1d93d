use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::debug;

use super::{BudgetError, BudgetPermit, RateBudget};

/// Shortest wait between refill checks, so rounding never spins
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Leaky-bucket rate limiter: at most `capacity` units per `period`.
///
/// The bucket drains continuously at `capacity / period`. Waiters are admitted
/// strictly first-come first-served; a request larger than `capacity` is taken
/// in capacity-sized pieces across successive refills instead of failing.
pub struct RateLimiter {
    capacity: f64,
    period: Duration,
    bucket: Mutex<Bucket>,
}

struct Bucket {
    level: f64,
    last_leak: Instant,
}

impl RateLimiter {
    pub fn new(capacity: u64, period: Duration) -> Self {
        Self {
            capacity: capacity.max(1) as f64,
            period,
            bucket: Mutex::new(Bucket {
                level: 0.0,
                last_leak: Instant::now(),
            }),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity as u64
    }

    fn drain_rate(&self) -> f64 {
        self.capacity / self.period.as_secs_f64().max(f64::EPSILON)
    }

    fn leak(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_leak).as_secs_f64();
        bucket.level = (bucket.level - elapsed * self.drain_rate()).max(0.0);
        bucket.last_leak = now;
    }

    async fn take(&self, units: u64) {
        // held across waits so later callers queue behind this one
        let mut bucket = self.bucket.lock().await;
        let mut remaining = units as f64;

        while remaining > 0.0 {
            let piece = remaining.min(self.capacity);
            loop {
                self.leak(&mut bucket);
                let overflow = bucket.level + piece - self.capacity;
                if overflow <= 1e-6 {
                    bucket.level += piece;
                    break;
                }
                let wait = Duration::from_secs_f64(overflow / self.drain_rate()).max(MIN_WAIT);
                sleep(wait).await;
            }
            remaining -= piece;
        }
    }
}

#[async_trait]
impl RateBudget for RateLimiter {
    async fn acquire(&self, units: u64) -> Result<BudgetPermit, BudgetError> {
        if units > self.capacity() {
            debug!(
                "Acquiring {} units across multiple refills of {}",
                units,
                self.capacity()
            );
        }
        self.take(units).await;
        Ok(BudgetPermit::consumed())
    }
}
