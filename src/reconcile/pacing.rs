use std::time::Duration;
use tokio::time::Instant;

use crate::config::PacingConfig;

/// Throttle applied after every user in a batch run
#[derive(Debug)]
pub enum Pacer {
    /// Sleep the same amount after each user
    Fixed(Duration),
    /// Allow short bursts, then one permit per interval
    Bucket(TokenBucket),
}

impl Pacer {
    /// Pacer for `/backup` runs
    pub fn for_backup(config: &PacingConfig) -> Self {
        Self::build(config.backup_delay, config.burst)
    }

    /// Pacer for `/verified` lookups
    pub fn for_stats(config: &PacingConfig) -> Self {
        Self::build(config.stats_delay, config.burst)
    }

    fn build(delay: Duration, burst: Option<u32>) -> Self {
        match burst {
            Some(capacity) if capacity > 1 && !delay.is_zero() => {
                Pacer::Bucket(TokenBucket::new(capacity, delay))
            }
            _ => Pacer::Fixed(delay),
        }
    }

    pub async fn wait(&mut self) {
        match self {
            Pacer::Fixed(delay) => {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
            }
            Pacer::Bucket(bucket) => bucket.acquire().await,
        }
    }
}

#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    available: u32,
    interval: Duration,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, interval: Duration) -> Self {
        Self {
            capacity,
            available: capacity,
            interval,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let elapsed = Instant::now().saturating_duration_since(self.last_refill);
        let permits = (elapsed.as_nanos() / self.interval.as_nanos().max(1)) as u32;
        if permits > 0 {
            self.available = self.capacity.min(self.available.saturating_add(permits));
            self.last_refill += self.interval * permits;
        }
    }

    pub async fn acquire(&mut self) {
        self.refill();
        if self.available == 0 {
            tokio::time::sleep_until(self.last_refill + self.interval).await;
            self.refill();
        }
        self.available = self.available.saturating_sub(1);
    }
}
