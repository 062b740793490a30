/// Token bucket rate limiter for provider calls
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

pub struct RateLimiter {
    capacity: u32,
    tokens: Arc<Mutex<u32>>,
    refill_period: Duration,
    last_refill: Arc<Mutex<Instant>>,
}

impl RateLimiter {
    /// `capacity` requests per `refill_period`, refilled one token per slice
    pub fn new(capacity: u32, refill_period: Duration) -> Self {
        let capacity = capacity.max(1);
        RateLimiter {
            capacity,
            tokens: Arc::new(Mutex::new(capacity)),
            refill_period,
            last_refill: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn per_minute(requests: u32) -> Self {
        Self::new(requests, Duration::from_secs(60))
    }

    /// Time for one token to come back
    fn slice(&self) -> Duration {
        self.refill_period / self.capacity
    }

    /// Try to acquire a token, returns true if successful
    pub async fn try_acquire(&self) -> bool {
        self.refill().await;

        let mut tokens = self.tokens.lock().await;
        if *tokens > 0 {
            *tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Wait until a token is available, then acquire it
    pub async fn acquire(&self) {
        let mut waited = false;
        loop {
            if self.try_acquire().await {
                if waited {
                    debug!("Rate limiter released after wait");
                }
                return;
            }
            waited = true;
            tokio::time::sleep(self.slice().min(Duration::from_millis(100))).await;
        }
    }

    async fn refill(&self) {
        let mut last_refill = self.last_refill.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(*last_refill);
        let slice = self.slice();

        if elapsed >= slice {
            let slices = (elapsed.as_secs_f64() / slice.as_secs_f64()) as u32;

            let mut tokens = self.tokens.lock().await;
            *tokens = tokens.saturating_add(slices).min(self.capacity);
            *last_refill += slice * slices;
        }
    }

    /// Get current available tokens
    pub async fn available(&self) -> u32 {
        self.refill().await;
        let tokens = self.tokens.lock().await;
        *tokens
    }
}
