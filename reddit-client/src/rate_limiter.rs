use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub time_window: Duration,
    pub burst_allowance: u32,
}

impl RateLimitConfig {
    pub fn reddit_oauth() -> Self {
        Self {
            max_requests: 100, // Reddit allows 100 requests per minute for OAuth2
            time_window: Duration::from_secs(60),
            burst_allowance: 10,
        }
    }

    fn refill_rate(&self) -> f64 {
        self.max_requests as f64 / self.time_window.as_secs_f64()
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant, capacity: f64, refill_rate: f64) {
        let elapsed = now.duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * refill_rate).min(capacity);
        self.last_refill = now;
    }
}

/// Token bucket shared by every request a client makes.
///
/// The bucket lock is only held while tokens are counted, never while a
/// caller sleeps or performs its request.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let bucket = Bucket {
            tokens: config.burst_allowance as f64,
            last_refill: Instant::now(),
        };
        Self {
            config,
            bucket: Mutex::new(bucket),
        }
    }

    /// Takes one token, or reports how long until one is available.
    pub async fn try_acquire(&self) -> Result<(), Duration> {
        let capacity = self.config.burst_allowance as f64;
        let refill_rate = self.config.refill_rate();

        let mut bucket = self.bucket.lock().await;
        bucket.refill(Instant::now(), capacity, refill_rate);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - bucket.tokens) / refill_rate))
        }
    }

    /// Waits until a token is available and returns the time spent queued.
    pub async fn acquire(&self) -> Duration {
        let start_time = Instant::now();
        while let Err(wait_time) = self.try_acquire().await {
            debug!("Rate limit reached, waiting {:?}", wait_time);
            sleep(wait_time).await;
        }
        start_time.elapsed()
    }

    pub async fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        bucket.refill(
            Instant::now(),
            self.config.burst_allowance as f64,
            self.config.refill_rate(),
        );
        bucket.tokens
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}
