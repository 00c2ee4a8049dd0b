use crate::error::CoreError;
use crate::error_utils::ErrorExt;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Timeout and retry budget applied to each external call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallPolicy {
    /// Upper bound for a single attempt
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 1,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl CallPolicy {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            timeout,
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }
}

/// Retry strategy based on error type
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff
    Retry,
    /// Retry after the delay the server asked for
    RetryWithDelay(Duration),
    /// Don't retry (for permanent failures)
    NoRetry,
}

pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    if !error.is_retryable() {
        return RetryStrategy::NoRetry;
    }
    match error.retry_after() {
        Some(delay) => RetryStrategy::RetryWithDelay(delay),
        None => RetryStrategy::Retry,
    }
}

/// Calculate delay with exponential backoff and jitter
pub fn calculate_delay(attempt: u32, policy: &CallPolicy) -> Duration {
    let max_delay = Duration::from_millis(policy.max_delay_ms);

    let multiplier = policy.backoff_multiplier.powi(attempt as i32);
    let delay_ms = (policy.base_delay_ms as f64 * multiplier) as u64;
    let exponential_delay = Duration::from_millis(delay_ms.min(policy.max_delay_ms));

    let jitter_range = (exponential_delay.as_millis() as f64 * policy.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);

    (exponential_delay + Duration::from_millis(jitter)).min(max_delay)
}

/// Runs an operation under a [`CallPolicy`].
///
/// Every attempt is bounded by the policy timeout; an elapsed attempt becomes
/// [`CoreError::Timeout`]. Waits between attempts, including a `Retry-After`
/// from the server, are capped at `max_delay_ms`. Only retryable errors are
/// retried, and the last error is returned unchanged once the budget is spent.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: CallPolicy,
}

impl RetryExecutor {
    pub fn new(policy: CallPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &CallPolicy {
        &self.policy
    }

    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let total_attempts = self.policy.max_retries + 1;
        let mut total_delay = Duration::ZERO;
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                debug!("Retry attempt {} for {}", attempt, operation_name);
            }

            let start_time = Instant::now();
            let outcome = match timeout(self.policy.timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(CoreError::Timeout {
                    seconds: self.policy.timeout.as_secs(),
                }),
            };

            let error = match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        info!(
                            "Operation {} succeeded after {} retries (total delay: {:?})",
                            operation_name, attempt, total_delay
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            debug!(
                "Attempt {}/{} failed for {} after {:?}: {}",
                attempt + 1,
                total_attempts,
                operation_name,
                start_time.elapsed(),
                error
            );

            if attempt + 1 >= total_attempts {
                if self.policy.max_retries > 0 {
                    warn!(
                        "Operation {} failed after {} attempts: {}",
                        operation_name, total_attempts, error
                    );
                }
                return Err(error);
            }

            let delay = match get_retry_strategy(&error) {
                RetryStrategy::NoRetry => {
                    debug!("Not retrying {} due to error type: {}", operation_name, error);
                    return Err(error);
                }
                RetryStrategy::Retry => calculate_delay(attempt, &self.policy),
                // A server-requested wait never exceeds the policy cap.
                RetryStrategy::RetryWithDelay(delay) => {
                    delay.min(Duration::from_millis(self.policy.max_delay_ms))
                }
            };

            info!(
                "Retrying {} in {:?} due to: {}",
                operation_name, delay, error
            );
            total_delay += delay;
            sleep(delay).await;
            attempt += 1;
        }
    }
}
