//! Retry with bounded exponential backoff and jitter.
//!
//! # Example
//!
//! ```no_run
//! use cmil_bench_client::retry::{retry, ExponentialBackoff, RetryConfig, Retryable};
//!
//! #[derive(Debug)]
//! struct Flaky;
//!
//! # impl std::fmt::Display for Flaky {
//! #     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//! #         write!(f, "flaky")
//! #     }
//! # }
//!
//! impl Retryable for Flaky {
//!     fn is_retryable(&self) -> bool {
//!         true
//!     }
//! }
//!
//! # async fn example() {
//! let policy = ExponentialBackoff::new(RetryConfig::default());
//! let result = retry(&policy, || async { Ok::<_, Flaky>(42) }).await;
//! assert_eq!(result.unwrap().value, 42);
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_attempts: usize,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Jitter strategy for retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Full jitter: random value between 0 and calculated delay
    #[default]
    Full,
    /// Equal jitter: half delay + random half
    Equal,
}

/// Errors that know whether another attempt can help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Server-requested wait that replaces the computed backoff.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Trait for retry policies
pub trait RetryPolicy: Send + Sync {
    /// Calculate the delay before the next retry attempt
    ///
    /// Returns `None` if no more retries should be attempted
    fn next_delay(&self, attempt: usize) -> Option<Duration>;

    /// Maximum number of retries
    fn max_attempts(&self) -> usize;
}

/// Exponential backoff retry policy
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: RetryConfig,
    jitter_strategy: JitterStrategy,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff policy
    pub fn new(config: RetryConfig) -> Self {
        let jitter_strategy = if config.jitter {
            JitterStrategy::Full
        } else {
            JitterStrategy::None
        };

        Self {
            config,
            jitter_strategy,
        }
    }

    /// Create with specific jitter strategy
    pub fn with_jitter(config: RetryConfig, jitter_strategy: JitterStrategy) -> Self {
        Self {
            config,
            jitter_strategy,
        }
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        match self.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                let jitter = rand::random::<f64>();
                Duration::from_secs_f64(delay.as_secs_f64() * jitter)
            }
            JitterStrategy::Equal => {
                let jitter = rand::random::<f64>();
                let base = delay.as_secs_f64() / 2.0;
                Duration::from_secs_f64(base + (base * jitter))
            }
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if attempt >= self.config.max_attempts {
            return None;
        }

        let base_delay = self.config.initial_delay.as_secs_f64()
            * self.config.multiplier.powi(attempt as i32);

        let delay = Duration::from_secs_f64(base_delay.min(self.config.max_delay.as_secs_f64()));

        Some(self.apply_jitter(delay))
    }

    fn max_attempts(&self) -> usize {
        self.config.max_attempts
    }
}

/// A value together with the number of attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Error wrapper that includes retry attempt information
#[derive(Debug)]
pub struct RetryError<E> {
    /// The underlying error
    pub error: E,
    /// Number of attempts made
    pub attempts: u32,
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Operation failed after {} attempts: {}",
            self.attempts, self.error
        )
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Retry an operation with the given policy.
///
/// Non-retryable errors are returned at once. A `retry_after` hint from the
/// error replaces the policy delay, but still consumes an attempt.
pub async fn retry<F, Fut, T, E, P>(policy: &P, mut f: F) -> Result<Attempted<T>, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
    P: RetryPolicy + ?Sized,
{
    let mut attempt = 0usize;

    loop {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("Operation succeeded after {} retries", attempt);
                }
                return Ok(Attempted {
                    value,
                    attempts: attempt as u32 + 1,
                });
            }
            Err(e) => {
                if !e.is_retryable() {
                    return Err(RetryError {
                        error: e,
                        attempts: attempt as u32 + 1,
                    });
                }

                match policy.next_delay(attempt) {
                    Some(delay) => {
                        let delay = e.retry_after().unwrap_or(delay);
                        warn!(
                            "Attempt {}/{} failed: {}; retrying after {:?}",
                            attempt + 1,
                            policy.max_attempts() + 1,
                            e,
                            delay
                        );
                        sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        warn!("Max retry attempts reached: {}", e);
                        return Err(RetryError {
                            error: e,
                            attempts: attempt as u32 + 1,
                        });
                    }
                }
            }
        }
    }
}
