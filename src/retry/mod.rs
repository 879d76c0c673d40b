//! Retry executor
//!
//! Bounded and unbounded retries go through the same mechanism: a
//! [`RetryPolicy`] saying how many attempts are allowed and a [`Backoff`]
//! producing the delay between them. The unbounded variant exists for exactly
//! one caller (the top-level reconnect loop, which must outlive any remote
//! outage); everything else is bounded.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// How many attempts an operation gets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    Bounded { attempts: u32 },
    Unbounded,
}

impl RetryPolicy {
    fn allows(&self, next_attempt: u32) -> bool {
        match self {
            Self::Bounded { attempts } => next_attempt < *attempts,
            Self::Unbounded => true,
        }
    }
}

/// Delay growth between attempts
#[derive(Debug, Clone, Copy)]
pub enum BackoffPolicy {
    Constant,
    Linear,
    Exponential { factor: f32 },
}

/// Delay schedule: `initial` grown by `policy`, capped at `max`
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub policy: BackoffPolicy,
}

impl Backoff {
    pub fn constant(delay: Duration) -> Self {
        Self {
            initial: delay,
            max: delay,
            policy: BackoffPolicy::Constant,
        }
    }

    pub fn exponential(initial: Duration, max: Duration, factor: f32) -> Self {
        Self {
            initial,
            max,
            policy: BackoffPolicy::Exponential { factor },
        }
    }

    pub fn linear(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            policy: BackoffPolicy::Linear,
        }
    }

    /// Delay before retry number `attempt` (0-based: the delay after the
    /// first failure is `delay_for(0)`)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = match self.policy {
            BackoffPolicy::Constant => self.initial,
            BackoffPolicy::Linear => self.initial.saturating_mul(attempt + 1),
            BackoffPolicy::Exponential { factor } => {
                self.initial.mul_f32(factor.powi(attempt as i32))
            }
        };
        std::cmp::min(delay, self.max)
    }
}

/// Runs `op` until it succeeds or the policy's budget is spent, sleeping the
/// backoff delay between attempts. Returns the last error when bounded
/// attempts run out.
pub async fn run_with_retry<T, E, F, Fut>(
    policy: RetryPolicy,
    backoff: Backoff,
    what: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !policy.allows(attempt + 1) {
                    warn!("{what} failed after {} attempts: {e}", attempt + 1);
                    return Err(e);
                }
                let delay = backoff.delay_for(attempt);
                warn!(
                    "{what} attempt {} failed: {e}; retrying in {:?}",
                    attempt + 1,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
