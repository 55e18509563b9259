/*
 * Chatter - Discord Auto-Chat & Auto-Reply Companion
 * File Path: src/retry.rs
 * Responsibility: Bounded retry with a pluggable backoff, shared by every outbound call
 */

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same pause after every failure.
    Fixed(Duration),
    /// `attempt * base` after the n-th failure.
    Linear(Duration),
}

impl Backoff {
    /// Pause after the given 1-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Linear(base) => base.saturating_mul(attempt),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Linear(base),
        }
    }

    /// A single attempt, no retry.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::Fixed(Duration::ZERO),
        }
    }

    /// Run `op` until it succeeds or the attempts are spent. Sleeps between
    /// attempts only; the last error is returned untouched.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts => {
                    let wait = self.backoff.delay_for(attempt);
                    warn!(
                        "⚠️ {} failed (Attempt {}/{}): {:#}. Retrying in {}s...",
                        label,
                        attempt,
                        max_attempts,
                        e,
                        wait.as_secs_f32()
                    );
                    sleep(wait).await;
                }
                Err(e) => {
                    if max_attempts > 1 {
                        error!("❌ {} failed after {} attempts: {:#}", label, max_attempts, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}
