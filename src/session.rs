/*
 * Chatter - Discord Auto-Chat & Auto-Reply Companion
 * File Path: src/session.rs
 * Responsibility: Session supervision. Restart a push session after a fixed delay whenever it drops.
 */

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub delay: Duration,
    /// `None` restarts forever.
    pub max_restarts: Option<u32>,
}

/// Keep a session alive. `connect` runs one session to completion: `Ok`
/// means a clean shutdown and ends supervision; `Err` is logged with the
/// token label and followed by exactly `policy.delay` before reconnecting.
pub async fn supervise<F, Fut>(label: &str, policy: RestartPolicy, mut connect: F) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let mut restarts: u32 = 0;
    loop {
        match connect().await {
            Ok(()) => {
                info!("👋 [{}] Session closed cleanly", label);
                return Ok(());
            }
            Err(e) => {
                if policy.max_restarts.is_some_and(|max| restarts >= max) {
                    error!(
                        "❌ [{}] Disconnect: {:#}. Giving up after {} restarts",
                        label, e, restarts
                    );
                    return Err(e.context(format!("session {} exhausted its restarts", label)));
                }
                restarts = restarts.saturating_add(1);
                error!(
                    "🔌 [{}] Disconnect: {:#} → restart in {}s",
                    label,
                    e,
                    policy.delay.as_secs()
                );
                sleep(policy.delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_exactly_the_restart_delay() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let start = Instant::now();
        let policy = RestartPolicy {
            delay: Duration::from_secs(10),
            max_restarts: None,
        };

        let result = supervise("OTMzMjYy…", policy, move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= 4 {
                Err(anyhow::anyhow!("gateway closed (code 1006)"))
            } else {
                Ok(())
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
        assert_eq!(start.elapsed(), Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_policy_keeps_retrying_a_permanent_failure() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let policy = RestartPolicy {
            delay: Duration::from_secs(3),
            max_restarts: None,
        };

        let supervised = supervise("token", policy, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow::anyhow!("401 Unauthorized"))
        });
        let outcome = tokio::time::timeout(Duration::from_secs(31), supervised).await;

        assert!(outcome.is_err(), "supervision must not end on its own");
        assert_eq!(attempts.load(Ordering::SeqCst), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_policy_gives_up() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let policy = RestartPolicy {
            delay: Duration::from_secs(1),
            max_restarts: Some(2),
        };

        let result = supervise("token", policy, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow::anyhow!("401 Unauthorized"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
