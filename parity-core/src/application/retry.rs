// parity-core/src/application/retry.rs

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ParityError;
use crate::infrastructure::config::RetrySettings;

/// Bounded retry policy for connection setup. Queries are never retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = max_retries + 1.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// 1.0 = fixed delay.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(s: &RetrySettings) -> Self {
        Self {
            max_retries: s.max_retries,
            initial_delay: Duration::from_millis(s.delay_ms),
            max_delay: Duration::from_millis(s.max_delay_ms.max(s.delay_ms)),
            multiplier: s.backoff_multiplier.max(1.0),
        }
    }
}

impl RetryPolicy {
    /// No retries, no waiting.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Next delay, clamped to `max_delay`.
pub fn next_delay(current: Duration, policy: &RetryPolicy) -> Duration {
    let next_ms = (current.as_millis() as f64 * policy.multiplier) as u64;
    Duration::from_millis(next_ms).min(policy.max_delay)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    GiveUp,
}

/// Attempt counter + current delay. Every failure moves it strictly closer to `GiveUp`.
#[derive(Debug, Clone)]
pub struct RetryState {
    attempts: u32,
    delay: Duration,
    policy: RetryPolicy,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            attempts: 0,
            delay: policy.initial_delay,
            policy,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn on_failure(&mut self) -> RetryDecision {
        self.attempts = self.attempts.saturating_add(1);
        if self.attempts >= self.policy.max_attempts() {
            return RetryDecision::GiveUp;
        }
        let wait = self.delay;
        self.delay = next_delay(self.delay, &self.policy);
        RetryDecision::Retry(wait)
    }
}

/// Runs `attempt` until it succeeds, the policy is exhausted, or `cancel` fires.
/// Only connectivity errors are retried; anything else is returned as is.
pub async fn connect_with_retry<T, F, Fut>(
    store: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T, ParityError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ParityError>>,
{
    let mut state = RetryState::new(policy.clone());

    loop {
        let reason = tokio::select! {
            _ = cancel.cancelled() => return Err(ParityError::Cancelled),
            result = attempt() => match result {
                Ok(value) => {
                    if state.attempts() > 0 {
                        info!(store, attempt = state.attempts() + 1, "Connected after retry");
                    }
                    return Ok(value);
                }
                Err(ParityError::Connectivity { reason, .. }) => reason,
                Err(other) => return Err(other),
            },
        };

        match state.on_failure() {
            RetryDecision::GiveUp => {
                warn!(store, attempts = state.attempts(), %reason, "Giving up on store");
                return Err(ParityError::Connectivity {
                    store: store.to_string(),
                    attempts: state.attempts(),
                    reason,
                });
            }
            RetryDecision::Retry(wait) => {
                warn!(
                    store,
                    attempt = state.attempts(),
                    delay_ms = wait.as_millis() as u64,
                    %reason,
                    "Connection attempt failed, retrying"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ParityError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            multiplier: 2.0,
        }
    }

    fn refused(store: &str) -> ParityError {
        ParityError::Connectivity {
            store: store.into(),
            attempts: 1,
            reason: "connection refused".into(),
        }
    }

    #[test]
    fn test_state_machine_is_bounded() {
        let mut state = RetryState::new(fast(3));
        assert_eq!(state.on_failure(), RetryDecision::Retry(Duration::from_millis(1)));
        assert_eq!(state.on_failure(), RetryDecision::Retry(Duration::from_millis(2)));
        assert_eq!(state.on_failure(), RetryDecision::Retry(Duration::from_millis(4)));
        assert_eq!(state.on_failure(), RetryDecision::GiveUp);
        assert_eq!(state.attempts(), 4);
    }

    #[test]
    fn test_default_policy_is_fixed_delay() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_retries, 10);
        assert_eq!(next_delay(p.initial_delay, &p), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let res = connect_with_retry("source", &fast(5), &CancellationToken::new(), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(refused("source"))
            } else {
                Ok("conn")
            }
        })
        .await;
        assert_eq!(res.unwrap(), "conn");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let res: Result<(), _> = connect_with_retry(
            "target",
            &fast(2),
            &CancellationToken::new(),
            || async { Err(refused("target")) },
        )
        .await;
        assert!(matches!(
            res,
            Err(ParityError::Connectivity { attempts: 3, .. })
        ));
    }

    #[test]
    fn test_no_retry_policy_gives_up_at_once() {
        let mut state = RetryState::new(RetryPolicy::none());
        assert_eq!(state.on_failure(), RetryDecision::GiveUp);
        assert_eq!(state.attempts(), 1);
    }

    #[tokio::test]
    async fn test_non_connectivity_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> =
            connect_with_retry("target", &fast(5), &CancellationToken::new(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ParityError::InternalError("bad".into()))
            })
            .await;
        assert!(matches!(res, Err(ParityError::InternalError(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let slow = RetryPolicy {
            initial_delay: Duration::from_secs(3600),
            ..fast(5)
        };
        let res: Result<(), _> =
            connect_with_retry("target", &slow, &cancel, || async { Err(refused("target")) })
                .await;
        assert!(matches!(res, Err(ParityError::Cancelled)));
    }
}
