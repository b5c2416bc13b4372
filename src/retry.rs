//! Jittered backoff for registration refresh
//!
//! The schedule is a plain iterator-style object, so callers decide where the
//! waiting happens: the orchestrator spawns [`with_backoff`] off its event
//! loop and collects the outcome through the event channel, keeping the
//! engine iterate pump free of retry sleeps. Bluetooth SCO negotiation does
//! not use this module; it polls achieved hardware state on a fixed interval
//! in [`crate::audio::sco`].

use crate::error::CoreResult;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Doubling delay schedule with ±10 % jitter and a fixed retry budget
///
/// # Examples
///
/// ```rust
/// # use call_session_core::retry::Backoff;
/// let mut schedule = Backoff::registration();
/// assert!(schedule.next_delay().is_some()); // ~1 s
/// assert!(schedule.next_delay().is_some()); // ~2 s
/// assert!(schedule.next_delay().is_none()); // budget spent
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    delay: Duration,
    cap: Duration,
    retries_left: u32,
}

impl Backoff {
    /// Schedule starting at `initial`, doubling up to `cap`, for `retries`
    /// retries after the first attempt
    pub fn new(initial: Duration, cap: Duration, retries: u32) -> Self {
        Self {
            delay: initial,
            cap,
            retries_left: retries,
        }
    }

    /// Schedule for keep-alive re-registration: two retries at ~1 s and ~2 s
    pub fn registration() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 2)
    }

    /// The next jittered delay, or `None` once the retry budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.retries_left == 0 {
            return None;
        }
        self.retries_left -= 1;
        let jittered = self.delay.mul_f64(0.9 + rand::random::<f64>() * 0.2);
        self.delay = (self.delay * 2).min(self.cap);
        Some(jittered)
    }
}

/// Drive `op` until it succeeds, fails non-recoverably, or exhausts `schedule`
///
/// The backoff sleeps run wherever this future is polled, so it must never be
/// awaited on the orchestrator loop itself; spawn it and feed the outcome
/// back through the event channel.
pub async fn with_backoff<F, Fut>(what: &str, mut schedule: Backoff, mut op: F) -> CoreResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CoreResult<()>>,
{
    let mut retried = false;
    loop {
        let err = match op().await {
            Ok(()) => {
                if retried {
                    debug!(operation = what, "succeeded after retries");
                }
                return Ok(());
            }
            Err(e) => e,
        };
        if !err.is_recoverable() {
            error!(
                operation = what,
                error = %err,
                category = err.category(),
                "non-recoverable error, not retrying"
            );
            return Err(err);
        }
        match schedule.next_delay() {
            Some(delay) => {
                warn!(
                    operation = what,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "recoverable error, retrying after delay"
                );
                retried = true;
                sleep(delay).await;
            }
            None => {
                error!(operation = what, error = %err, "retry budget exhausted");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn schedule_doubles_and_respects_cap_and_budget() {
        let mut s = Backoff::new(Duration::from_millis(100), Duration::from_millis(150), 3);
        let d1 = s.next_delay().unwrap();
        assert!(d1 >= Duration::from_millis(90) && d1 <= Duration::from_millis(110));
        // Doubling would give 200 ms; the cap holds it at 150 ms.
        let d2 = s.next_delay().unwrap();
        assert!(d2 >= Duration::from_millis(135) && d2 <= Duration::from_millis(165));
        assert!(s.next_delay().is_some());
        assert!(s.next_delay().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn recoverable_failures_retry_until_success() {
        let attempts = AtomicU32::new(0);
        let schedule = Backoff::new(Duration::from_millis(1), Duration::from_millis(10), 5);

        let result = with_backoff("test_op", schedule, || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CoreError::Timeout { seconds: 1 })
            } else {
                Ok(())
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_recoverable_fails_immediately() {
        let attempts = AtomicU32::new(0);
        let result = with_backoff("test_op", Backoff::registration(), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::invalid_state("nope"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_returns_the_last_error() {
        let attempts = AtomicU32::new(0);
        let schedule = Backoff::new(Duration::from_millis(1), Duration::from_millis(10), 2);
        let result = with_backoff("test_op", schedule, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::registration_failed("503"))
        })
        .await;

        assert!(result.is_err());
        // First attempt plus the two budgeted retries.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
