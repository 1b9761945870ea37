use std::time::Duration;

use skep_types::{CancelFlag, Result, SkepError};

/// Tuning for transient-error retries against the remote store.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

/// Backoff delay before the given zero-based retry: doubling from the
/// base, capped, plus up to one delay's worth of random jitter.
pub fn backoff_delay(policy: &RetryPolicy, retry: u32) -> Duration {
    let exp = policy.base_delay_ms.saturating_mul(1u64 << retry.min(16));
    let delay_ms = exp.min(policy.max_delay_ms).max(1);
    let jitter = rand::random::<u64>() % delay_ms;
    Duration::from_millis(delay_ms + jitter)
}

/// Retry a store closure on transient errors with exponential backoff and
/// jitter. Backoff sleeps honor cancellation: a cancelled sleep surfaces
/// `Cancelled` instead of retrying or returning the pending error.
pub fn retry_transient<T>(
    policy: &RetryPolicy,
    op_name: &str,
    cancel: &CancelFlag,
    f: impl Fn() -> Result<T>,
) -> Result<T> {
    let attempts = policy.max_attempts.max(1);
    let mut last_err = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            if !cancel.sleep(backoff_delay(policy, attempt - 1)) {
                return Err(SkepError::Cancelled);
            }
        }
        cancel.check()?;
        match f() {
            Ok(val) => return Ok(val),
            Err(e) if e.is_transient() && attempt + 1 < attempts => {
                tracing::warn!(
                    "{op_name}: transient store error (attempt {}/{attempts}), retrying: {e}",
                    attempt + 1,
                );
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 4,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 400,
        };
        // Delay before retry n is in [min(100 * 2^n, 400), 2 * that).
        for (retry, expect) in [(0u32, 100u64), (1, 200), (2, 400), (3, 400), (10, 400)] {
            let d = backoff_delay(&policy, retry).as_millis() as u64;
            assert!(d >= expect && d < expect * 2, "retry={retry} delay={d}");
        }
    }

    #[test]
    fn backoff_huge_attempt_count_does_not_overflow() {
        let policy = RetryPolicy::default();
        let d = backoff_delay(&policy, u32::MAX);
        assert!(d.as_millis() as u64 <= policy.max_delay_ms * 2);
    }

    #[test]
    fn succeeds_first_try_without_sleeping() {
        let cancel = CancelFlag::new();
        let out = retry_transient(&fast_policy(), "op", &cancel, || Ok(42)).unwrap();
        assert_eq!(out, 42);
    }

    #[test]
    fn retries_transient_until_success() {
        let cancel = CancelFlag::new();
        let tries = AtomicU32::new(0);
        let out = retry_transient(&fast_policy(), "op", &cancel, || {
            if tries.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(SkepError::store(503, "busy"))
            } else {
                Ok("done")
            }
        })
        .unwrap();
        assert_eq!(out, "done");
        assert_eq!(tries.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn permanent_error_fails_immediately() {
        let cancel = CancelFlag::new();
        let tries = AtomicU32::new(0);
        let err = retry_transient(&fast_policy(), "op", &cancel, || -> Result<()> {
            tries.fetch_add(1, Ordering::SeqCst);
            Err(SkepError::store(404, "gone"))
        })
        .unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(tries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exhaustion_returns_last_transient_error() {
        let cancel = CancelFlag::new();
        let tries = AtomicU32::new(0);
        let err = retry_transient(&fast_policy(), "op", &cancel, || -> Result<()> {
            tries.fetch_add(1, Ordering::SeqCst);
            Err(SkepError::store(500, "still down"))
        })
        .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(tries.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn cancellation_interrupts_backoff() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 60_000,
            max_delay_ms: 60_000,
        };
        let cancel = CancelFlag::new();
        let remote = cancel.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });
        let start = std::time::Instant::now();
        let err = retry_transient(&policy, "op", &cancel, || -> Result<()> {
            Err(SkepError::store(500, "down"))
        })
        .unwrap_err();
        assert!(err.is_cancelled());
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }
}
