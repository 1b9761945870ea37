use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{Result, SkepError};

/// Process-wide cancellation token. Created once at startup and passed
/// explicitly through every long-running call; workers hold clones so
/// detached threads can observe it without borrowing.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns `Err(Cancelled)` once the flag is set. Lets loops bail with `?`.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SkepError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `total`, waking early if cancelled. Sleeps in short slices
    /// so backoff delays never outlive a cancellation by more than ~50ms.
    /// Returns `true` if the full delay elapsed, `false` if cut short.
    pub fn sleep(&self, total: Duration) -> bool {
        const SLICE: Duration = Duration::from_millis(50);
        let deadline = Instant::now() + total;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLICE));
        }
    }
}
