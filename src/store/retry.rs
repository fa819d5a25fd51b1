use std::time::Duration;

use crate::error::Result;

/// Bounded exponential-backoff retry for lock contention on the embedded store.
///
/// Runs inside a single queued slot on the blocking pool, so the attempt budget
/// also bounds how long one operation can hold the queue.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub attempts: u32,
    /// Delay before the second attempt; doubles each attempt after that
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_millis(75),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay after the given failed attempt (0-indexed)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }

    /// Run `op`, retrying only errors classified as lock contention.
    ///
    /// Non-contention errors propagate immediately; exhausting the attempt
    /// budget propagates the last contention error.
    pub fn run<T>(&self, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0u32;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if e.is_lock_contention() && attempt + 1 < self.attempts => {
                    let delay = self.backoff_delay(attempt);
                    tracing::debug!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "store locked, backing off"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
