use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::{GuideEngineError, Result};

/// Queue health, observable by callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Normal operation
    Healthy,
    /// Consecutive failures below the reset threshold have been observed
    Degraded,
}

/// Serializes every cache operation into a single FIFO sequence so the
/// embedded connection is never touched concurrently from independent call
/// sites.
///
/// Each operation gets a hard execution budget once it holds the slot; on
/// timeout the caller observes failure but the underlying work may still
/// complete in the store, so a timeout means unknown outcome, not rollback.
///
/// After `failure_threshold` back-to-back failures the queue performs an
/// explicit `Degraded -> Reset` transition back to an empty, healthy baseline
/// instead of letting a poison operation wedge all future work. Callers whose
/// operation failed still receive that failure; only the internal chain state
/// is dropped.
pub struct OpQueue {
    slot: Mutex<()>,
    op_timeout: Duration,
    failure_threshold: u32,
    consecutive_failures: AtomicU32,
    resets: AtomicU64,
    state: AtomicU8,
}

const STATE_HEALTHY: u8 = 0;
const STATE_DEGRADED: u8 = 1;

impl OpQueue {
    pub fn new(op_timeout: Duration, failure_threshold: u32) -> Self {
        Self {
            slot: Mutex::new(()),
            op_timeout,
            failure_threshold,
            consecutive_failures: AtomicU32::new(0),
            resets: AtomicU64::new(0),
            state: AtomicU8::new(STATE_HEALTHY),
        }
    }

    /// Run `op` in the next free slot, in submission order.
    pub async fn run<T, Fut>(&self, name: &str, op: impl FnOnce() -> Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        // tokio's Mutex hands the slot out in FIFO order, which is the whole
        // ordering guarantee of the queue.
        let _guard = self.slot.lock().await;
        let outcome = match tokio::time::timeout(self.op_timeout, op()).await {
            Ok(res) => res,
            Err(_) => Err(GuideEngineError::Timeout(name.to_string())),
        };
        match &outcome {
            Ok(_) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                self.state.store(STATE_HEALTHY, Ordering::SeqCst);
            }
            Err(e) => self.note_failure(name, e),
        }
        outcome
    }

    fn note_failure(&self, name: &str, err: &GuideEngineError) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.store(STATE_DEGRADED, Ordering::SeqCst);
        tracing::warn!(op = name, failures, error = %err, "cache operation failed");
        if failures >= self.failure_threshold {
            // Availability over strict ordering: drop the failure chain and
            // start from an empty baseline rather than staying wedged.
            self.consecutive_failures.store(0, Ordering::SeqCst);
            self.state.store(STATE_HEALTHY, Ordering::SeqCst);
            let resets = self.resets.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::warn!(op = name, resets, "operation queue reset after consecutive failures");
        }
    }

    pub fn state(&self) -> QueueState {
        match self.state.load(Ordering::SeqCst) {
            STATE_DEGRADED => QueueState::Degraded,
            _ => QueueState::Healthy,
        }
    }

    /// How many `Degraded -> Reset` transitions have occurred.
    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }
}

impl Default for OpQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), 3)
    }
}
