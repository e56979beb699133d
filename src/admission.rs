//! Request admission: per-class rate gates and a bounded in-flight queue.
//!
//! Every operation clears two gates before its first attempt: a token-bucket
//! rate gate for its class (reads vs. writes), then the shared admission
//! queue bounding total in-flight requests. The queue slot is an owned
//! semaphore permit that the operation holds until it fully resolves, so
//! retries reuse the slot instead of re-admitting.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A token-bucket gate over one class of operations.
///
/// An unconfigured gate admits immediately.
#[derive(Clone)]
pub struct RateGate {
    limiter: Option<Arc<leaky_bucket::RateLimiter>>,
}

impl RateGate {
    /// A gate that never delays admission.
    pub fn unlimited() -> Self {
        Self { limiter: None }
    }

    /// A gate admitting at most `tokens_per_second` operations per second.
    ///
    /// A rate of zero is treated as unlimited.
    pub fn per_second(tokens_per_second: usize) -> Self {
        if tokens_per_second == 0 {
            return Self::unlimited();
        }
        let limiter = leaky_bucket::RateLimiter::builder()
            .max(tokens_per_second)
            .initial(tokens_per_second)
            .refill(tokens_per_second)
            .interval(Duration::from_secs(1))
            .build();
        Self {
            limiter: Some(Arc::new(limiter)),
        }
    }

    /// Wait for a token. Resolves immediately when unconfigured.
    pub async fn admit(&self) {
        if let Some(ref limiter) = self.limiter {
            limiter.acquire_one().await;
        }
    }
}

/// Bounded admission queue shared by all operations of a driver.
#[derive(Clone)]
pub struct AdmissionQueue {
    semaphore: Arc<Semaphore>,
}

/// A held admission slot. Dropping it releases the slot.
pub struct AdmissionSlot {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionQueue {
    /// Create a queue admitting at most `depth` concurrent operations.
    /// A depth of zero is clamped to one.
    pub fn new(depth: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(depth.max(1))),
        }
    }

    /// Wait for a slot. The slot stays held until the returned guard is
    /// dropped, which is the end of the whole operation, not of a single
    /// attempt.
    pub async fn admit(&self) -> AdmissionSlot {
        // The semaphore is never closed, so acquisition cannot fail.
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("admission semaphore closed"));
        AdmissionSlot { _permit: permit }
    }

    /// Number of slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
