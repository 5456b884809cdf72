//! Retry policy: decides the fate of a record after a delivery attempt.
//!
//! The policy is pure. It never touches the store or the network, which keeps
//! every fate transition testable without a runtime.

use crate::{DeliveryOutcome, EventRecord};

/// Default number of delivery attempts before a record is discarded.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Bounded retry policy. No backoff is applied between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total delivery attempts a stored record gets before it is discarded.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// What to do with a stored record after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Delivered; delete it.
    Remove,
    /// Keep it with an incremented retry count.
    Retry,
    /// Give up and delete it.
    Discard,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Decide what happens to `record` given the attempt outcome.
    ///
    /// A delivered record is always removed, even if it expired while the
    /// request was in flight. Otherwise expiry wins over every failure kind.
    pub fn decide(&self, record: &EventRecord, outcome: &DeliveryOutcome, now_millis: i64) -> Action {
        match outcome {
            DeliveryOutcome::Delivered => Action::Remove,
            _ if record.is_expired(now_millis) => Action::Discard,
            DeliveryOutcome::RecoverableFailure { .. } => {
                if record.retry_count().saturating_add(1) < self.max_retries {
                    Action::Retry
                } else {
                    Action::Discard
                }
            }
            DeliveryOutcome::UnrecoverableFailure { .. } => Action::Discard,
        }
    }
}
