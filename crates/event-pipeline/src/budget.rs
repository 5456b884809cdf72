//! Background execution budget.
//!
//! A host may only let background work run for a bounded time (for example an
//! OS background-task grant). The coordinator acquires a [`WorkPermit`] before
//! draining and checks it between records; the permit is released when it is
//! dropped, on every exit path.

use std::fmt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::debug;

/// Default drain budget.
pub const DEFAULT_DRAIN_BUDGET: Duration = Duration::from_secs(30);

type ReleaseHook = Box<dyn FnOnce() + Send + Sync>;

/// Grant to run background work until its token is cancelled.
pub struct WorkPermit {
    token: CancellationToken,
    timer: Option<JoinHandle<()>>,
    on_release: Option<ReleaseHook>,
}

impl WorkPermit {
    /// A permit that expires when `token` is cancelled.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            timer: None,
            on_release: None,
        }
    }

    /// Attach the task that cancels the token at the deadline; it is aborted on release.
    pub fn with_timer(mut self, timer: JoinHandle<()>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Run `hook` exactly once when the permit is released.
    pub fn on_release(mut self, hook: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the budget runs out.
    pub fn expired(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

impl fmt::Debug for WorkPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkPermit")
            .field("expired", &self.is_expired())
            .field("has_timer", &self.timer.is_some())
            .finish()
    }
}

impl Drop for WorkPermit {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.token.cancel();
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

/// Source of work permits.
pub trait ExecutionBudget: Send + Sync {
    fn acquire(&self) -> WorkPermit;
}

/// Budget that expires a fixed duration after acquisition.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineBudget {
    budget: Duration,
}

impl DeadlineBudget {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}

impl Default for DeadlineBudget {
    fn default() -> Self {
        Self::new(DEFAULT_DRAIN_BUDGET)
    }
}

impl ExecutionBudget for DeadlineBudget {
    fn acquire(&self) -> WorkPermit {
        let token = CancellationToken::new();
        if self.budget.is_zero() {
            token.cancel();
            return WorkPermit::new(token);
        }

        let deadline = token.clone();
        let budget = self.budget;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(budget).await;
            debug!(budget_ms = budget.as_millis() as u64, "Drain budget expired");
            deadline.cancel();
        });
        WorkPermit::new(token).with_timer(timer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_deadline_budget_expires() {
        let budget = DeadlineBudget::new(Duration::from_millis(20));
        let permit = budget.acquire();
        assert!(!permit.is_expired());

        tokio::time::timeout(Duration::from_secs(2), permit.expired())
            .await
            .expect("permit should expire");
        assert!(permit.is_expired());
    }

    #[tokio::test]
    async fn test_zero_budget_is_expired_immediately() {
        let permit = DeadlineBudget::new(Duration::ZERO).acquire();
        assert!(permit.is_expired());
    }

    #[tokio::test]
    async fn test_release_hook_runs_once_on_drop() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();

        let permit = WorkPermit::new(CancellationToken::new()).on_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(released.load(Ordering::SeqCst), 0);
        drop(permit);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_cancels_token() {
        let token = CancellationToken::new();
        let observer = token.clone();
        let timer = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        drop(WorkPermit::new(token).with_timer(timer));
        assert!(observer.is_cancelled());
    }
}
