use std::future::{Future, pending};
use std::time::Duration;

use futures_util::future::select_all;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

use crate::error::{RelataError, Result};

/// Cancellation and deadline scope for the statements of a query.
///
/// Contexts derive from one another: a child is done as soon as any of its parents is.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancels: Vec<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Cancels the context it was created with, and every context derived from it.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Context {
    /// A context that is never done.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let mut child = self.clone();
        child.cancels.push(rx);
        (child, CancelHandle { tx })
    }

    pub fn with_timeout(&self, timeout: Duration) -> Context {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Keeps the earlier of the existing deadline and `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Context {
        let mut child = self.clone();
        child.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        child
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancels.iter().any(|rx| *rx.borrow())
            || self.deadline.is_some_and(|at| Instant::now() >= at)
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        let cancelled = async {
            if self.cancels.is_empty() {
                return pending::<()>().await;
            }
            let waits = self.cancels.iter().map(|rx| {
                let mut rx = rx.clone();
                Box::pin(async move {
                    // A dropped handle can no longer cancel.
                    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                        pending::<()>().await;
                    }
                })
            });
            select_all(waits).await;
        };
        let expired = async {
            match self.deadline {
                Some(at) => sleep_until(at).await,
                None => pending::<()>().await,
            }
        };
        tokio::select! {
            _ = cancelled => {}
            _ = expired => {}
        }
    }

    /// Drives `fut` until it completes or the context is done.
    pub(crate) async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(RelataError::Cancelled);
        }
        if self.cancels.is_empty() && self.deadline.is_none() {
            return fut.await;
        }
        tokio::select! {
            biased;
            _ = self.done() => Err(RelataError::Cancelled),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_propagates_to_children() {
        let (parent, handle) = Context::background().with_cancel();
        let (child, _child_handle) = parent.with_cancel();
        assert!(!child.is_cancelled());
        handle.cancel();
        assert!(child.is_cancelled());
        child.done().await;
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_pending_work() {
        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        let result: Result<()> = ctx.run(pending()).await;
        assert!(matches!(result, Err(RelataError::Cancelled)));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn background_runs_to_completion() {
        let ctx = Context::background();
        assert_eq!(ctx.run(async { Ok(7) }).await.unwrap(), 7);
    }
}
