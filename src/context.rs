//! Cancellation and deadlines for suspending operations
//!
//! A [`RunContext`] bounds every database call and every metric submission.
//! The root context is cancelled on SIGINT/SIGTERM; each operation runs under
//! a child context carrying its own deadline.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a bounded operation stopped before completing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    /// The context's deadline passed
    DeadlineExceeded,
    /// The context (or an ancestor) was cancelled
    Cancelled,
}

/// An interruption, plus whether the interrupted work had begun
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopped {
    pub reason: Interrupted,

    /// `false` when the context was already done and the future never ran
    pub started: bool,
}

/// Cancellation token plus optional deadline
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RunContext {
    /// Root context with no deadline
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a context that is cancelled with `self` and expires after
    /// `timeout`, or at the parent's deadline if that comes first.
    ///
    /// `None` inherits the parent's deadline unchanged.
    #[must_use]
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        // An unrepresentable deadline is no deadline
        let own = timeout.and_then(|t| Instant::now().checked_add(t));
        let deadline = match (self.deadline, own) {
            (Some(parent), Some(own)) => Some(parent.min(own)),
            (parent, own) => parent.or(own),
        };
        Self {
            token: self.token.child_token(),
            deadline,
        }
    }

    /// Cancel this context and every context derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drive `fut` to completion unless the context is cancelled or expires first
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, Interrupted>
    where
        F: Future,
    {
        self.run_tracked(fut).await.map_err(|stopped| stopped.reason)
    }

    /// Like [`run`](Self::run), but an interruption also tells whether `fut`
    /// was ever polled
    ///
    /// A context that is already cancelled or expired never polls `fut`.
    pub async fn run_tracked<F>(&self, fut: F) -> Result<F::Output, Stopped>
    where
        F: Future,
    {
        let started = AtomicBool::new(false);
        let tracked = async {
            started.store(true, Ordering::Relaxed);
            fut.await
        };

        match self.race(tracked).await {
            Ok(out) => Ok(out),
            Err(reason) => Err(Stopped {
                reason,
                started: started.load(Ordering::Relaxed),
            }),
        }
    }

    async fn race<F>(&self, fut: F) -> Result<F::Output, Interrupted>
    where
        F: Future,
    {
        if self.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }

        let expiry = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(Interrupted::Cancelled),
            () = expiry => Err(Interrupted::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes_without_deadline() {
        let ctx = RunContext::new();
        let result = ctx.run(async { 7 }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let ctx = RunContext::new().child(Some(Duration::from_millis(10)));
        let result = ctx.run(std::future::pending::<()>()).await;
        assert_eq!(result, Err(Interrupted::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_cancelled_parent_cancels_child() {
        let root = RunContext::new();
        let child = root.child(Some(Duration::from_secs(60)));
        root.cancel();

        assert!(child.is_cancelled());
        let result = child.run(async { 1 }).await;
        assert_eq!(result, Err(Interrupted::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_while_pending() {
        let ctx = RunContext::new();
        let handle = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        });

        let result = ctx.run(std::future::pending::<()>()).await;
        assert_eq!(result, Err(Interrupted::Cancelled));
    }

    #[tokio::test]
    async fn test_pre_cancelled_context_never_starts_work() {
        let root = RunContext::new();
        root.cancel();
        let ctx = root.child(Some(Duration::from_secs(60)));

        let result = ctx.run_tracked(std::future::pending::<()>()).await;
        assert_eq!(
            result,
            Err(Stopped {
                reason: Interrupted::Cancelled,
                started: false,
            })
        );
    }

    #[tokio::test]
    async fn test_expired_context_never_starts_work() {
        let ctx = RunContext::new().child(Some(Duration::ZERO));
        tokio::time::sleep(Duration::from_millis(5)).await;

        let result = ctx.run_tracked(std::future::pending::<()>()).await;
        assert_eq!(
            result,
            Err(Stopped {
                reason: Interrupted::DeadlineExceeded,
                started: false,
            })
        );
    }

    #[tokio::test]
    async fn test_interrupted_work_reports_started() {
        let ctx = RunContext::new().child(Some(Duration::from_millis(10)));

        let result = ctx.run_tracked(std::future::pending::<()>()).await;
        assert_eq!(
            result,
            Err(Stopped {
                reason: Interrupted::DeadlineExceeded,
                started: true,
            })
        );
    }

    #[test]
    fn test_child_keeps_earlier_parent_deadline() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let parent = RunContext::new().child(Some(Duration::from_millis(50)));
            let child = parent.child(Some(Duration::from_secs(60)));
            assert_eq!(child.deadline, parent.deadline);

            let inherited = parent.child(None);
            assert_eq!(inherited.deadline, parent.deadline);

            assert!(RunContext::new().child(None).deadline.is_none());
        });
    }
}
