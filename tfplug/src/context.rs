//! Context implementation for request-scoped cancellation
//!
//! The server owns a root Context. Every RPC runs with a child of it, so
//! cancelling the root (StopProvider) cancels all in-flight work.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time;

/// Context carries cancellation signals and deadlines across async boundaries
/// CRITICAL: Pass this as first parameter to ALL async trait methods
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    deadline: Option<Instant>,
    parent: Option<Context>,
    done: watch::Sender<bool>,
}

impl Context {
    pub fn new() -> Self {
        Self::build(None, None)
    }

    fn build(parent: Option<Context>, deadline: Option<Instant>) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            inner: Arc::new(ContextInner {
                deadline,
                parent,
                done,
            }),
        }
    }

    /// Derive a context that is cancelled together with this one
    pub fn child(&self) -> Self {
        Self::build(Some(self.clone()), self.deadline())
    }

    /// Derive a child context that also expires after `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        let deadline = match self.deadline() {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self::build(Some(self.clone()), Some(deadline))
    }

    pub fn is_cancelled(&self) -> bool {
        if *self.inner.done.borrow() {
            return true;
        }
        if self.inner.deadline.is_some_and(|d| Instant::now() >= d) {
            return true;
        }
        self.inner
            .parent
            .as_ref()
            .is_some_and(Context::is_cancelled)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    pub fn cancel(&self) {
        self.inner.done.send_replace(true);
    }

    /// Resolves once this context, or any ancestor, is cancelled or past its deadline
    pub async fn cancelled(&self) {
        let mut done = self.inner.done.subscribe();
        let parent = self.inner.parent.clone();
        let deadline = self.inner.deadline;

        let own = async move {
            let signalled = done.wait_for(|cancelled| *cancelled).await.is_ok();
            if !signalled {
                std::future::pending::<()>().await;
            }
        };
        let inherited = async move {
            match parent {
                Some(parent) => Box::pin(parent.cancelled()).await,
                None => std::future::pending::<()>().await,
            }
        };
        let expired = async move {
            match deadline {
                Some(deadline) => time::sleep_until(deadline.into()).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = own => {}
            _ = inherited => {}
            _ = expired => {}
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn context_timeout_cancels() {
        let ctx = Context::new().with_timeout(Duration::from_millis(100));

        assert!(!ctx.is_cancelled());

        sleep(Duration::from_millis(150)).await;

        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn context_manual_cancel() {
        let ctx = Context::new();

        assert!(!ctx.is_cancelled());

        ctx.cancel();

        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn cancelling_parent_cancels_child() {
        let root = Context::new();
        let child = root.child();

        let waiter = tokio::spawn({
            let child = child.clone();
            async move { child.cancelled().await }
        });

        root.cancel();
        time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("child should observe cancellation")
            .unwrap();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn cancelling_child_leaves_parent_running() {
        let root = Context::new();
        let child = root.child();

        child.cancel();

        assert!(child.is_cancelled());
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn context_deadline() {
        let ctx = Context::new();
        assert!(ctx.deadline().is_none());

        let ctx_with_timeout = ctx.with_timeout(Duration::from_secs(1));
        assert!(ctx_with_timeout.deadline().is_some());
        assert!(ctx_with_timeout.child().deadline().is_some());
    }
}
