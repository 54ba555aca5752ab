//! Hierarchical cancellation.
//!
//! A [`CancelSignal`] is carried by every [`CallContext`](crate::CallContext).
//! Signals form a tree: cancelling a signal cancels every signal derived
//! from it with [`CancelSignal::child`], while cancelling a child leaves its
//! parent untouched.
//!
//! ```
//! use pylon_core::CancelSignal;
//!
//! let server = CancelSignal::new();
//! let request = server.child();
//!
//! request.cancel();
//! assert!(!server.is_cancelled());
//!
//! let other = server.child();
//! server.cancel();
//! assert!(other.is_cancelled());
//! ```

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::watch;

/// A cloneable cancellation signal.
///
/// Clones share state: cancelling one clone cancels them all.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    /// `true` once cancelled; never reset.
    state: watch::Sender<bool>,

    /// Signals derived from this one.
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn new(cancelled: bool) -> Self {
        let (state, _) = watch::channel(cancelled);
        Self {
            state,
            children: Mutex::new(Vec::new()),
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    fn cancel(&self) {
        if self.state.send_replace(true) {
            return;
        }
        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

impl CancelSignal {
    /// Creates a root signal that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new(false)),
        }
    }

    /// Derives a child signal.
    ///
    /// The child is cancelled when this signal is (immediately, if it already
    /// is), and can be cancelled on its own without affecting this signal.
    #[must_use]
    pub fn child(&self) -> Self {
        let mut children = self.inner.children.lock();
        if self.inner.is_cancelled() {
            return Self {
                inner: Arc::new(Inner::new(true)),
            };
        }
        children.retain(|child| child.strong_count() > 0);
        let inner = Arc::new(Inner::new(false));
        children.push(Arc::downgrade(&inner));
        Self { inner }
    }

    /// Cancels this signal and all of its descendants. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Returns `true` once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Completes once this signal is cancelled.
    ///
    /// Completes immediately if it already is.
    pub async fn cancelled(&self) {
        let mut state = self.inner.state.subscribe();
        // The sender lives in `self.inner`, so the channel cannot close here.
        let _ = state.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancels the wrapped signal when dropped.
///
/// Used to scope a child signal to a block, including early returns and
/// unwinding.
#[derive(Debug)]
pub struct CancelOnDrop(CancelSignal);

impl CancelOnDrop {
    /// Guards `signal`.
    #[must_use]
    pub const fn new(signal: CancelSignal) -> Self {
        Self(signal)
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancel_is_idempotent() {
        let signal = CancelSignal::new();
        signal.cancel();
        signal.cancel();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_parent_cancels_descendants() {
        let root = CancelSignal::new();
        let child = root.child();
        let grandchild = child.child();

        root.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn test_child_does_not_cancel_parent() {
        let root = CancelSignal::new();
        let child = root.child();
        child.cancel();
        assert!(!root.is_cancelled());
    }

    #[test]
    fn test_child_of_cancelled_is_cancelled() {
        let root = CancelSignal::new();
        root.cancel();
        assert!(root.child().is_cancelled());
    }

    #[test]
    fn test_guard_cancels_on_drop() {
        let signal = CancelSignal::new();
        {
            let _guard = CancelOnDrop::new(signal.clone());
        }
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_cancelled_future_is_pending_until_cancel() {
        let signal = CancelSignal::new();
        let mut wait = tokio_test::task::spawn(signal.cancelled());
        tokio_test::assert_pending!(wait.poll());

        signal.cancel();
        assert!(wait.is_woken());
        tokio_test::assert_ready!(wait.poll());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let root = CancelSignal::new();
        let child = root.child();

        let waiter = tokio::spawn(async move { child.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        root.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_completes_when_already_cancelled() {
        let signal = CancelSignal::new();
        signal.cancel();
        tokio::time::timeout(Duration::from_millis(100), signal.cancelled())
            .await
            .expect("already cancelled");
    }
}
