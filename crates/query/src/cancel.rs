use tokio::sync::oneshot;
use tokio::task::JoinHandle;

enum Inner {
    Task(JoinHandle<()>),
    Signal(oneshot::Sender<()>),
    Callback(Box<dyn FnOnce() + Send>),
}

/// Cancellation handle for one in-flight async operation.
///
/// Dropping the handle does not cancel; owners call [`CancelHandle::cancel`]
/// explicitly before replacing or abandoning an operation.
pub struct CancelHandle {
    inner: Option<Inner>,
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            Some(Inner::Task(_)) => "task",
            Some(Inner::Signal(_)) => "signal",
            Some(Inner::Callback(_)) => "callback",
            None => "noop",
        };
        f.debug_tuple("CancelHandle").field(&kind).finish()
    }
}

impl CancelHandle {
    pub fn noop() -> Self { Self { inner: None } }

    /// Abort a spawned task.
    pub fn from_task(task: JoinHandle<()>) -> Self { Self { inner: Some(Inner::Task(task)) } }

    /// Fire a oneshot the operation selects on.
    pub fn from_signal(tx: oneshot::Sender<()>) -> Self { Self { inner: Some(Inner::Signal(tx)) } }

    pub fn from_fn(f: impl FnOnce() + Send + 'static) -> Self { Self { inner: Some(Inner::Callback(Box::new(f))) } }

    pub fn cancel(mut self) {
        match self.inner.take() {
            Some(Inner::Task(h)) => h.abort(),
            Some(Inner::Signal(tx)) => { let _ = tx.send(()); }
            Some(Inner::Callback(f)) => f(),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn callback_runs_once_on_cancel() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let handle = CancelHandle::from_fn(move || { h.fetch_add(1, Ordering::SeqCst); });
        handle.cancel();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_does_not_cancel() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        drop(CancelHandle::from_fn(move || { h.fetch_add(1, Ordering::SeqCst); }));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn signal_reaches_receiver() {
        let (tx, rx) = oneshot::channel();
        CancelHandle::from_signal(tx).cancel();
        assert!(rx.await.is_ok());
    }
}
