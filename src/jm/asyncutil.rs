use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Counts live and total tokio tasks spawned through it (reconciler, rpc connections)
/// so the daemon can report leaks at shutdown.
#[derive(Debug, Clone, Default)]
pub struct TaskTracker {
    active: Arc<AtomicUsize>,
    spawned_total: Arc<AtomicUsize>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks still running or pending.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn total_spawned(&self) -> usize {
        self.spawned_total.load(Ordering::SeqCst)
    }

    /// Spawn a task whose lifetime is tracked by an RAII guard, so completion, panic
    /// and cancellation all decrement `active_count()`.
    pub fn spawn<F, T>(&self, fut: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.spawned_total.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        let guard = TaskGuard {
            counter: Arc::clone(&self.active),
        };
        tokio::spawn(async move {
            let _guard = guard;
            fut.await
        })
    }
}

#[derive(Debug)]
struct TaskGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
