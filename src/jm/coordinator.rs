use crate::jm::store::JobStore;
use tokio::sync::{Mutex, MutexGuard};

pub type StoreGuard<'a> = MutexGuard<'a, Box<dyn JobStore>>;

/// Sole owner of the job store.
///
/// Lifecycle operations and reconciliation passes reach the store only through
/// [`JobCoordinator::lock`], and hold the guard for their whole read-then-write sequence.
/// Dropping the guard releases the lock on every exit path.
pub struct JobCoordinator {
    store: Mutex<Box<dyn JobStore>>,
}

impl JobCoordinator {
    pub fn new(store: impl JobStore + 'static) -> Self {
        Self {
            store: Mutex::new(Box::new(store)),
        }
    }

    pub async fn lock(&self) -> StoreGuard<'_> {
        self.store.lock().await
    }

    /// Non-blocking attempt; `None` while another holder is active.
    #[cfg(test)]
    pub(crate) fn try_lock(&self) -> Option<StoreGuard<'_>> {
        self.store.try_lock().ok()
    }
}

impl std::fmt::Debug for JobCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobCoordinator")
            .field("locked", &self.store.try_lock().is_err())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jm::store::FsJobStore;

    #[tokio::test]
    async fn guard_is_exclusive_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let coord = JobCoordinator::new(FsJobStore::new(
            dir.path().join("jobs"),
            dir.path().join("jobs.yml"),
        ));
        let guard = coord.lock().await;
        assert!(coord.try_lock().is_none());
        drop(guard);
        assert!(coord.try_lock().is_some());
    }

    #[tokio::test]
    async fn guard_released_on_error_path() {
        async fn failing(coord: &JobCoordinator) -> Result<(), String> {
            let _guard = coord.lock().await;
            Err("boom".to_string())
        }
        let dir = tempfile::tempdir().unwrap();
        let coord = JobCoordinator::new(FsJobStore::new(
            dir.path().join("jobs"),
            dir.path().join("jobs.yml"),
        ));
        assert!(failing(&coord).await.is_err());
        assert!(coord.try_lock().is_some());
    }
}
