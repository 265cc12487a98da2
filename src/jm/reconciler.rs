use crate::jm::asyncutil::TaskTracker;
use crate::jm::consistency::{check, check_store, repair_index};
use crate::jm::coordinator::JobCoordinator;
use crate::jm::error::SupervisorError;
use crate::jm::gateway::ServiceGateway;
use crate::jm::store::JobStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(10);

/// What one pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Declared names appended to the index.
    pub repaired: Vec<String>,
    /// Orphans dropped from the index (and unregistered from the OS when present).
    pub removed: Vec<String>,
}

/// Periodic drift remover: indexed services no job declares any more are unregistered
/// from the OS and dropped from the index.
pub struct Reconciler {
    coordinator: Arc<JobCoordinator>,
    gateway: Arc<dyn ServiceGateway>,
    interval: Duration,
}

impl Reconciler {
    pub fn new(
        coordinator: Arc<JobCoordinator>,
        gateway: Arc<dyn ServiceGateway>,
        interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            gateway,
            interval,
        }
    }

    /// One pass under the coordinator guard. Aborts at the first failing orphan; orphans
    /// already handled stay handled and the rest are retried next pass.
    pub async fn tick(&self) -> Result<ReconcileOutcome, SupervisorError> {
        let mut guard = self.coordinator.lock().await;
        let store: &mut dyn JobStore = &mut **guard;

        let (jobs, _) = check_store(store)?;
        let repaired = repair_index(store, &jobs)?;
        let report = check(&jobs, &store.read_index());
        let mut outcome = ReconcileOutcome {
            repaired,
            removed: vec![],
        };
        if report.consistent {
            return Ok(outcome);
        }

        for orphan in report.orphans {
            self.remove_orphan(store, &orphan).await?;
            outcome.removed.push(orphan);
        }
        Ok(outcome)
    }

    async fn remove_orphan(&self, store: &mut dyn JobStore, name: &str) -> Result<(), SupervisorError> {
        let registered = self
            .gateway
            .exists(name)
            .await
            .map_err(|e| SupervisorError::service("inspect", name, e))?;
        if registered {
            self.gateway
                .remove(name)
                .await
                .map_err(|e| SupervisorError::service("remove", name, e))?;
        }
        let mut index = store.read_index();
        index.remove(name);
        store.write_index(&index)?;
        tracing::info!(
            component = "reconcile",
            service = name,
            unregistered = registered,
            "orphan removed"
        );
        Ok(())
    }

    /// Run a pass right away, then every `interval` until the handle is shut down.
    /// Failures are logged and the loop carries on; missed ticks are skipped rather than burst.
    pub fn spawn(self, tasks: &TaskTracker) -> ReconcilerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tasks.spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(
                component = "reconcile",
                interval_ms = self.interval.as_millis() as u64,
                "loop started"
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }
                match self.tick().await {
                    Ok(outcome) if outcome.removed.is_empty() && outcome.repaired.is_empty() => {}
                    Ok(outcome) => tracing::info!(
                        component = "reconcile",
                        removed = outcome.removed.len(),
                        repaired = outcome.repaired.len(),
                        "tick outcome=changed"
                    ),
                    Err(e) => tracing::warn!(
                        component = "reconcile",
                        error = %e,
                        "tick outcome=error"
                    ),
                }
            }
            tracing::info!(component = "reconcile", "loop exit reason=shutdown");
        });
        ReconcilerHandle { shutdown_tx, join }
    }
}

/// Cancels a spawned [`Reconciler`] loop. A pass in progress finishes first.
#[derive(Debug)]
pub struct ReconcilerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ReconcilerHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            tracing::warn!(component = "reconcile", "loop join failed err={e}");
        }
    }
}
