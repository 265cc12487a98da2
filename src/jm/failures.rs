use crate::jm::coordinator::JobCoordinator;
use crate::jm::error::SupervisorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A job reported failure through the inbound notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailureAlert {
    /// Owning job. `None` when neither the transport nor the store could tell.
    pub job_name: Option<String>,
    pub job_index: Option<u32>,
    pub service: String,
    pub description: String,
    pub at: DateTime<Utc>,
}

/// Receives alerts from the monitor task. Errors are logged, never fatal to the monitor.
pub trait JobFailureHandler: Send + Sync + 'static {
    fn handle(&self, alert: JobFailureAlert) -> anyhow::Result<()>;
}

impl<F> JobFailureHandler for F
where
    F: Fn(JobFailureAlert) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn handle(&self, alert: JobFailureAlert) -> anyhow::Result<()> {
        self(alert)
    }
}

/// Transport-side handle; clone one per listener.
#[derive(Debug, Clone)]
pub struct AlertSender {
    tx: mpsc::UnboundedSender<JobFailureAlert>,
}

impl AlertSender {
    /// Report a failure for a service whose job is not known to the transport.
    pub fn notify(&self, service: &str, description: &str) -> Result<(), SupervisorError> {
        self.send(JobFailureAlert {
            job_name: None,
            job_index: None,
            service: service.to_string(),
            description: description.to_string(),
            at: Utc::now(),
        })
    }

    pub fn send(&self, alert: JobFailureAlert) -> Result<(), SupervisorError> {
        self.tx
            .send(alert)
            .map_err(|_| SupervisorError::AlertChannelClosed)
    }
}

/// Alert queue owned by the supervisor. The receiving end is handed out once.
#[derive(Debug)]
pub(crate) struct FailureChannel {
    tx: mpsc::UnboundedSender<JobFailureAlert>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<JobFailureAlert>>>,
}

impl FailureChannel {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    pub(crate) fn sender(&self) -> AlertSender {
        AlertSender {
            tx: self.tx.clone(),
        }
    }

    pub(crate) fn take_receiver(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<JobFailureAlert>, SupervisorError> {
        let mut g = self.rx.lock().unwrap_or_else(|p| p.into_inner());
        g.take().ok_or(SupervisorError::MonitorAlreadyRegistered)
    }
}

/// Consume alerts until the channel closes, filling in the owning job when missing.
pub(crate) async fn dispatch_alerts(
    mut rx: mpsc::UnboundedReceiver<JobFailureAlert>,
    coordinator: Arc<JobCoordinator>,
    handler: Arc<dyn JobFailureHandler>,
) {
    while let Some(mut alert) = rx.recv().await {
        if alert.job_name.is_none() {
            resolve_owner(&coordinator, &mut alert).await;
        }
        let service = alert.service.clone();
        if let Err(e) = handler.handle(alert) {
            tracing::warn!(
                component = "failures",
                service = %service,
                error = %format!("{e:#}"),
                "outcome=handler_error"
            );
        }
    }
    tracing::debug!(component = "failures", "monitor exit reason=channel_closed");
}

async fn resolve_owner(coordinator: &JobCoordinator, alert: &mut JobFailureAlert) {
    let guard = coordinator.lock().await;
    match guard.read_all() {
        Ok(jobs) => {
            if let Some(job) = jobs
                .iter()
                .find(|j| j.service_names().any(|n| n == alert.service))
            {
                alert.job_name = Some(job.job_name.clone());
                alert.job_index = Some(job.job_index);
            }
        }
        Err(e) => {
            tracing::warn!(
                component = "failures",
                service = %alert.service,
                error = %e,
                "cannot resolve owning job"
            );
        }
    }
}
