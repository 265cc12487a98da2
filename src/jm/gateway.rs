use crate::jm::error::GatewayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Live run-state as reported by the OS service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Stopped,
    StartPending,
    Running,
    StopPending,
    Paused,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Stopped => "stopped",
            RunState::StartPending => "start_pending",
            RunState::Running => "running",
            RunState::StopPending => "stop_pending",
            RunState::Paused => "paused",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability surface of an OS service-control backend.
///
/// Every call is a one-shot request; waiting for convergence is done by [`stop_and_wait`]
/// on top of `request_stop` + `query_state`, so backends stay thin.
#[async_trait]
pub trait ServiceGateway: Send + Sync {
    async fn exists(&self, name: &str) -> Result<bool, GatewayError>;

    /// Returns once the service manager accepted the request (not once running).
    async fn start(&self, name: &str) -> Result<(), GatewayError>;

    async fn request_stop(&self, name: &str) -> Result<(), GatewayError>;

    /// Unregister the service from the OS.
    async fn remove(&self, name: &str) -> Result<(), GatewayError>;

    async fn query_state(&self, name: &str) -> Result<RunState, GatewayError>;
}

/// Bounded polling used while waiting for a service to reach `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopWait {
    pub poll_interval: Duration,
    pub deadline: Duration,
}

impl Default for StopWait {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(300),
            deadline: Duration::from_secs(10),
        }
    }
}

/// Request a stop, then poll until `Stopped` or the deadline elapses.
///
/// # Errors
///
/// `GatewayError::StopTimeout` once `wait.deadline` has passed without reaching `Stopped`;
/// any request/query failure is returned as-is.
pub async fn stop_and_wait(
    gateway: &dyn ServiceGateway,
    name: &str,
    wait: &StopWait,
) -> Result<(), GatewayError> {
    gateway.request_stop(name).await?;
    let t0 = Instant::now();
    let mut polls = 0u32;
    loop {
        let state = gateway.query_state(name).await?;
        polls += 1;
        if state == RunState::Stopped {
            tracing::debug!(
                component = "gateway",
                service = name,
                polls,
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "outcome=stopped"
            );
            return Ok(());
        }
        let waited = t0.elapsed();
        if waited >= wait.deadline {
            return Err(GatewayError::StopTimeout {
                service: name.to_string(),
                waited,
                last: state,
            });
        }
        sleep(wait.poll_interval).await;
    }
}

/// Backend for hosts without a service manager: every name is treated as registered and
/// state follows the last request.
#[derive(Debug, Default)]
pub struct NoopGateway {
    states: Mutex<HashMap<String, RunState>>,
}

impl NoopGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, name: &str, state: RunState) {
        let mut g = self.states.lock().unwrap_or_else(|p| p.into_inner());
        g.insert(name.to_string(), state);
    }
}

#[async_trait]
impl ServiceGateway for NoopGateway {
    async fn exists(&self, _name: &str) -> Result<bool, GatewayError> {
        Ok(true)
    }

    async fn start(&self, name: &str) -> Result<(), GatewayError> {
        self.set(name, RunState::Running);
        Ok(())
    }

    async fn request_stop(&self, name: &str) -> Result<(), GatewayError> {
        self.set(name, RunState::Stopped);
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), GatewayError> {
        let mut g = self.states.lock().unwrap_or_else(|p| p.into_inner());
        g.remove(name);
        Ok(())
    }

    async fn query_state(&self, name: &str) -> Result<RunState, GatewayError> {
        let g = self.states.lock().unwrap_or_else(|p| p.into_inner());
        Ok(g.get(name).copied().unwrap_or(RunState::Stopped))
    }
}
