use crate::jm::gateway::RunState;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures reading or writing persisted job state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("job record {} does not exist", .path.display())]
    Missing { path: PathBuf },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("job record {} declares {found}, expected {expected}", .path.display())]
    KeyMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove {}: {source}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failures reported by a service-control backend.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("service {0:?} is not registered with the service manager")]
    NotFound(String),
    #[error("service manager unreachable: {0}")]
    Unreachable(String),
    #[error("service manager rejected {op} for {service:?}: {message}")]
    Rejected {
        op: &'static str,
        service: String,
        message: String,
    },
    #[error(
        "timed out after {}ms waiting for {service:?} to stop (last state {last})",
        .waited.as_millis()
    )]
    StopTimeout {
        service: String,
        waited: Duration,
        last: RunState,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    PreStart,
    PreStop,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookKind::PreStart => f.write_str("pre-start"),
            HookKind::PreStop => f.write_str("pre-stop"),
        }
    }
}

/// A pre-start/pre-stop hook that could not be run or exited non-zero.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("{hook} hook for {service:?} could not be launched: {source}")]
    Launch {
        hook: HookKind,
        service: String,
        #[source]
        source: io::Error,
    },
    #[error("{hook} hook for {service:?} exited with code {exit_code}: {stderr}")]
    Failed {
        hook: HookKind,
        service: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("job store: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Hook(#[from] HookError),
    #[error("{action} service {service:?}: {source}")]
    Service {
        action: &'static str,
        service: String,
        #[source]
        source: GatewayError,
    },
    #[error("failed to read job definition {}: {source}", .path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid job definition {}: {reason}", .path.display())]
    Definition { path: PathBuf, reason: String },
    #[error("job {0} not found")]
    JobNotFound(String),
    #[error("reload did not converge after {attempts} attempt(s); not running: {}", .pending.join(","))]
    ReloadNotConverged { attempts: u32, pending: Vec<String> },
    #[error("a job failure monitor is already registered")]
    MonitorAlreadyRegistered,
    #[error("job failure channel is closed")]
    AlertChannelClosed,
}

impl SupervisorError {
    pub(crate) fn service(action: &'static str, service: &str, source: GatewayError) -> Self {
        SupervisorError::Service {
            action,
            service: service.to_string(),
            source,
        }
    }

    /// True when the failure was a bounded stop-wait running out of time.
    pub fn is_stop_timeout(&self) -> bool {
        matches!(
            self,
            SupervisorError::Service {
                source: GatewayError::StopTimeout { .. },
                ..
            }
        )
    }
}
