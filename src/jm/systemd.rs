use crate::jm::error::GatewayError;
use crate::jm::gateway::{RunState, ServiceGateway};
use crate::jm::runner::{CmdOutput, CmdRunner};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";

/// [`ServiceGateway`] driving `systemctl`. Requests are `--no-block` so they return once
/// systemd queued the job.
pub struct SystemctlGateway {
    runner: Arc<dyn CmdRunner>,
    unit_dir: PathBuf,
}

impl SystemctlGateway {
    pub fn new(runner: Arc<dyn CmdRunner>) -> Self {
        Self::with_unit_dir(runner, DEFAULT_UNIT_DIR)
    }

    pub fn with_unit_dir(runner: Arc<dyn CmdRunner>, unit_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            unit_dir: unit_dir.into(),
        }
    }

    async fn systemctl(&self, args: &[&str]) -> Result<CmdOutput, GatewayError> {
        self.runner
            .run("systemctl", args)
            .await
            .map_err(|e| GatewayError::Unreachable(format!("systemctl: {e}")))
    }

    async fn request(&self, op: &'static str, args: &[&str], name: &str) -> Result<(), GatewayError> {
        let out = self.systemctl(args).await?;
        if out.success() {
            return Ok(());
        }
        Err(classify_failure(op, name, &out))
    }

    async fn show(&self, name: &str) -> Result<(String, String), GatewayError> {
        let unit = unit_name(name);
        let out = self
            .systemctl(&["show", "-p", "LoadState,ActiveState", "--", unit.as_str()])
            .await?;
        if !out.success() {
            return Err(classify_failure("show", name, &out));
        }
        let mut load = String::new();
        let mut active = String::new();
        for line in out.stdout.lines() {
            match line.split_once('=') {
                Some(("LoadState", v)) => load = v.trim().to_string(),
                Some(("ActiveState", v)) => active = v.trim().to_string(),
                _ => {}
            }
        }
        Ok((load, active))
    }
}

const UNIT_SUFFIXES: &[&str] = &[
    "service", "socket", "timer", "target", "mount", "automount", "path", "swap", "slice",
    "scope", "device",
];

/// `nginx` -> `nginx.service`. Only a real unit-type suffix is kept as is, so
/// `php7.4-fpm` still becomes `php7.4-fpm.service`.
pub fn unit_name(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, suffix)) if !stem.is_empty() && UNIT_SUFFIXES.contains(&suffix) => {
            name.to_string()
        }
        _ => format!("{name}.service"),
    }
}

fn classify_failure(op: &'static str, name: &str, out: &CmdOutput) -> GatewayError {
    let stderr = out.stderr.trim();
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("not found") || lower.contains("not loaded") || lower.contains("no such file") {
        return GatewayError::NotFound(name.to_string());
    }
    if lower.contains("failed to connect to bus") || lower.contains("system has not been booted with systemd") {
        return GatewayError::Unreachable(stderr.to_string());
    }
    GatewayError::Rejected {
        op,
        service: name.to_string(),
        message: format!("exit code {}: {stderr}", out.exit_code),
    }
}

fn map_active_state(active: &str) -> Option<RunState> {
    match active {
        "active" | "reloading" => Some(RunState::Running),
        "activating" => Some(RunState::StartPending),
        "deactivating" => Some(RunState::StopPending),
        "inactive" | "failed" => Some(RunState::Stopped),
        _ => None,
    }
}

#[async_trait]
impl ServiceGateway for SystemctlGateway {
    async fn exists(&self, name: &str) -> Result<bool, GatewayError> {
        match self.show(name).await {
            Ok((load, _)) => Ok(load != "not-found" && !load.is_empty()),
            Err(GatewayError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn start(&self, name: &str) -> Result<(), GatewayError> {
        let unit = unit_name(name);
        self.request("start", &["start", "--no-block", "--", unit.as_str()], name).await
    }

    async fn request_stop(&self, name: &str) -> Result<(), GatewayError> {
        let unit = unit_name(name);
        self.request("stop", &["stop", "--no-block", "--", unit.as_str()], name).await
    }

    async fn remove(&self, name: &str) -> Result<(), GatewayError> {
        let unit = unit_name(name);
        self.request("disable", &["disable", "--now", "--", unit.as_str()], name).await?;
        let path = self.unit_dir.join(&unit);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(GatewayError::Rejected {
                    op: "remove",
                    service: name.to_string(),
                    message: format!("cannot delete {}: {e}", path.display()),
                })
            }
        }
        self.request("daemon-reload", &["daemon-reload"], name).await
    }

    async fn query_state(&self, name: &str) -> Result<RunState, GatewayError> {
        let (load, active) = self.show(name).await?;
        if load == "not-found" {
            return Err(GatewayError::NotFound(name.to_string()));
        }
        map_active_state(&active).ok_or_else(|| GatewayError::Rejected {
            op: "show",
            service: name.to_string(),
            message: format!("unrecognised ActiveState {active:?}"),
        })
    }
}
