use crate::jm::asyncutil::TaskTracker;
use crate::jm::build_info;
use crate::jm::config::{AgentConfig, ServiceBackend};
use crate::jm::consistency::{check_store, repair_index};
use crate::jm::coordinator::JobCoordinator;
use crate::jm::failures::JobFailureAlert;
use crate::jm::gateway::{NoopGateway, ServiceGateway};
use crate::jm::logging::init_logging;
use crate::jm::reconciler::Reconciler;
use crate::jm::rpc::{Request, Response};
use crate::jm::runner::{CmdRunner, ShellRunner};
use crate::jm::store::{FsJobStore, JobStore};
use crate::jm::supervisor::JobSupervisor;
use crate::jm::systemd::SystemctlGateway;
use anyhow::Context;
use std::fs;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader as TokioBufReader};
use tokio::net::UnixListener as TokioUnixListener;
use tokio::signal::unix::{signal as unix_signal, SignalKind};

/// Everything a connection handler needs.
#[derive(Clone)]
pub struct DaemonState {
    pub coordinator: Arc<JobCoordinator>,
    pub gateway: Arc<dyn ServiceGateway>,
    pub supervisor: Arc<JobSupervisor>,
}

pub fn run_daemon(cfg: &AgentConfig) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    rt.block_on(run_daemon_async(cfg.clone()))
}

/// Wire the collaborators, heal the index, and build the supervisor. No sockets, no tasks.
pub fn build_state(cfg: &AgentConfig) -> anyhow::Result<DaemonState> {
    let runner: Arc<dyn CmdRunner> = Arc::new(ShellRunner);
    let gateway: Arc<dyn ServiceGateway> = match cfg.service_backend {
        ServiceBackend::Systemd => Arc::new(SystemctlGateway::new(Arc::clone(&runner))),
        ServiceBackend::Noop => Arc::new(NoopGateway::new()),
    };

    let mut store = FsJobStore::new(&cfg.jobs_directory, &cfg.index_path);
    boot_repair(&mut store);
    let coordinator = Arc::new(JobCoordinator::new(store));
    let supervisor = Arc::new(JobSupervisor::new(
        Arc::clone(&coordinator),
        Arc::clone(&gateway),
        runner,
        cfg.stop,
        cfg.reload,
    ));
    Ok(DaemonState {
        coordinator,
        gateway,
        supervisor,
    })
}

/// Append declared services an interrupted AddJob left out of the index.
fn boot_repair(store: &mut dyn JobStore) {
    match check_store(store) {
        Ok((jobs, report)) => {
            tracing::info!(
                component = "boot",
                jobs = jobs.len(),
                orphans = report.orphans.len(),
                "job store loaded"
            );
            if let Err(e) = repair_index(store, &jobs) {
                tracing::warn!(component = "boot", error = %e, "index repair failed");
            }
        }
        Err(e) => {
            tracing::warn!(component = "boot", error = %e, "job store unreadable; skipping index repair");
        }
    }
}

fn log_failure_alert(alert: JobFailureAlert) -> anyhow::Result<()> {
    tracing::error!(
        component = "failures",
        job = alert.job_name.as_deref().unwrap_or("-"),
        job_index = alert.job_index.map(|i| i as i64).unwrap_or(-1),
        service = %alert.service,
        at = %alert.at.to_rfc3339(),
        "job failure: {}",
        alert.description
    );
    Ok(())
}

pub async fn run_daemon_async(cfg: AgentConfig) -> anyhow::Result<()> {
    init_logging(&cfg.log_level, cfg.log_file.as_deref())?;
    tracing::info!(
        component = "boot",
        version = build_info::version(),
        build_time = build_info::build_time_raw(),
        build_host = build_info::build_host(),
        backend = ?cfg.service_backend,
        jobs_directory = %cfg.jobs_directory.display(),
        "starting"
    );

    let tasks = TaskTracker::new();
    let state = build_state(&cfg)?;

    let monitor = state
        .supervisor
        .monitor_job_failures(log_failure_alert)
        .context("register job failure monitor")?;
    let reconciler = Reconciler::new(
        Arc::clone(&state.coordinator),
        Arc::clone(&state.gateway),
        cfg.reconcile_interval,
    )
    .spawn(&tasks);

    let sock = cfg.sock.clone();
    prepare_socket(&sock)?;
    let listener = TokioUnixListener::bind(&sock)
        .with_context(|| format!("failed to bind socket {}", sock.display()))?;
    let mut term = unix_signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    let mut int = unix_signal(SignalKind::interrupt()).context("install SIGINT handler")?;
    tracing::info!(component = "rpc", sock = %sock.display(), "listening");

    loop {
        tokio::select! {
            r = listener.accept() => {
                match r {
                    Ok((stream, _addr)) => {
                        let st = state.clone();
                        tasks.spawn(async move {
                            if let Err(e) = handle_connection_async(st, stream).await {
                                tracing::warn!(component = "rpc", "connection error: {e:#}");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(component = "rpc", "accept error: {e}");
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                }
            }
            _ = term.recv() => break,
            _ = int.recv() => break,
        }
    }

    tracing::info!(component = "shutdown", "signal received; stopping reconciler");
    reconciler.shutdown().await;
    monitor.abort();
    // Clients should fail fast until restarted.
    let _ = fs::remove_file(&sock);
    tracing::info!(
        component = "shutdown",
        tasks_active = tasks.active_count(),
        tasks_spawned = tasks.total_spawned(),
        "done"
    );
    Ok(())
}

fn prepare_socket(sock: &Path) -> anyhow::Result<()> {
    if let Some(parent) = sock.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create socket directory {}", parent.display()))?;
    }

    if sock.exists() {
        // If something is already listening, fail. Otherwise remove stale socket.
        match UnixStream::connect(sock) {
            Ok(_) => anyhow::bail!(
                "jobmaster already running (socket {} is accepting connections)",
                sock.display()
            ),
            Err(_) => {
                fs::remove_file(sock)
                    .with_context(|| format!("failed to remove stale socket {}", sock.display()))?;
            }
        }
    }
    Ok(())
}

async fn handle_connection_async(
    state: DaemonState,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let mut reader = TokioBufReader::new(stream);
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 || line.trim().is_empty() {
        return Ok(());
    }
    let resp = match serde_json::from_str::<Request>(line.trim_end()) {
        Ok(req) => {
            let op = req.name();
            match dispatch_async(&state, req).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(component = "rpc", op, "request failed: {e:#}");
                    // Full chain so clients see which job/service failed.
                    Response::err(format!("{e:#}"))
                }
            }
        }
        Err(e) => Response::err(format!("malformed request: {e}")),
    };
    let mut stream = reader.into_inner();
    let resp_line = serde_json::to_string(&resp)? + "\n";
    stream.write_all(resp_line.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

pub async fn dispatch_async(state: &DaemonState, req: Request) -> anyhow::Result<Response> {
    let sup = &state.supervisor;
    match req {
        Request::Start => {
            sup.start().await?;
            Ok(Response::ok("started"))
        }
        Request::Stop => {
            sup.stop().await?;
            Ok(Response::ok("stopped"))
        }
        Request::Reload => {
            sup.reload().await?;
            Ok(Response::ok("reloaded"))
        }
        Request::Unmonitor => {
            sup.unmonitor().await?;
            Ok(Response::ok("unmonitored"))
        }
        Request::Status => {
            let mut resp = Response::ok("");
            resp.status = Some(sup.status().await);
            Ok(resp)
        }
        Request::AddJob {
            job_name,
            job_index,
            config_path,
        } => {
            sup.add_job(&job_name, job_index, &config_path)
                .await
                .with_context(|| format!("add job {job_name}/{job_index}"))?;
            Ok(Response::ok(format!("added {job_name}/{job_index}")))
        }
        Request::RemoveJob {
            job_name,
            job_index,
        } => {
            sup.remove_job(&job_name, job_index).await?;
            Ok(Response::ok(format!("removed {job_name}/{job_index}")))
        }
        Request::RemoveAllJobs => {
            sup.remove_all_jobs().await?;
            Ok(Response::ok("removed all jobs"))
        }
        Request::Jobs => {
            let mut resp = Response::ok("");
            resp.jobs = sup.jobs().await?;
            Ok(resp)
        }
        Request::Alert {
            service,
            description,
        } => {
            sup.alert_sender().notify(&service, &description)?;
            Ok(Response::ok(format!("alert queued for {service}")))
        }
        Request::ServerVersion => Ok(Response::ok(build_info::banner())),
    }
}
