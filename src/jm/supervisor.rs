use crate::jm::coordinator::JobCoordinator;
use crate::jm::error::{GatewayError, HookError, HookKind, StoreError, SupervisorError};
use crate::jm::failures::{dispatch_alerts, AlertSender, FailureChannel, JobFailureHandler};
use crate::jm::gateway::{stop_and_wait, RunState, ServiceGateway, StopWait};
use crate::jm::job::{parse_job_definition_yaml, Job, JobKey, Service, ServiceStatus};
use crate::jm::runner::CmdRunner;
use crate::jm::store::JobStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Retry policy gating [`JobSupervisor::reload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadOptions {
    /// Whole stop/hook/start attempts before giving up.
    pub max_tries: u32,
    /// Convergence queries per attempt.
    pub max_check_tries: u32,
    pub delay_between_check_tries: Duration,
}

impl Default for ReloadOptions {
    fn default() -> Self {
        Self {
            max_tries: 1,
            max_check_tries: 6,
            delay_between_check_tries: Duration::from_secs(5),
        }
    }
}

/// Aggregate health reported by [`JobSupervisor::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobsStatus {
    Running,
    Failing,
    Unknown,
}

impl JobsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobsStatus::Running => "running",
            JobsStatus::Failing => "failing",
            JobsStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle API over the persisted jobs.
///
/// Every operation takes the coordinator guard first and keeps it until its last store
/// write, so it never interleaves with a reconciler pass or another operation.
/// Jobs and services are processed in store order; a failing step aborts the operation
/// without compensating for steps already done.
pub struct JobSupervisor {
    coordinator: Arc<JobCoordinator>,
    gateway: Arc<dyn ServiceGateway>,
    runner: Arc<dyn CmdRunner>,
    stop_wait: StopWait,
    reload: ReloadOptions,
    failures: FailureChannel,
}

impl JobSupervisor {
    pub fn new(
        coordinator: Arc<JobCoordinator>,
        gateway: Arc<dyn ServiceGateway>,
        runner: Arc<dyn CmdRunner>,
        stop_wait: StopWait,
        reload: ReloadOptions,
    ) -> Self {
        Self {
            coordinator,
            gateway,
            runner,
            stop_wait,
            reload,
            failures: FailureChannel::new(),
        }
    }

    /// PreStart + start every service, then mark each fully started job `monitored`.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        let mut guard = self.coordinator.lock().await;
        self.start_all(&mut **guard).await
    }

    /// PreStop + bounded stop of every service. Declared status is left as is.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        let guard = self.coordinator.lock().await;
        self.stop_all(&**guard).await
    }

    /// Stop all, PreStart all, start all; retried and convergence-checked per [`ReloadOptions`].
    pub async fn reload(&self) -> Result<(), SupervisorError> {
        let mut guard = self.coordinator.lock().await;
        let store: &mut dyn JobStore = &mut **guard;
        let tries = self.reload.max_tries.max(1);
        let mut attempt = 1;
        loop {
            match self.reload_once(store, attempt).await {
                Ok(()) => {
                    tracing::info!(component = "supervisor", attempt, "reload outcome=ok");
                    return Ok(());
                }
                Err(e) if attempt < tries => {
                    tracing::warn!(
                        component = "supervisor",
                        attempt,
                        max_tries = tries,
                        error = %e,
                        "reload outcome=retry"
                    );
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        component = "supervisor",
                        attempt,
                        error = %e,
                        "reload outcome=failed"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Persist `not_monitored` for every service. OS services are not touched.
    pub async fn unmonitor(&self) -> Result<(), SupervisorError> {
        let mut guard = self.coordinator.lock().await;
        let store: &mut dyn JobStore = &mut **guard;
        for mut job in store.read_all()? {
            job.set_status(ServiceStatus::NotMonitored);
            store.write(&job)?;
        }
        tracing::info!(component = "supervisor", "unmonitor outcome=ok");
        Ok(())
    }

    /// First failure wins: a gateway connectivity error yields `failing` and a service the
    /// OS does not know yields `unknown`, both without checking later services. A service
    /// not declared `monitored` yields `failing` but the scan goes on.
    pub async fn status(&self) -> JobsStatus {
        let guard = self.coordinator.lock().await;
        let jobs = match guard.read_all() {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::warn!(component = "supervisor", error = %e, "status: job store unreadable");
                return JobsStatus::Failing;
            }
        };
        let mut status = JobsStatus::Running;
        for job in &jobs {
            for svc in &job.services {
                if !svc.is_monitored() {
                    status = JobsStatus::Failing;
                }
                match self.gateway.query_state(&svc.name).await {
                    Ok(_) => {}
                    Err(GatewayError::NotFound(_)) => {
                        tracing::debug!(component = "supervisor", service = %svc.name, "status: not registered");
                        return JobsStatus::Unknown;
                    }
                    Err(e) => {
                        tracing::debug!(component = "supervisor", service = %svc.name, error = %e, "status: query failed");
                        return JobsStatus::Failing;
                    }
                }
            }
        }
        status
    }

    /// Read a job definition from `source`, stamp it, and persist the record then the index.
    pub async fn add_job(
        &self,
        job_name: &str,
        job_index: u32,
        source: &Path,
    ) -> Result<(), SupervisorError> {
        let raw = tokio::fs::read_to_string(source)
            .await
            .map_err(|e| SupervisorError::Source {
                path: source.to_path_buf(),
                source: e,
            })?;
        let job = parse_job_definition_yaml(&raw, source, job_name, job_index)?;
        let key = job.key();

        let mut guard = self.coordinator.lock().await;
        let store: &mut dyn JobStore = &mut **guard;
        for other in store.read_all()?.iter().filter(|j| j.key() != key) {
            if let Some(dup) = job.service_names().find(|n| other.service_names().any(|o| o == *n)) {
                return Err(SupervisorError::Definition {
                    path: source.to_path_buf(),
                    reason: format!("service {dup:?} is already declared by job {}", other.key()),
                });
            }
        }

        store.write(&job)?;
        let mut index = store.read_index();
        let before = index.service_names.len();
        for name in job.service_names() {
            index.append_unique(name);
        }
        if index.service_names.len() != before {
            store.write_index(&index)?;
        }
        tracing::info!(
            component = "supervisor",
            job = %key,
            services = job.services.len(),
            "add_job outcome=ok"
        );
        Ok(())
    }

    /// Stop one job's services, then delete its record. Its index entries are left for the
    /// reconciler to treat as orphans.
    pub async fn remove_job(&self, job_name: &str, job_index: u32) -> Result<(), SupervisorError> {
        let key = JobKey::new(job_name, job_index);
        let mut guard = self.coordinator.lock().await;
        let store: &mut dyn JobStore = &mut **guard;
        let job = store.read(&key).map_err(|e| match e {
            StoreError::Missing { .. } => SupervisorError::JobNotFound(key.to_string()),
            other => other.into(),
        })?;
        for svc in &job.services {
            self.stop_service(svc).await?;
        }
        store.remove(&key)?;
        tracing::info!(component = "supervisor", job = %key, "remove_job outcome=ok");
        Ok(())
    }

    /// Stop everything, then delete the whole job directory. A stop failure aborts before
    /// anything is deleted.
    pub async fn remove_all_jobs(&self) -> Result<(), SupervisorError> {
        let mut guard = self.coordinator.lock().await;
        let store: &mut dyn JobStore = &mut **guard;
        self.stop_all(store).await?;
        store.remove_all()?;
        tracing::info!(component = "supervisor", "remove_all_jobs outcome=ok");
        Ok(())
    }

    pub async fn jobs(&self) -> Result<Vec<Job>, SupervisorError> {
        let guard = self.coordinator.lock().await;
        Ok(guard.read_all()?)
    }

    /// Register the single consumer of the failure channel. The returned task runs until
    /// aborted.
    pub fn monitor_job_failures(
        &self,
        handler: impl JobFailureHandler,
    ) -> Result<JoinHandle<()>, SupervisorError> {
        let rx = self.failures.take_receiver()?;
        let handler: Arc<dyn JobFailureHandler> = Arc::new(handler);
        Ok(tokio::spawn(dispatch_alerts(
            rx,
            Arc::clone(&self.coordinator),
            handler,
        )))
    }

    pub fn alert_sender(&self) -> AlertSender {
        self.failures.sender()
    }

    async fn start_all(&self, store: &mut dyn JobStore) -> Result<(), SupervisorError> {
        for mut job in store.read_all()? {
            for svc in &job.services {
                self.run_hook(HookKind::PreStart, svc).await?;
                self.gateway
                    .start(&svc.name)
                    .await
                    .map_err(|e| SupervisorError::service("start", &svc.name, e))?;
                tracing::debug!(component = "supervisor", job = %job.key(), service = %svc.name, "start requested");
            }
            job.set_status(ServiceStatus::Monitored);
            store.write(&job)?;
        }
        Ok(())
    }

    async fn stop_all(&self, store: &dyn JobStore) -> Result<(), SupervisorError> {
        for job in store.read_all()? {
            for svc in &job.services {
                self.stop_service(svc).await?;
            }
        }
        Ok(())
    }

    async fn stop_service(&self, svc: &Service) -> Result<(), SupervisorError> {
        self.run_hook(HookKind::PreStop, svc).await?;
        stop_and_wait(self.gateway.as_ref(), &svc.name, &self.stop_wait)
            .await
            .map_err(|e| SupervisorError::service("stop", &svc.name, e))
    }

    async fn reload_once(&self, store: &mut dyn JobStore, attempt: u32) -> Result<(), SupervisorError> {
        self.stop_all(store).await?;
        let jobs = store.read_all()?;
        for svc in jobs.iter().flat_map(|j| j.services.iter()) {
            self.run_hook(HookKind::PreStart, svc).await?;
        }
        self.start_all(store).await?;
        self.await_running(&jobs, attempt).await
    }

    async fn await_running(&self, jobs: &[Job], attempt: u32) -> Result<(), SupervisorError> {
        let checks = self.reload.max_check_tries.max(1);
        let mut pending: Vec<String> = vec![];
        for check in 1..=checks {
            pending.clear();
            for name in jobs.iter().flat_map(|j| j.service_names()) {
                match self.gateway.query_state(name).await {
                    Ok(RunState::Running) => {}
                    Ok(_) => pending.push(name.to_string()),
                    Err(e) => {
                        tracing::debug!(component = "supervisor", service = name, error = %e, "reload check: query failed");
                        pending.push(name.to_string());
                    }
                }
            }
            if pending.is_empty() {
                return Ok(());
            }
            if check < checks {
                tokio::time::sleep(self.reload.delay_between_check_tries).await;
            }
        }
        Err(SupervisorError::ReloadNotConverged {
            attempts: attempt,
            pending,
        })
    }

    async fn run_hook(&self, hook: HookKind, svc: &Service) -> Result<(), HookError> {
        let command = match hook {
            HookKind::PreStart => svc.pre_start.as_deref(),
            HookKind::PreStop => svc.pre_stop.as_deref(),
        };
        let Some(command) = command else {
            return Ok(());
        };
        let out = self
            .runner
            .run_command_line(command)
            .await
            .map_err(|e| HookError::Launch {
                hook,
                service: svc.name.clone(),
                source: e,
            })?;
        tracing::debug!(
            component = "supervisor",
            service = %svc.name,
            %hook,
            exit_code = out.exit_code,
            stdout = %out.stdout.trim_end(),
            "hook finished"
        );
        if !out.success() {
            return Err(HookError::Failed {
                hook,
                service: svc.name.clone(),
                exit_code: out.exit_code,
                stdout: out.stdout,
                stderr: out.stderr,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jm::testutil::Harness;

    const TWO_SERVICES: &str = "\
services:
  - name: a
    pre_start: prep-a
    pre_stop: drain-a
  - name: b
";

    fn statuses(h: &Harness) -> Vec<Option<ServiceStatus>> {
        h.store
            .read_all()
            .unwrap()
            .iter()
            .flat_map(|j| j.services.iter().map(|s| s.status))
            .collect()
    }

    #[tokio::test]
    async fn add_job_round_trips_through_read_all() {
        let h = Harness::new();
        h.add("myjob", 3, TWO_SERVICES).await;

        let jobs = h.store.read_all().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_name, "myjob");
        assert_eq!(jobs[0].job_index, 3);
        assert_eq!(jobs[0].service_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(jobs[0].services.iter().all(Service::is_monitored));
        assert_eq!(jobs[0].services[0].pre_start.as_deref(), Some("prep-a"));

        let index = h.store.read_index();
        assert!(index.contains("a") && index.contains("b"));
    }

    #[tokio::test]
    async fn add_job_does_not_duplicate_index_entries() {
        let h = Harness::new();
        h.add("myjob", 0, TWO_SERVICES).await;
        h.add("myjob", 0, TWO_SERVICES).await;
        assert_eq!(h.store.read_index().service_names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn add_job_rejects_service_owned_by_another_job() {
        let h = Harness::new();
        h.add("first", 0, "services:\n  - name: shared\n").await;
        let path = h.source("second.yml", "services:\n  - name: shared\n");

        let err = h.supervisor.add_job("second", 0, &path).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Definition { .. }), "{err}");
        assert_eq!(h.store.read_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn add_job_reports_unreadable_source() {
        let h = Harness::new();
        let err = h
            .supervisor
            .add_job("j", 0, &h.dir.path().join("missing.yml"))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Source { .. }));
    }

    #[tokio::test]
    async fn unmonitor_is_idempotent() {
        let h = Harness::new();
        h.add("j", 0, TWO_SERVICES).await;
        h.add("k", 1, "services:\n  - name: c\n").await;

        h.supervisor.unmonitor().await.unwrap();
        let once = statuses(&h);
        h.supervisor.unmonitor().await.unwrap();
        assert_eq!(statuses(&h), once);
        assert!(once.iter().all(|s| *s == Some(ServiceStatus::NotMonitored)));
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn start_runs_hooks_and_marks_monitored() {
        let h = Harness::new();
        h.add("j", 0, TWO_SERVICES).await;
        h.supervisor.unmonitor().await.unwrap();

        h.supervisor.start().await.unwrap();
        assert_eq!(h.runner.commands(), vec!["prep-a"]);
        assert_eq!(h.gateway.calls(), vec!["start:a", "start:b"]);
        assert!(statuses(&h).iter().all(|s| *s == Some(ServiceStatus::Monitored)));
    }

    #[tokio::test]
    async fn start_aborts_on_hook_failure_with_captured_output() {
        let h = Harness::new();
        h.add("j", 0, TWO_SERVICES).await;
        h.supervisor.unmonitor().await.unwrap();
        h.runner.script("prep-a", 3, "half done", "disk full");

        let err = h.supervisor.start().await.unwrap_err();
        match err {
            SupervisorError::Hook(HookError::Failed {
                hook,
                service,
                exit_code,
                stdout,
                stderr,
            }) => {
                assert_eq!(hook, HookKind::PreStart);
                assert_eq!(service, "a");
                assert_eq!(exit_code, 3);
                assert_eq!(stdout, "half done");
                assert_eq!(stderr, "disk full");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(h.gateway.calls().is_empty());
        assert!(statuses(&h).iter().all(|s| *s == Some(ServiceStatus::NotMonitored)));
    }

    #[tokio::test]
    async fn hook_launch_failure_is_distinct() {
        let h = Harness::new();
        h.add("j", 0, TWO_SERVICES).await;
        h.runner.fail_launch("prep-a");
        let err = h.supervisor.start().await.unwrap_err();
        assert!(matches!(err, SupervisorError::Hook(HookError::Launch { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_runs_pre_stop_and_keeps_declared_status() {
        let h = Harness::new();
        h.add("j", 0, TWO_SERVICES).await;
        h.gateway.script_stop("a", 2);

        h.supervisor.stop().await.unwrap();
        assert_eq!(h.runner.commands(), vec!["drain-a"]);
        assert_eq!(h.gateway.query_count("a"), 3);
        assert!(statuses(&h).iter().all(|s| *s == Some(ServiceStatus::Monitored)));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_timeout_surfaces_as_timeout() {
        let h = Harness::new();
        h.add("j", 0, TWO_SERVICES).await;
        h.gateway.never_stop("a");

        let err = h.supervisor.stop().await.unwrap_err();
        assert!(err.is_stop_timeout(), "{err}");
        assert_eq!(h.gateway.stop_requests("b"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_all_jobs_keeps_directory_when_stop_fails() {
        let h = Harness::new();
        h.add("j", 0, TWO_SERVICES).await;
        h.gateway.fail_stop("b");

        assert!(h.supervisor.remove_all_jobs().await.is_err());
        assert!(h.store.jobs_directory().exists());
        assert_eq!(h.store.read_all().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_all_jobs_deletes_directory_after_stopping() {
        let h = Harness::new();
        h.add("j", 0, TWO_SERVICES).await;

        h.supervisor.remove_all_jobs().await.unwrap();
        assert!(!h.store.jobs_directory().exists());
        assert_eq!(h.gateway.calls(), vec!["stop:a", "stop:b"]);
        assert!(h.store.read_index().contains("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn remove_job_stops_and_deletes_one_record() {
        let h = Harness::new();
        h.add("j", 0, TWO_SERVICES).await;
        h.add("k", 0, "services:\n  - name: c\n").await;

        h.supervisor.remove_job("j", 0).await.unwrap();
        let left = h.store.read_all().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].job_name, "k");
        assert_eq!(h.gateway.calls(), vec!["stop:a", "stop:b"]);

        let err = h.supervisor.remove_job("j", 0).await.unwrap_err();
        assert!(matches!(err, SupervisorError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn status_running_when_all_monitored_and_registered() {
        let h = Harness::new();
        h.add("j", 0, TWO_SERVICES).await;
        assert_eq!(h.supervisor.status().await, JobsStatus::Running);
    }

    #[tokio::test]
    async fn status_with_no_jobs_is_running() {
        let h = Harness::new();
        assert_eq!(h.supervisor.status().await, JobsStatus::Running);
    }

    #[tokio::test]
    async fn status_failing_when_unmonitored() {
        let h = Harness::new();
        h.add("j", 0, TWO_SERVICES).await;
        h.supervisor.unmonitor().await.unwrap();
        assert_eq!(h.supervisor.status().await, JobsStatus::Failing);
    }

    #[tokio::test]
    async fn status_unknown_when_service_not_registered() {
        let h = Harness::new();
        h.add("j", 0, "services:\n  - name: a\n").await;
        h.add("k", 0, "services:\n  - name: ghost\n").await;
        h.gateway.remove("ghost").await.unwrap();
        assert_eq!(h.supervisor.status().await, JobsStatus::Unknown);
    }

    #[tokio::test]
    async fn status_first_failure_wins() {
        let h = Harness::new();
        h.add("j", 0, "services:\n  - name: a\n").await;
        h.add("k", 0, "services:\n  - name: ghost\n").await;
        h.gateway.remove("ghost").await.unwrap();
        h.gateway.set_unreachable(true);
        assert_eq!(h.supervisor.status().await, JobsStatus::Failing);
        assert_eq!(h.gateway.query_count("ghost"), 0);
    }

    #[tokio::test]
    async fn status_failing_when_store_unreadable() {
        let h = Harness::new();
        h.add("j", 0, "services:\n  - name: a\n").await;
        std::fs::write(h.store.jobs_directory().join("0001_bad.yml"), "[").unwrap();
        assert_eq!(h.supervisor.status().await, JobsStatus::Failing);
    }

    #[tokio::test(start_paused = true)]
    async fn reload_stops_hooks_and_starts() {
        let h = Harness::new();
        h.add("j", 0, TWO_SERVICES).await;
        h.gateway.register("a", RunState::Running);
        h.gateway.register("b", RunState::Running);

        h.supervisor.reload().await.unwrap();
        assert_eq!(
            h.gateway.calls(),
            vec!["stop:a", "stop:b", "start:a", "start:b"]
        );
        assert_eq!(h.runner.commands(), vec!["drain-a", "prep-a", "prep-a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn reload_waits_for_convergence() {
        let h = Harness::with_reload(ReloadOptions {
            max_tries: 1,
            max_check_tries: 6,
            delay_between_check_tries: Duration::from_secs(5),
        });
        h.add("j", 0, "services:\n  - name: slow\n").await;
        h.gateway.script_start("slow", 2);

        let t0 = tokio::time::Instant::now();
        h.supervisor.reload().await.unwrap();
        assert_eq!(h.gateway.state("slow"), Some(RunState::Running));
        assert!(t0.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn reload_retries_then_reports_non_convergence() {
        let h = Harness::with_reload(ReloadOptions {
            max_tries: 2,
            max_check_tries: 3,
            delay_between_check_tries: Duration::from_secs(1),
        });
        h.add("j", 0, "services:\n  - name: ok\n  - name: stuck\n").await;
        h.gateway.never_start("stuck");

        let err = h.supervisor.reload().await.unwrap_err();
        match err {
            SupervisorError::ReloadNotConverged { attempts, pending } => {
                assert_eq!(attempts, 2);
                assert_eq!(pending, vec!["stuck".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        let starts = h
            .gateway
            .calls()
            .into_iter()
            .filter(|c| c == "start:stuck")
            .count();
        assert_eq!(starts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reload_returns_last_error_without_retrying_past_max() {
        let h = Harness::new();
        h.add("j", 0, TWO_SERVICES).await;
        h.gateway.fail_start("b");

        let err = h.supervisor.reload().await.unwrap_err();
        assert!(matches!(err, SupervisorError::Service { action: "start", .. }));
        assert_eq!(
            h.gateway.calls().iter().filter(|c| *c == "start:b").count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reload_aborts_when_pre_start_fails_after_stopping() {
        let h = Harness::new();
        h.add("j", 0, TWO_SERVICES).await;
        h.gateway.register("a", RunState::Running);
        h.gateway.register("b", RunState::Running);
        h.runner.script("prep-a", 1, "", "config invalid");

        let err = h.supervisor.reload().await.unwrap_err();
        match err {
            SupervisorError::Hook(HookError::Failed {
                hook,
                service,
                exit_code,
                stderr,
                ..
            }) => {
                assert_eq!(hook, HookKind::PreStart);
                assert_eq!(service, "a");
                assert_eq!(exit_code, 1);
                assert_eq!(stderr, "config invalid");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(h.gateway.calls(), vec!["stop:a", "stop:b"]);
        assert!(!h.gateway.calls().iter().any(|c| c.starts_with("start:")));
        assert_eq!(h.gateway.state("a"), Some(RunState::Stopped));
        assert_eq!(h.gateway.state("b"), Some(RunState::Stopped));
        assert_eq!(h.runner.commands(), vec!["drain-a", "prep-a"]);
    }

    #[tokio::test]
    async fn jobs_lists_records_in_store_order() {
        let h = Harness::new();
        h.add("zeta", 0, "services:\n  - name: z\n").await;
        h.add("alpha", 1, "services:\n  - name: x\n").await;
        let names: Vec<_> = h
            .supervisor
            .jobs()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.key().to_string())
            .collect();
        assert_eq!(names, vec!["zeta/0", "alpha/1"]);
    }
}
