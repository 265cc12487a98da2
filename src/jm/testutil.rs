use crate::jm::coordinator::JobCoordinator;
use crate::jm::error::{GatewayError, StoreError};
use crate::jm::gateway::{RunState, ServiceGateway, StopWait};
use crate::jm::job::{GlobalServiceIndex, Job, JobKey};
use crate::jm::runner::{CmdOutput, CmdRunner};
use crate::jm::store::{FsJobStore, JobStore};
use crate::jm::supervisor::{JobSupervisor, ReloadOptions};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

// ---------------- FakeGateway ----------------

#[derive(Debug, Default)]
struct FakeState {
    states: HashMap<String, RunState>,
    // None = never converges.
    pending: HashMap<String, Option<u32>>,
    stop_script: HashMap<String, Option<u32>>,
    start_script: HashMap<String, Option<u32>>,
    queries: HashMap<String, u32>,
    stop_requests: HashMap<String, u32>,
    calls: Vec<String>,
    unreachable: bool,
    fail_start: HashSet<String>,
    fail_stop: HashSet<String>,
    fail_remove: HashSet<String>,
}

/// Scripted in-memory service manager.
#[derive(Debug, Default)]
pub struct FakeGateway {
    inner: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut g)
    }

    pub fn register(&self, name: &str, state: RunState) {
        self.with(|s| s.states.insert(name.to_string(), state));
    }

    /// After a stop request, answer `stop_pending` `n` times, then `stopped`.
    pub fn script_stop(&self, name: &str, n: u32) {
        self.with(|s| s.stop_script.insert(name.to_string(), Some(n)));
    }

    pub fn never_stop(&self, name: &str) {
        self.with(|s| s.stop_script.insert(name.to_string(), None));
    }

    /// After a start request, answer `start_pending` `n` times, then `running`.
    pub fn script_start(&self, name: &str, n: u32) {
        self.with(|s| s.start_script.insert(name.to_string(), Some(n)));
    }

    pub fn never_start(&self, name: &str) {
        self.with(|s| s.start_script.insert(name.to_string(), None));
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.with(|s| s.unreachable = unreachable);
    }

    pub fn fail_start(&self, name: &str) {
        self.with(|s| s.fail_start.insert(name.to_string()));
    }

    pub fn fail_stop(&self, name: &str) {
        self.with(|s| s.fail_stop.insert(name.to_string()));
    }

    pub fn fail_remove(&self, name: &str) {
        self.with(|s| s.fail_remove.insert(name.to_string()));
    }

    pub fn query_count(&self, name: &str) -> u32 {
        self.with(|s| s.queries.get(name).copied().unwrap_or(0))
    }

    pub fn stop_requests(&self, name: &str) -> u32 {
        self.with(|s| s.stop_requests.get(name).copied().unwrap_or(0))
    }

    /// `op:name` for every start/stop/remove request, in order.
    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn state(&self, name: &str) -> Option<RunState> {
        self.with(|s| s.states.get(name).copied())
    }

    fn check(s: &FakeState, name: &str) -> Result<(), GatewayError> {
        if s.unreachable {
            return Err(GatewayError::Unreachable("fake manager offline".to_string()));
        }
        if !s.states.contains_key(name) {
            return Err(GatewayError::NotFound(name.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceGateway for FakeGateway {
    async fn exists(&self, name: &str) -> Result<bool, GatewayError> {
        self.with(|s| {
            if s.unreachable {
                return Err(GatewayError::Unreachable("fake manager offline".to_string()));
            }
            Ok(s.states.contains_key(name))
        })
    }

    async fn start(&self, name: &str) -> Result<(), GatewayError> {
        self.with(|s| {
            Self::check(s, name)?;
            s.calls.push(format!("start:{name}"));
            if s.fail_start.contains(name) {
                return Err(GatewayError::Rejected {
                    op: "start",
                    service: name.to_string(),
                    message: "scripted failure".to_string(),
                });
            }
            match s.start_script.get(name).copied() {
                Some(remaining) => {
                    s.states.insert(name.to_string(), RunState::StartPending);
                    s.pending.insert(name.to_string(), remaining);
                }
                None => {
                    s.states.insert(name.to_string(), RunState::Running);
                }
            }
            Ok(())
        })
    }

    async fn request_stop(&self, name: &str) -> Result<(), GatewayError> {
        self.with(|s| {
            Self::check(s, name)?;
            s.calls.push(format!("stop:{name}"));
            *s.stop_requests.entry(name.to_string()).or_default() += 1;
            if s.fail_stop.contains(name) {
                return Err(GatewayError::Rejected {
                    op: "stop",
                    service: name.to_string(),
                    message: "scripted failure".to_string(),
                });
            }
            match s.stop_script.get(name).copied() {
                Some(remaining) => {
                    s.states.insert(name.to_string(), RunState::StopPending);
                    s.pending.insert(name.to_string(), remaining);
                }
                None => {
                    s.states.insert(name.to_string(), RunState::Stopped);
                }
            }
            Ok(())
        })
    }

    async fn remove(&self, name: &str) -> Result<(), GatewayError> {
        self.with(|s| {
            Self::check(s, name)?;
            s.calls.push(format!("remove:{name}"));
            if s.fail_remove.contains(name) {
                return Err(GatewayError::Rejected {
                    op: "remove",
                    service: name.to_string(),
                    message: "scripted failure".to_string(),
                });
            }
            s.states.remove(name);
            Ok(())
        })
    }

    async fn query_state(&self, name: &str) -> Result<RunState, GatewayError> {
        self.with(|s| {
            Self::check(s, name)?;
            *s.queries.entry(name.to_string()).or_default() += 1;
            let state = s.states[name];
            let settled = match state {
                RunState::StopPending => RunState::Stopped,
                RunState::StartPending => RunState::Running,
                other => return Ok(other),
            };
            match s.pending.get(name).copied() {
                Some(Some(0)) | None => {
                    s.pending.remove(name);
                    s.states.insert(name.to_string(), settled);
                    Ok(settled)
                }
                Some(Some(n)) => {
                    s.pending.insert(name.to_string(), Some(n - 1));
                    Ok(state)
                }
                Some(None) => Ok(state),
            }
        })
    }
}

// ---------------- FakeRunner ----------------

#[derive(Debug, Default)]
struct RunnerState {
    commands: Vec<String>,
    outputs: HashMap<String, CmdOutput>,
    launch_failures: HashSet<String>,
}

/// Records command lines; succeeds with empty output unless scripted otherwise.
#[derive(Debug, Default)]
pub struct FakeRunner {
    inner: Mutex<RunnerState>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, command: &str, exit_code: i32, stdout: &str, stderr: &str) {
        let mut g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        g.outputs.insert(
            command.to_string(),
            CmdOutput {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                exit_code,
            },
        );
    }

    pub fn fail_launch(&self, command: &str) {
        let mut g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        g.launch_failures.insert(command.to_string());
    }

    pub fn commands(&self) -> Vec<String> {
        let g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        g.commands.clone()
    }
}

#[async_trait]
impl CmdRunner for FakeRunner {
    async fn run(&self, program: &str, args: &[&str]) -> io::Result<CmdOutput> {
        let key = match args {
            ["-c", line] if program == "sh" => line.to_string(),
            _ if args.is_empty() => program.to_string(),
            _ => format!("{program} {}", args.join(" ")),
        };
        let mut g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        g.commands.push(key.clone());
        if g.launch_failures.contains(&key) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "scripted launch failure"));
        }
        Ok(g.outputs.get(&key).cloned().unwrap_or_default())
    }
}

// ---------------- SpanRecordingStore ----------------

/// One store call: method name and wall-clock span.
#[derive(Debug, Clone)]
pub struct StoreSpan {
    pub op: &'static str,
    pub start: Instant,
    pub end: Instant,
}

/// Wraps an [`FsJobStore`], holding every call open for `hold` and recording its span.
#[derive(Debug, Clone)]
pub struct SpanRecordingStore {
    inner: FsJobStore,
    hold: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    spans: Arc<Mutex<Vec<StoreSpan>>>,
}

impl SpanRecordingStore {
    pub fn new(inner: FsJobStore, hold: Duration) -> Self {
        Self {
            inner,
            hold,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            spans: Arc::new(Mutex::new(vec![])),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn spans(&self) -> Vec<StoreSpan> {
        self.spans.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn span<T>(&self, op: &'static str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.hold);
        let out = f();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let end = Instant::now();
        self.spans
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(StoreSpan { op, start, end });
        out
    }
}

impl JobStore for SpanRecordingStore {
    fn read_all(&self) -> Result<Vec<Job>, StoreError> {
        self.span("read_all", || self.inner.read_all())
    }

    fn read(&self, key: &JobKey) -> Result<Job, StoreError> {
        self.span("read", || self.inner.read(key))
    }

    fn read_index(&self) -> GlobalServiceIndex {
        self.span("read_index", || self.inner.read_index())
    }

    fn write(&mut self, job: &Job) -> Result<(), StoreError> {
        let mut inner = self.inner.clone();
        self.span("write", || inner.write(job))
    }

    fn write_index(&mut self, index: &GlobalServiceIndex) -> Result<(), StoreError> {
        let mut inner = self.inner.clone();
        self.span("write_index", || inner.write_index(index))
    }

    fn remove(&mut self, key: &JobKey) -> Result<(), StoreError> {
        let mut inner = self.inner.clone();
        self.span("remove", || inner.remove(key))
    }

    fn remove_all(&mut self) -> Result<(), StoreError> {
        let mut inner = self.inner.clone();
        self.span("remove_all", || inner.remove_all())
    }
}

// ---------------- Harness ----------------

/// Temp job directory + fakes wired into a supervisor.
pub struct Harness {
    pub dir: TempDir,
    pub store: FsJobStore,
    pub coordinator: Arc<JobCoordinator>,
    pub gateway: Arc<FakeGateway>,
    pub runner: Arc<FakeRunner>,
    pub supervisor: JobSupervisor,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_reload(ReloadOptions::default())
    }

    pub fn with_reload(reload: ReloadOptions) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsJobStore::new(dir.path().join("jobs"), dir.path().join("jobs.yml"));
        let coordinator = Arc::new(JobCoordinator::new(store.clone()));
        let gateway = Arc::new(FakeGateway::new());
        let runner = Arc::new(FakeRunner::new());
        let supervisor = JobSupervisor::new(
            Arc::clone(&coordinator),
            gateway.clone(),
            runner.clone(),
            StopWait {
                poll_interval: Duration::from_millis(300),
                deadline: Duration::from_secs(10),
            },
            reload,
        );
        Self {
            dir,
            store,
            coordinator,
            gateway,
            runner,
            supervisor,
        }
    }

    /// Write a source job definition and return its path.
    pub fn source(&self, file: &str, yaml: &str) -> PathBuf {
        let path = self.dir.path().join(file);
        std::fs::write(&path, yaml).expect("write source definition");
        path
    }

    /// AddJob a definition and register its services with the fake manager as stopped.
    pub async fn add(&self, name: &str, index: u32, yaml: &str) {
        let path = self.source(&format!("{name}-{index}.src.yml"), yaml);
        self.supervisor
            .add_job(name, index, &path)
            .await
            .expect("add_job");
        let job = self.store.read(&JobKey::new(name, index)).expect("read job");
        for svc in job.service_names() {
            self.gateway.register(svc, RunState::Stopped);
        }
    }
}
