use crate::jm::gateway::StopWait;
use crate::jm::reconciler::DEFAULT_RECONCILE_INTERVAL;
use crate::jm::supervisor::ReloadOptions;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resolved agent configuration: defaults applied, relative paths anchored at the
/// config file's directory.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub jobs_directory: PathBuf,
    pub index_path: PathBuf,
    pub reconcile_interval: Duration,
    pub stop: StopWait,
    pub reload: ReloadOptions,
    pub sock: PathBuf,
    pub log_file: Option<PathBuf>,
    pub log_level: String,
    pub service_backend: ServiceBackend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceBackend {
    #[default]
    Systemd,
    /// No OS service manager; state follows requests in memory.
    Noop,
}

// -------- YAML file schema (grouped only; strict) --------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct AgentConfigFile {
    #[serde(default)]
    jobs: Option<JobsConfigFile>,
    #[serde(default)]
    reconcile: Option<ReconcileConfigFile>,
    #[serde(default)]
    stop: Option<StopConfigFile>,
    #[serde(default)]
    reload: Option<ReloadConfigFile>,
    #[serde(default)]
    unix_socket: Option<UnixSocketConfigFile>,
    #[serde(default)]
    logging: Option<LoggingConfigFile>,
    #[serde(default)]
    service_backend: ServiceBackend,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct JobsConfigFile {
    #[serde(default = "default_jobs_directory")]
    directory: PathBuf,
    #[serde(default = "default_index_path")]
    index_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReconcileConfigFile {
    #[serde(default = "default_reconcile_interval_ms", deserialize_with = "deserialize_duration_ms")]
    interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct StopConfigFile {
    #[serde(default = "default_stop_poll_ms", deserialize_with = "deserialize_duration_ms")]
    poll_interval: u64,
    #[serde(default = "default_stop_deadline_ms", deserialize_with = "deserialize_duration_ms")]
    deadline: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReloadConfigFile {
    #[serde(default = "default_max_tries")]
    max_tries: u32,
    #[serde(default = "default_max_check_tries")]
    max_check_tries: u32,
    #[serde(default = "default_check_delay_ms", deserialize_with = "deserialize_duration_ms")]
    delay_between_check_tries: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct UnixSocketConfigFile {
    #[serde(default = "default_sock")]
    path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingConfigFile {
    #[serde(default)]
    file: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    level: String,
}

fn default_jobs_directory() -> PathBuf {
    "jobs.d".into()
}
fn default_index_path() -> PathBuf {
    "jobs.yml".into()
}
fn default_reconcile_interval_ms() -> u64 {
    DEFAULT_RECONCILE_INTERVAL.as_millis() as u64
}
fn default_stop_poll_ms() -> u64 {
    StopWait::default().poll_interval.as_millis() as u64
}
fn default_stop_deadline_ms() -> u64 {
    StopWait::default().deadline.as_millis() as u64
}
fn default_max_tries() -> u32 {
    ReloadOptions::default().max_tries
}
fn default_max_check_tries() -> u32 {
    ReloadOptions::default().max_check_tries
}
fn default_check_delay_ms() -> u64 {
    ReloadOptions::default().delay_between_check_tries.as_millis() as u64
}
fn default_sock() -> PathBuf {
    "/tmp/jobmaster.sock".into()
}
fn default_log_level() -> String {
    "info".to_string()
}

fn deserialize_duration_ms<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;
    let v = serde_yaml::Value::deserialize(deserializer)?;
    match v {
        serde_yaml::Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| D::Error::custom("duration must be a positive integer (ms)")),
        serde_yaml::Value::String(s) => parse_duration_str(&s).map_err(D::Error::custom),
        _ => Err(D::Error::custom(
            "duration must be an integer milliseconds or string like \"10s\"",
        )),
    }
}

/// `500ms`, `10s`, `1.5m`, `2h` to milliseconds.
pub fn parse_duration_str(s: &str) -> Result<u64, String> {
    let t = s.trim();
    let split = t
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .ok_or_else(|| format!("duration {s:?} has no unit (use ms/s/m/h)"))?;
    if split == 0 {
        return Err(format!("invalid duration: {s:?}"));
    }
    let (num_s, unit_s) = t.split_at(split);
    let num: f64 = num_s
        .parse()
        .map_err(|e| format!("invalid duration number {num_s:?}: {e}"))?;
    let mult: f64 = match unit_s.trim().to_ascii_lowercase().as_str() {
        "ms" => 1.0,
        "s" => 1000.0,
        "m" => 60_000.0,
        "h" => 3_600_000.0,
        _ => return Err(format!("unknown duration unit {unit_s:?} (use ms/s/m/h)")),
    };
    Ok((num * mult).round() as u64)
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            jobs_directory: default_jobs_directory(),
            index_path: default_index_path(),
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            stop: StopWait::default(),
            reload: ReloadOptions::default(),
            sock: default_sock(),
            log_file: None,
            log_level: default_log_level(),
            service_backend: ServiceBackend::default(),
        }
    }
}

pub fn load_agent_config(config_path: &Path) -> anyhow::Result<AgentConfig> {
    let raw = std::fs::read_to_string(config_path)
        .with_context(|| format!("failed to read config {}", config_path.display()))?;
    parse_agent_config(&raw, config_path)
}

/// Parse config text; `config_path` anchors relative paths and names errors.
pub fn parse_agent_config(raw: &str, config_path: &Path) -> anyhow::Result<AgentConfig> {
    let file_cfg: Option<AgentConfigFile> = serde_yaml::from_str(raw)
        .with_context(|| format!("failed to parse config {}", config_path.display()))?;
    let Some(file_cfg) = file_cfg else {
        anyhow::bail!("config {} is empty", config_path.display());
    };

    let mut cfg = AgentConfig {
        service_backend: file_cfg.service_backend,
        ..AgentConfig::default()
    };
    if let Some(jobs) = file_cfg.jobs {
        cfg.jobs_directory = jobs.directory;
        cfg.index_path = jobs.index_path;
    }
    if let Some(rc) = file_cfg.reconcile {
        anyhow::ensure!(rc.interval > 0, "reconcile.interval must be > 0");
        cfg.reconcile_interval = Duration::from_millis(rc.interval);
    }
    if let Some(st) = file_cfg.stop {
        anyhow::ensure!(st.poll_interval > 0, "stop.poll_interval must be > 0");
        cfg.stop = StopWait {
            poll_interval: Duration::from_millis(st.poll_interval),
            deadline: Duration::from_millis(st.deadline),
        };
    }
    if let Some(rl) = file_cfg.reload {
        anyhow::ensure!(rl.max_tries >= 1, "reload.max_tries must be >= 1");
        anyhow::ensure!(rl.max_check_tries >= 1, "reload.max_check_tries must be >= 1");
        cfg.reload = ReloadOptions {
            max_tries: rl.max_tries,
            max_check_tries: rl.max_check_tries,
            delay_between_check_tries: Duration::from_millis(rl.delay_between_check_tries),
        };
    }
    if let Some(us) = file_cfg.unix_socket {
        cfg.sock = us.path;
    }
    if let Some(lg) = file_cfg.logging {
        anyhow::ensure!(!lg.level.trim().is_empty(), "logging.level must not be empty");
        cfg.log_file = lg.file;
        cfg.log_level = lg.level.trim().to_string();
    }

    // Resolve relative paths against the config file directory.
    let base = config_path.parent().unwrap_or_else(|| Path::new("."));
    for p in [&mut cfg.jobs_directory, &mut cfg.index_path, &mut cfg.sock] {
        if p.is_relative() {
            *p = base.join(&*p);
        }
    }
    if let Some(p) = cfg.log_file.as_mut() {
        if p.is_relative() {
            *p = base.join(&*p);
        }
    }
    Ok(cfg)
}
