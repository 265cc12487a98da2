use crate::jm::error::SupervisorError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

pub const JOB_FILE_EXTENSION: &str = "yml";

/// Declared supervision intent for a service. Independent of the OS run-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Monitored,
    NotMonitored,
    /// Any value this agent did not write (hand-edited records, newer agents).
    Unknown,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Monitored => "monitored",
            ServiceStatus::NotMonitored => "not_monitored",
            ServiceStatus::Unknown => "unknown",
        }
    }

    fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "monitored" => ServiceStatus::Monitored,
            "not_monitored" => ServiceStatus::NotMonitored,
            _ => ServiceStatus::Unknown,
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ServiceStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ServiceStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ServiceStatus::parse(&raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Host-unique OS service identifier.
    pub name: String,
    /// Command line run (to completion) before the service is started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_start: Option<String>,
    /// Command line run (to completion) before the service is stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_stop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ServiceStatus>,
}

impl Service {
    pub fn is_monitored(&self) -> bool {
        self.status == Some(ServiceStatus::Monitored)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_name: String,
    pub job_index: u32,
    #[serde(default)]
    pub services: Vec<Service>,
}

impl Job {
    pub fn key(&self) -> JobKey {
        JobKey::new(&self.job_name, self.job_index)
    }

    pub fn set_status(&mut self, status: ServiceStatus) {
        for svc in &mut self.services {
            svc.status = Some(status);
        }
    }

    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|s| s.name.as_str())
    }
}

/// Identity of a job record: `(name, index)`; also names its file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey {
    pub name: String,
    pub index: u32,
}

impl JobKey {
    pub fn new(name: &str, index: u32) -> Self {
        Self {
            name: name.to_string(),
            index,
        }
    }

    /// `0003_myjob.yml`
    pub fn file_name(&self) -> String {
        format!("{:04}_{}.{JOB_FILE_EXTENSION}", self.index, self.name)
    }

    pub fn parse_file_name(file_name: &str) -> Option<JobKey> {
        let stem = file_name.strip_suffix(&format!(".{JOB_FILE_EXTENSION}"))?;
        let (idx, name) = stem.split_once('_')?;
        if idx.len() < 4 || !idx.bytes().all(|b| b.is_ascii_digit()) || name.is_empty() {
            return None;
        }
        let key = JobKey {
            name: name.to_string(),
            index: idx.parse().ok()?,
        };
        // `00003_x.yml` would alias `0003_x.yml`.
        (key.file_name() == file_name).then_some(key)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.index)
    }
}

/// Flat, order-preserving list of every service name ever added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalServiceIndex {
    #[serde(default)]
    pub service_names: Vec<String>,
}

impl GlobalServiceIndex {
    pub fn contains(&self, name: &str) -> bool {
        self.service_names.iter().any(|n| n == name)
    }

    /// Returns false if the name was already indexed.
    pub fn append_unique(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.service_names.push(name.to_string());
        true
    }

    /// Drops every occurrence of `name`; returns whether anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.service_names.len();
        self.service_names.retain(|n| n != name);
        before != self.service_names.len()
    }
}

// ---------------- Source job definition (AddJob input; strict) ----------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct JobDefinitionFile {
    // Stamped over by AddJob; accepted so a persisted record can be re-added as-is.
    #[serde(default)]
    #[allow(dead_code)]
    job_name: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    job_index: Option<u32>,
    #[serde(default)]
    services: Vec<ServiceDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServiceDefinition {
    name: String,
    #[serde(default)]
    pre_start: Option<String>,
    #[serde(default)]
    pre_stop: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    status: Option<ServiceStatus>,
}

pub fn validate_job_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("job name must not be empty".to_string());
    }
    if name.trim() != name {
        return Err(format!("job name must not have leading/trailing whitespace: {name:?}"));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(format!("job name must not contain path separators: {name:?}"));
    }
    Ok(())
}

fn validate_service_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("service name must not be empty".to_string());
    }
    if name.trim() != name {
        return Err(format!(
            "service name must not have leading/trailing whitespace: {name:?}"
        ));
    }
    if name.contains(['/', '\\']) || name.chars().any(char::is_whitespace) {
        return Err(format!(
            "service name must not contain whitespace or path separators: {name:?}"
        ));
    }
    if name.starts_with('-') {
        return Err(format!("service name must not start with '-': {name:?}"));
    }
    Ok(())
}

fn non_blank(cmd: Option<String>) -> Option<String> {
    cmd.map(|c| c.trim().to_string()).filter(|c| !c.is_empty())
}

/// Parse a job definition document into a job stamped with `job_name`/`job_index`,
/// every service defaulted to `monitored`.
pub fn parse_job_definition_yaml(
    raw: &str,
    source_file: &Path,
    job_name: &str,
    job_index: u32,
) -> Result<Job, SupervisorError> {
    let invalid = |reason: String| SupervisorError::Definition {
        path: source_file.to_path_buf(),
        reason,
    };
    validate_job_name(job_name).map_err(invalid)?;
    let file: JobDefinitionFile =
        serde_yaml::from_str(raw).map_err(|e| invalid(format!("parse error: {e}")))?;

    let mut seen: HashSet<&str> = HashSet::new();
    for svc in &file.services {
        validate_service_name(&svc.name).map_err(invalid)?;
        if !seen.insert(svc.name.as_str()) {
            return Err(invalid(format!("duplicate service name {:?}", svc.name)));
        }
    }

    let services = file
        .services
        .into_iter()
        .map(|svc| Service {
            name: svc.name,
            pre_start: non_blank(svc.pre_start),
            pre_stop: non_blank(svc.pre_stop),
            status: Some(ServiceStatus::Monitored),
        })
        .collect();

    Ok(Job {
        job_name: job_name.to_string(),
        job_index,
        services,
    })
}
