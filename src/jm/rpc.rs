use crate::jm::job::Job;
use crate::jm::supervisor::JobsStatus;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

/// One JSON line from `jmctl` to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Request {
    Start,
    Stop,
    Reload,
    Unmonitor,
    Status,
    AddJob {
        job_name: String,
        job_index: u32,
        /// Path of the job definition, as seen by the daemon.
        config_path: PathBuf,
    },
    RemoveJob { job_name: String, job_index: u32 },
    RemoveAllJobs,
    Jobs,
    /// Inject a failure notification, as an alert transport would.
    Alert { service: String, description: String },
    ServerVersion,
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Start => "start",
            Request::Stop => "stop",
            Request::Reload => "reload",
            Request::Unmonitor => "unmonitor",
            Request::Status => "status",
            Request::AddJob { .. } => "add_job",
            Request::RemoveJob { .. } => "remove_job",
            Request::RemoveAllJobs => "remove_all_jobs",
            Request::Jobs => "jobs",
            Request::Alert { .. } => "alert",
            Request::ServerVersion => "server_version",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobsStatus>,
    #[serde(default)]
    pub jobs: Vec<Job>,
}

impl Response {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            status: None,
            jobs: vec![],
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            ..Self::ok(message)
        }
    }

    pub fn render_text(&self) -> String {
        if let Some(status) = self.status {
            return status.to_string();
        }
        if !self.message.is_empty() && self.jobs.is_empty() {
            return self.message.clone();
        }
        if self.jobs.is_empty() {
            return "(no jobs)".to_string();
        }

        let headers = ["job", "index", "service", "status", "pre_start", "pre_stop"];
        let mut rows: Vec<[String; 6]> = vec![];
        for job in &self.jobs {
            if job.services.is_empty() {
                rows.push([
                    job.job_name.clone(),
                    job.job_index.to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                ]);
                continue;
            }
            for svc in &job.services {
                rows.push([
                    job.job_name.clone(),
                    job.job_index.to_string(),
                    svc.name.clone(),
                    svc.status.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
                    svc.pre_start.clone().unwrap_or_else(|| "-".to_string()),
                    svc.pre_stop.clone().unwrap_or_else(|| "-".to_string()),
                ]);
            }
        }

        // Column widths from headers + all rows (no fixed spacing).
        let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
        for r in &rows {
            for (i, c) in r.iter().enumerate() {
                widths[i] = widths[i].max(c.chars().count());
            }
        }
        let border = {
            let mut out = String::from("+");
            for w in &widths {
                out.push_str(&"-".repeat(w + 2));
                out.push('+');
            }
            out
        };
        fn line<'a>(cols: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
            let mut out = String::from("|");
            for (c, w) in cols.zip(widths.iter().copied()) {
                out.push_str(&format!(" {c:<w$} |"));
            }
            out
        }

        let mut out = String::new();
        out.push_str(&border);
        out.push('\n');
        out.push_str(&line(headers.iter().copied(), &widths));
        out.push('\n');
        out.push_str(&border);
        out.push('\n');
        for r in &rows {
            out.push_str(&line(r.iter().map(String::as_str), &widths));
            out.push('\n');
        }
        out.push_str(&border);
        out.push('\n');
        out
    }
}

/// Send one request and read one response line. A `!ok` response becomes an error.
pub fn client_call(sock: &Path, req: Request) -> anyhow::Result<Response> {
    let mut stream = UnixStream::connect(sock).map_err(|e| {
        anyhow::anyhow!(
            "failed to connect to jobmaster socket {}: {e}",
            sock.display()
        )
    })?;

    let line = serde_json::to_string(&req)? + "\n";
    stream.write_all(line.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut resp_line = String::new();
    reader.read_line(&mut resp_line)?;
    if resp_line.trim().is_empty() {
        anyhow::bail!("empty response from daemon");
    }
    let resp: Response = serde_json::from_str(resp_line.trim_end())?;
    if !resp.ok {
        anyhow::bail!("{}", resp.message);
    }
    Ok(resp)
}
