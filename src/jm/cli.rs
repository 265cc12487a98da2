use crate::jm::{config, daemon, rpc};
use clap::ValueEnum;
use clap::{Parser, Subcommand};
use nix::unistd::geteuid;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "jobmaster", version, about = "on-host job supervisor")]
pub struct Args {
    /// Path to agent config YAML
    #[arg(short = 'c', long = "config", default_value = "config.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub cmd: Option<Cmd>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Cmd {
    /// Run pre-start hooks and start every service
    Start,
    /// Run pre-stop hooks and stop every service (waits for stopped)
    Stop,
    /// Stop all, pre-start all, start all (with retries)
    Reload,
    /// Mark every service not_monitored (services keep running)
    Unmonitor,
    /// Aggregate status: running, failing or unknown
    Status {
        /// Output format: text (default) or json
        #[arg(long = "format", default_value = "text")]
        format: OutputFormat,
    },
    /// Add a job from a definition file (path as seen by the daemon)
    AddJob {
        job_name: String,
        job_index: u32,
        config_path: PathBuf,
    },
    /// Stop one job's services and delete its record
    RemoveJob { job_name: String, job_index: u32 },
    /// Stop everything and delete all job records
    RemoveAllJobs,
    /// List job records
    Jobs {
        /// Output format: text (default) or json
        #[arg(long = "format", default_value = "text")]
        format: OutputFormat,
    },
    /// Report a service failure to the daemon's failure monitor
    Alert { service: String, description: String },
    /// Show the daemon's version and build info
    ServerVersion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cmd {
    pub fn into_request(self) -> (rpc::Request, OutputFormat) {
        use rpc::Request as R;
        let text = OutputFormat::Text;
        match self {
            Cmd::Start => (R::Start, text),
            Cmd::Stop => (R::Stop, text),
            Cmd::Reload => (R::Reload, text),
            Cmd::Unmonitor => (R::Unmonitor, text),
            Cmd::Status { format } => (R::Status, format),
            Cmd::AddJob {
                job_name,
                job_index,
                config_path,
            } => (
                R::AddJob {
                    job_name,
                    job_index,
                    config_path: absolute(config_path),
                },
                text,
            ),
            Cmd::RemoveJob {
                job_name,
                job_index,
            } => (
                R::RemoveJob {
                    job_name,
                    job_index,
                },
                text,
            ),
            Cmd::RemoveAllJobs => (R::RemoveAllJobs, text),
            Cmd::Jobs { format } => (R::Jobs, format),
            Cmd::Alert {
                service,
                description,
            } => (
                R::Alert {
                    service,
                    description,
                },
                text,
            ),
            Cmd::ServerVersion => (R::ServerVersion, text),
        }
    }
}

/// The daemon may run with another working directory.
fn absolute(p: PathBuf) -> PathBuf {
    if p.is_absolute() {
        return p;
    }
    std::env::current_dir().map(|cwd| cwd.join(&p)).unwrap_or(p)
}

/// Send one command to the daemon and print the response.
pub fn execute(sock: &Path, cmd: Cmd) -> anyhow::Result<()> {
    let (req, format) = cmd.into_request();
    let resp = rpc::client_call(sock, req)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&resp)?),
        OutputFormat::Text => {
            let text = resp.render_text();
            if !text.trim().is_empty() {
                println!("{}", text.trim_end());
            }
        }
    }
    Ok(())
}

/// No subcommand runs the daemon; a subcommand talks to the daemon at the configured socket.
pub fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = config::load_agent_config(&args.config)?;

    match args.cmd {
        None => {
            // Hooks and systemctl need root.
            if !geteuid().is_root() {
                anyhow::bail!("jobmaster daemon is not running as root; please start it as root");
            }
            daemon::run_daemon(&cfg)
        }
        Some(cmd) => execute(&cfg.sock, cmd),
    }
}
