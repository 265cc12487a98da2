use crate::jm::cli;
use clap::Parser;
use std::path::PathBuf;
use std::{env, fmt};

#[derive(Debug, Parser)]
#[command(name = "jmctl", version, about = "jobmaster control client")]
pub struct JmctlArgs {
    /// Unix socket path to the jobmaster daemon
    #[arg(short = 's', long = "sock")]
    pub sock: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Option<cli::Cmd>,
}

fn resolve_sock(sock: Option<PathBuf>, env_value: Option<String>) -> anyhow::Result<PathBuf> {
    if let Some(sock) = sock {
        return Ok(sock);
    }
    if let Some(v) = env_value {
        let t = v.trim();
        if !t.is_empty() {
            return Ok(PathBuf::from(t));
        }
    }
    anyhow::bail!("{}", MissingSockHelp);
}

struct MissingSockHelp;

impl fmt::Display for MissingSockHelp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "no jobmaster socket specified")?;
        writeln!(f)?;
        writeln!(f, "jmctl does not read the jobmaster config file.")?;
        writeln!(f, "Provide the daemon unix socket path via one of:")?;
        writeln!(f, "  - jmctl --sock /path/to/jobmaster.sock <command>")?;
        writeln!(f, "  - export JMCTL_SOCK=/path/to/jobmaster.sock")?;
        writeln!(f)?;
        writeln!(f, "Example:")?;
        writeln!(f, "  jmctl --sock /tmp/jobmaster.sock jobs")?;
        Ok(())
    }
}

/// `jmctl` with no subcommand prints the aggregate status.
pub fn run() -> anyhow::Result<()> {
    let args = JmctlArgs::parse();
    let sock = resolve_sock(args.sock, env::var("JMCTL_SOCK").ok())?;
    let cmd = args.cmd.unwrap_or(cli::Cmd::Status {
        format: cli::OutputFormat::Text,
    });
    cli::execute(&sock, cmd)
}
