use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use tokio::process::Command;

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; -1 when the process was terminated by a signal.
    pub exit_code: i32,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external commands to completion. `Err` means the process could not be launched.
#[async_trait]
pub trait CmdRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str]) -> io::Result<CmdOutput>;

    /// Run a hook-style command line through the shell.
    async fn run_command_line(&self, command_line: &str) -> io::Result<CmdOutput> {
        self.run("sh", &["-c", command_line]).await
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

#[async_trait]
impl CmdRunner for ShellRunner {
    async fn run(&self, program: &str, args: &[&str]) -> io::Result<CmdOutput> {
        let out = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(CmdOutput {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            exit_code: out.status.code().unwrap_or(-1),
        })
    }
}
