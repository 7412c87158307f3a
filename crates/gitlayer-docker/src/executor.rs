use std::io;
use std::process::{Output, Stdio};

use tokio::process::Command;

use crate::docker::DockerError;

/// Runs `docker` subcommands.
///
/// [`RealExecutor`] spawns the CLI; tests substitute a mockall mock.
#[allow(async_fn_in_trait)]
pub trait DockerExecutor: Send + Sync {
    /// Run to completion and return stdout.
    async fn exec(&self, args: &[String]) -> Result<String, DockerError>;

    /// Run with stdout and stderr attached to the terminal (for `docker build`).
    async fn exec_streaming(&self, args: &[String]) -> Result<(), DockerError>;
}

/// Executor backed by the `docker` binary on `PATH`.
pub struct RealExecutor;

impl DockerExecutor for RealExecutor {
    async fn exec(&self, args: &[String]) -> Result<String, DockerError> {
        tracing::trace!(?args, "running docker");
        let Output {
            status,
            stdout,
            stderr,
        } = docker(args, Stdio::piped)
            .output()
            .await
            .map_err(spawn_error)?;

        if !status.success() {
            return Err(DockerError::CommandFailed {
                args: args.to_vec(),
                stderr: String::from_utf8_lossy(&stderr).trim_end().to_owned(),
            });
        }
        String::from_utf8(stdout).map_err(|e| DockerError::InvalidUtf8 { source: e })
    }

    async fn exec_streaming(&self, args: &[String]) -> Result<(), DockerError> {
        tracing::debug!(?args, "running docker");
        let status = docker(args, Stdio::inherit)
            .status()
            .await
            .map_err(spawn_error)?;

        if status.success() {
            Ok(())
        } else {
            Err(DockerError::CommandFailed {
                args: args.to_vec(),
                stderr: format!("exit code: {status}"),
            })
        }
    }
}

fn docker(args: &[String], output: fn() -> Stdio) -> Command {
    let mut cmd = Command::new("docker");
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(output())
        .stderr(output())
        .kill_on_drop(true);
    cmd
}

fn spawn_error(e: io::Error) -> DockerError {
    if e.kind() == io::ErrorKind::NotFound {
        DockerError::NotFound { source: e }
    } else {
        DockerError::Spawn { source: e }
    }
}
