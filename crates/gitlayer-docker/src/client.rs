use std::fmt;
use std::path::Path;

use crate::docker::DockerError;
use crate::executor::{DockerExecutor, RealExecutor};

/// Docker operations client, parameterized over the executor for testability.
pub struct DockerClient<E: DockerExecutor = RealExecutor> {
    executor: E,
}

impl DockerClient<RealExecutor> {
    pub fn new() -> Self {
        Self {
            executor: RealExecutor,
        }
    }
}

impl Default for DockerClient<RealExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: DockerExecutor> DockerClient<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    // ── Doctor ──

    /// Run the docker checks without early return.
    ///
    /// `git` and `config_file` are left failed for the caller to fill in.
    pub async fn doctor(&self) -> DoctorReport {
        let mut report = DoctorReport::default();

        // 1. docker CLI
        match self
            .executor
            .exec(&args(["version", "--format", "{{.Client.Version}}"]))
            .await
        {
            Ok(v) => report.docker = CheckResult::ok(v.trim()),
            Err(e @ (DockerError::NotFound { .. } | DockerError::Spawn { .. })) => {
                report.docker = CheckResult::fail(&e.to_string());
                report.daemon = CheckResult::fail("skipped: docker CLI unavailable");
                return report;
            }
            // the client prints its version even when the daemon is down
            Err(DockerError::CommandFailed { .. }) | Err(DockerError::InvalidUtf8 { .. }) => {
                report.docker = CheckResult::ok("installed");
            }
        }

        // 2. Daemon reachable
        match self
            .executor
            .exec(&args(["info", "--format", "{{.ServerVersion}}"]))
            .await
        {
            Ok(v) if !v.trim().is_empty() => {
                report.daemon = CheckResult::ok(&format!("server {}", v.trim()));
            }
            Ok(_) => report.daemon = CheckResult::fail("daemon reported no version"),
            Err(e) => report.daemon = CheckResult::fail(&first_line(&e.to_string())),
        }

        report
    }

    // ── Image Build ──

    /// `docker build` the context directory, streaming engine output.
    pub async fn build_image(&self, context_dir: &Path, tag: &str) -> Result<(), BuildError> {
        let context = context_dir
            .to_str()
            .ok_or_else(|| BuildError::InvalidPath(context_dir.to_path_buf()))?;

        tracing::info!(context, tag, "building image");
        self.executor
            .exec_streaming(&args(["build", "--tag", tag, context]))
            .await
            .map_err(|e| BuildError::Build { source: e })
    }

    /// Content id of a local image.
    pub async fn image_id(&self, tag: &str) -> Result<String, InspectError> {
        let id = self
            .executor
            .exec(&args(["image", "inspect", "--format", "{{.Id}}", tag]))
            .await
            .map_err(|e| InspectError::Inspect {
                tag: tag.to_owned(),
                source: e,
            })?;
        Ok(id.trim().to_owned())
    }
}

fn args<const N: usize>(a: [&str; N]) -> Vec<String> {
    a.iter().map(|s| (*s).to_owned()).collect()
}

fn first_line(s: &str) -> String {
    s.lines().next().unwrap_or(s).to_owned()
}

// ── Report types ──

#[derive(Debug, Default)]
pub struct DoctorReport {
    pub docker: CheckResult,
    pub daemon: CheckResult,
    pub git: CheckResult,
    pub config_file: CheckResult,
}

impl DoctorReport {
    pub fn all_passed(&self) -> bool {
        self.docker.passed && self.daemon.passed && self.git.passed && self.config_file.passed
    }
}

impl fmt::Display for DoctorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = [
            ("docker CLI", &self.docker),
            ("docker daemon", &self.daemon),
            ("git", &self.git),
            ("gitlayer.toml", &self.config_file),
        ];
        writeln!(f, "gitlayer doctor")?;
        writeln!(f, "---------------")?;
        for (name, result) in rows {
            writeln!(f, "{name:<15} {:<4} {}", result.icon(), result.detail)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    pub fn ok(detail: &str) -> Self {
        Self {
            passed: true,
            detail: detail.to_owned(),
        }
    }

    pub fn fail(detail: &str) -> Self {
        Self {
            passed: false,
            detail: detail.to_owned(),
        }
    }

    pub fn icon(&self) -> &'static str {
        if self.passed { "OK" } else { "NG" }
    }
}

// ── Error types ──

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("build context path is not valid UTF-8: {0}")]
    InvalidPath(std::path::PathBuf),

    #[error("docker build failed")]
    Build { source: DockerError },
}

#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("failed to inspect image {tag}")]
    Inspect { tag: String, source: DockerError },
}
