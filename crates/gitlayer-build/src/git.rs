//! [`SourceRepo`] backed by the `git` CLI.

use std::path::{Path, PathBuf};
use std::process::Command;

use gitlayer_core::{PathFilter, SourceError, SourceRepo};

/// A local git repository, addressed through the `git` binary.
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
    name: String,
}

impl GitRepo {
    /// Open the repository containing `path`.
    ///
    /// The repository name defaults to the directory name of its top level.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let output = run_git(path, &args(["rev-parse", "--show-toplevel"]))?;
        let root = PathBuf::from(String::from_utf8_lossy(&output).trim());
        let name = root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("repo")
            .to_owned();

        tracing::debug!(root = %root.display(), name = %name, "opened git repository");
        Ok(Self { root, name })
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_owned();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn git(&self, args: &[String]) -> Result<Vec<u8>, SourceError> {
        run_git(&self.root, args)
    }
}

impl SourceRepo for GitRepo {
    fn latest_commit(&self, branch: &str) -> Result<String, SourceError> {
        let rev = format!("{branch}^{{commit}}");
        match self.git(&args(["rev-parse", "--verify", "--quiet", &rev])) {
            Ok(out) => Ok(String::from_utf8_lossy(&out).trim().to_owned()),
            Err(SourceError::Failed { .. }) => Err(SourceError::UnknownRevision {
                reference: branch.to_owned(),
            }),
            Err(e) => Err(e),
        }
    }

    fn diff(&self, from: &str, to: &str, filter: &PathFilter) -> Result<Vec<u8>, SourceError> {
        let mut cmd = args([
            "diff",
            "--binary",
            "--full-index",
            "--no-color",
            "--no-ext-diff",
            "--no-textconv",
            "--no-renames",
            "--src-prefix=a/",
            "--dst-prefix=b/",
        ]);
        if let Some(cwd) = filter.cwd() {
            cmd.push(format!("--relative={cwd}/"));
        }
        cmd.push(from.to_owned());
        cmd.push(to.to_owned());
        cmd.push("--".to_owned());
        cmd.extend(filter.pathspecs());

        self.git(&cmd)
    }

    fn archive(&self, reference: &str, filter: &PathFilter) -> Result<Vec<u8>, SourceError> {
        let tree = match filter.cwd() {
            Some(cwd) => format!("{reference}:{cwd}"),
            None => reference.to_owned(),
        };
        self.git(&args(["archive", "--format=tar", &tree]))
    }
}

/// Version string of the installed git, e.g. `git version 2.43.0`.
pub fn git_version() -> Result<String, SourceError> {
    let out = run_git(Path::new("."), &args(["--version"]))?;
    Ok(String::from_utf8_lossy(&out).trim().to_owned())
}

fn run_git(dir: &Path, args: &[String]) -> Result<Vec<u8>, SourceError> {
    tracing::trace!(dir = %dir.display(), ?args, "running git");

    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| SourceError::Spawn {
            detail: format!("failed to execute git {}", args.first().map_or("", String::as_str)),
            source: e,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SourceError::Failed {
            args: args.to_vec(),
            stderr: format!("exited with {}: {}", output.status, stderr.trim()),
        });
    }

    Ok(output.stdout)
}

fn args<const N: usize>(a: [&str; N]) -> Vec<String> {
    a.iter().map(|s| (*s).to_owned()).collect()
}
