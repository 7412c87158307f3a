mod build;
mod doctor;
mod flush;
mod init;
mod materialize;
mod status;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use gitlayer_build::{CacheDir, GitRepo};
use gitlayer_core::{ArtifactEntry, ArtifactIdentity, GitlayerConfig, ensure_distinct};

/// Name of the configuration file at the project root.
pub(crate) const CONFIG_FILE: &str = "gitlayer.toml";

pub use build::build;
pub use doctor::doctor;
pub use flush::flush;
pub use init::init_project;
pub use materialize::materialize;
pub use status::status;

/// Load and validate gitlayer.toml from the current directory.
fn load_project() -> anyhow::Result<(PathBuf, GitlayerConfig)> {
    let project_dir = PathBuf::from(".");
    let config = GitlayerConfig::load(&project_dir)?;
    config.validate()?;
    if config.artifacts.is_empty() {
        anyhow::bail!("no [[artifact]] entries in {CONFIG_FILE} — run `gitlayer init` to start one");
    }
    Ok((project_dir, config))
}

fn cache_dir(project_dir: &Path, config: &GitlayerConfig) -> CacheDir {
    CacheDir::new(project_dir.join(&config.project.cache_dir))
        .with_lock_timeout(Duration::from_secs(config.project.lock_timeout_secs))
}

/// Resolve every artifact's repository and identity, in config order.
///
/// Fails when two entries reach one cache key, e.g. the same repository
/// through two paths.
fn resolve_artifacts(
    project_dir: &Path,
    config: &GitlayerConfig,
) -> anyhow::Result<Vec<(GitRepo, ArtifactIdentity)>> {
    let resolved = config
        .artifacts
        .iter()
        .map(|entry| open_repo(project_dir, entry))
        .collect::<anyhow::Result<Vec<_>>>()?;
    ensure_distinct(resolved.iter().map(|(_, identity)| identity))?;
    Ok(resolved)
}

/// Resolve an artifact's repository and the identity its cache files use.
fn open_repo(project_dir: &Path, entry: &ArtifactEntry) -> anyhow::Result<(GitRepo, ArtifactIdentity)> {
    let path = project_dir.join(&entry.repo);
    let repo = GitRepo::open(&path)
        .with_context(|| format!("failed to open git repository at {}", path.display()))?;
    let identity = entry.identity(repo.name())?;
    Ok((repo, identity))
}
