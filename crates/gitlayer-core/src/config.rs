use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::identity::ArtifactIdentity;
use crate::source::PathFilter;

/// gitlayer.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitlayerConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub image: ImageConfig,
    /// Tracked artifacts, one `[[artifact]]` table each
    #[serde(default, rename = "artifact")]
    pub artifacts: Vec<ArtifactEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Directory holding snapshots, patches, and checkpoint records
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Directory the Dockerfile and copied payloads are written to
    #[serde(default = "default_context_dir")]
    pub context_dir: PathBuf,
    /// How long to wait for another process holding an artifact lock
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Base image the artifacts are layered onto
    #[serde(default = "default_base_image")]
    pub base_image: String,
    /// Tag for `gitlayer build`
    #[serde(default = "default_tag")]
    pub tag: String,
}

/// One `[[artifact]]` entry: where the source comes from plus its
/// [`ArtifactConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// Path to the git repository, relative to the project directory
    #[serde(default = "default_repo")]
    pub repo: PathBuf,
    /// Optional artifact name, distinguishes several artifacts of one repository
    pub name: Option<String>,
    /// Branch whose latest commit is shipped
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(flatten)]
    pub config: ArtifactConfig,
}

/// Per-artifact options. Immutable for the duration of one invocation.
///
/// `target`, `cwd`, `paths`, `owner`, and `group` are covered by the
/// [`ConfigFingerprint`](crate::ConfigFingerprint); changing any of them
/// invalidates every cached payload of the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Absolute path inside the image the tree is materialized at
    pub target: String,
    /// Subdirectory of the repository to ship instead of its root
    #[serde(default)]
    pub cwd: Option<String>,
    /// Glob patterns (relative to `cwd`) restricting what is shipped
    #[serde(default)]
    pub paths: Vec<String>,
    /// Owning user for shipped files, name or numeric id
    #[serde(default)]
    pub owner: Option<String>,
    /// Owning group for shipped files, name or numeric id
    #[serde(default)]
    pub group: Option<String>,
    /// Minimum time between two layer checkpoints
    #[serde(
        default = "default_interlayer_period",
        rename = "interlayer_period_secs",
        with = "duration_secs"
    )]
    pub interlayer_period: Duration,
    /// Discard all cached state when the artifact is opened
    #[serde(default)]
    pub flush_cache: bool,
}

impl ArtifactConfig {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_owned(),
            cwd: None,
            paths: Vec::new(),
            owner: None,
            group: None,
            interlayer_period: default_interlayer_period(),
            flush_cache: false,
        }
    }

    /// The source filter this configuration selects.
    pub fn filter(&self) -> PathFilter {
        PathFilter::new(self.cwd.clone(), self.paths.clone())
    }

    /// Check every option before any state is touched.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTarget`](crate::Error::InvalidTarget) for a relative
    ///   target or one with characters unsafe in a shell command
    /// - [`Error::InvalidAccount`](crate::Error::InvalidAccount) for a
    ///   malformed owner or group
    /// - [`Error::InvalidFilter`](crate::Error::InvalidFilter) for a bad
    ///   `cwd` or path pattern
    pub fn validate(&self) -> crate::Result<()> {
        validate_target(&self.target)?;
        if let Some(owner) = &self.owner {
            validate_account("owner", owner)?;
        }
        if let Some(group) = &self.group {
            validate_account("group", group)?;
        }
        self.filter().validate()
    }
}

impl GitlayerConfig {
    /// Load from gitlayer.toml at the given path, or return defaults if not found.
    pub fn load(project_dir: &Path) -> crate::Result<Self> {
        let config_path = project_dir.join("gitlayer.toml");
        if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).map_err(|e| crate::Error::ConfigLoad {
                    path: config_path.clone(),
                    source: e,
                })?;
            tracing::debug!(path = %config_path.display(), "loading config");
            toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
                path: config_path,
                source: e,
            })
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Validate every artifact entry.
    ///
    /// Keys depend on the resolved repository name, so uniqueness is checked
    /// with [`ensure_distinct`] once the repositories are opened.
    pub fn validate(&self) -> crate::Result<()> {
        for entry in &self.artifacts {
            entry.config.validate()?;
            entry.identity(&entry.repo_name())?;
        }
        Ok(())
    }
}

/// Reject two artifacts sharing one cache key.
///
/// Two entries naming one repository through different paths resolve to the
/// same key and would purge each other's cache on every run.
pub fn ensure_distinct<'a>(
    identities: impl IntoIterator<Item = &'a ArtifactIdentity>,
) -> crate::Result<()> {
    let mut seen = std::collections::HashSet::new();
    for identity in identities {
        let key = identity.key();
        if !seen.insert(key.clone()) {
            return Err(crate::Error::DuplicateArtifact { key });
        }
    }
    Ok(())
}

impl ArtifactEntry {
    /// Repository name used in the identity: the last component of `repo`.
    ///
    /// Callers that resolved the repository top level should prefer its
    /// directory name; this is the fallback for unresolved paths such as `.`.
    pub fn repo_name(&self) -> String {
        self.repo
            .components()
            .filter_map(|c| match c {
                std::path::Component::Normal(name) => name.to_str(),
                _ => None,
            })
            .next_back()
            .unwrap_or("repo")
            .to_owned()
    }

    pub fn identity(&self, repo_name: &str) -> crate::Result<ArtifactIdentity> {
        ArtifactIdentity::new(repo_name, self.name.as_deref(), &self.branch)
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            context_dir: default_context_dir(),
            lock_timeout_secs: default_lock_timeout_secs(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            base_image: default_base_image(),
            tag: default_tag(),
        }
    }
}

fn validate_target(target: &str) -> crate::Result<()> {
    let reason = if !target.starts_with('/') {
        "must be an absolute path"
    } else if !target
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'/' | b'.' | b'_' | b'-'))
    {
        "only [A-Za-z0-9/._-] are allowed"
    } else if target.split('/').any(|c| c == "..") {
        "must not contain '..'"
    } else {
        return Ok(());
    };
    Err(crate::Error::InvalidTarget {
        target: target.to_owned(),
        reason,
    })
}

/// Accepts a numeric id or a POSIX-style account name.
fn validate_account(field: &'static str, value: &str) -> crate::Result<()> {
    let invalid = |reason| crate::Error::InvalidAccount {
        field,
        value: value.to_owned(),
        reason,
    };

    if value.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if value.bytes().all(|b| b.is_ascii_digit()) {
        return value
            .parse::<u32>()
            .map(|_| ())
            .map_err(|_| invalid("numeric id out of range"));
    }
    // tar header name fields hold 31 bytes plus NUL
    if value.len() > 31 {
        return Err(invalid("longer than 31 bytes"));
    }

    let body = value.strip_suffix('$').unwrap_or(value);
    let mut bytes = body.bytes();
    let first_ok = bytes
        .next()
        .is_some_and(|b| b.is_ascii_lowercase() || b == b'_');
    let rest_ok = bytes.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    if first_ok && rest_ok {
        Ok(())
    } else {
        Err(invalid("expected a numeric id or a name matching [a-z_][a-z0-9_-]*"))
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".gitlayer/cache")
}

fn default_context_dir() -> PathBuf {
    PathBuf::from(".gitlayer/context")
}

fn default_lock_timeout_secs() -> u64 {
    60
}

fn default_base_image() -> String {
    "debian:bookworm-slim".to_owned()
}

fn default_tag() -> String {
    "gitlayer:latest".to_owned()
}

fn default_repo() -> PathBuf {
    PathBuf::from(".")
}

fn default_branch() -> String {
    "master".to_owned()
}

fn default_interlayer_period() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_target_rejected() {
        let err = ArtifactConfig::new("dest").validate().unwrap_err();
        assert!(err.to_string().contains("absolute"), "got: {err}");
    }

    #[test]
    fn target_with_shell_characters_rejected() {
        assert!(ArtifactConfig::new("/dest; rm -rf /").validate().is_err());
        assert!(ArtifactConfig::new("/dest/$(id)").validate().is_err());
    }

    #[test]
    fn numeric_and_named_accounts_accepted() {
        for value in ["root", "100500", "some_unknown", "www-data", "_svc", "machine$"] {
            let config = ArtifactConfig {
                owner: Some(value.to_owned()),
                group: Some(value.to_owned()),
                ..ArtifactConfig::new("/dest")
            };
            assert!(config.validate().is_ok(), "{value} should be valid");
        }
    }

    #[test]
    fn malformed_accounts_rejected() {
        for value in ["", "Root", "9user", "a b", "99999999999", "x".repeat(32).as_str()] {
            let config = ArtifactConfig {
                owner: Some(value.to_owned()),
                ..ArtifactConfig::new("/dest")
            };
            assert!(config.validate().is_err(), "{value:?} should be invalid");
        }
    }

    #[test]
    fn repo_name_from_path() {
        let entry: ArtifactEntry = toml::from_str("repo = \"../vendor/lib\"\ntarget = \"/lib\"").unwrap();
        assert_eq!(entry.repo_name(), "lib");
    }

    #[test]
    fn repo_name_falls_back_for_dot() {
        let entry: ArtifactEntry = toml::from_str("target = \"/app\"").unwrap();
        assert_eq!(entry.repo_name(), "repo");
    }
}
