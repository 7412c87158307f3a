//! Artifact identity and the on-disk key derived from it.

use std::fmt;

/// Identifies one tracked artifact: which repository, which optional
/// artifact name within it, and which branch it follows.
///
/// All persisted records are namespaced by [`ArtifactIdentity::key()`], so
/// two identities never share a file.
///
/// # Examples
///
/// ```
/// use gitlayer_core::ArtifactIdentity;
///
/// let id = ArtifactIdentity::new("repo", Some("a"), "master").unwrap();
/// assert_eq!(id.key(), "repo_a.master");
///
/// let id = ArtifactIdentity::new("repo", None, "feature/x").unwrap();
/// assert_eq!(id.key(), "repo.feature%2Fx");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactIdentity {
    repo: String,
    name: Option<String>,
    branch: String,
}

impl ArtifactIdentity {
    pub fn new(repo: &str, name: Option<&str>, branch: &str) -> crate::Result<Self> {
        check_component("repository", repo)?;
        if let Some(name) = name {
            check_component("name", name)?;
        }
        check_component("branch", branch)?;

        Ok(Self {
            repo: repo.to_owned(),
            name: name.map(str::to_owned),
            branch: branch.to_owned(),
        })
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// File name prefix for every record of this artifact:
    /// `<repo>[_<name>].<branch>`.
    ///
    /// Components are percent-encoded so that `_` and `.` only ever appear
    /// as separators (the branch keeps its dots, it is the last component).
    pub fn key(&self) -> String {
        let mut key = encode(&self.repo, false);
        if let Some(name) = &self.name {
            key.push('_');
            key.push_str(&encode(name, false));
        }
        key.push('.');
        key.push_str(&encode(&self.branch, true));
        key
    }
}

impl fmt::Display for ArtifactIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

fn check_component(component: &'static str, value: &str) -> crate::Result<()> {
    let reason = if value.is_empty() {
        "must not be empty"
    } else if value.contains('\0') {
        "must not contain NUL"
    } else {
        return Ok(());
    };
    Err(crate::Error::InvalidIdentity {
        component,
        value: value.to_owned(),
        reason,
    })
}

fn encode(value: &str, keep_dots: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        let keep = byte.is_ascii_alphanumeric() || byte == b'-' || (keep_dots && byte == b'.');
        if keep {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
