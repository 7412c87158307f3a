//! Version-control collaborator: the source tree history artifacts are cut from.

use glob::{MatchOptions, Pattern};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Read access to commit history, deltas, and tree snapshots.
///
/// Production code uses the git CLI backend from `gitlayer-build`; tests
/// substitute mocks.
pub trait SourceRepo {
    /// Resolve `branch` to the commit it currently points at.
    fn latest_commit(&self, branch: &str) -> Result<String, SourceError>;

    /// Binary-safe patch from `from` to `to`, restricted to `filter`, with
    /// paths relative to the filter's `cwd`. Empty when nothing relevant changed.
    fn diff(&self, from: &str, to: &str, filter: &PathFilter) -> Result<Vec<u8>, SourceError>;

    /// Uncompressed tar of the tree at `reference`, rooted at the filter's
    /// `cwd`. Implementations may leave the path patterns unapplied; callers
    /// filter entries with [`PathFilter::matches`].
    fn archive(&self, reference: &str, filter: &PathFilter) -> Result<Vec<u8>, SourceError>;
}

impl<T: SourceRepo + ?Sized> SourceRepo for &T {
    fn latest_commit(&self, branch: &str) -> Result<String, SourceError> {
        (**self).latest_commit(branch)
    }

    fn diff(&self, from: &str, to: &str, filter: &PathFilter) -> Result<Vec<u8>, SourceError> {
        (**self).diff(from, to, filter)
    }

    fn archive(&self, reference: &str, filter: &PathFilter) -> Result<Vec<u8>, SourceError> {
        (**self).archive(reference, filter)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to run git: {detail}")]
    Spawn {
        detail: String,
        source: std::io::Error,
    },

    #[error("git command failed: {args:?}\n{stderr}")]
    Failed { args: Vec<String>, stderr: String },

    #[error("unknown revision '{reference}'")]
    UnknownRevision { reference: String },
}

/// Which part of the tree an artifact ships.
///
/// `paths` are glob patterns relative to `cwd`: `*` stays within one path
/// component, `**` spans several. A path is selected when a pattern
/// matches it or one of its ancestor directories. No patterns selects
/// everything under `cwd`.
///
/// # Examples
///
/// ```
/// use gitlayer_core::PathFilter;
///
/// let filter = PathFilter::new(Some("app".into()), vec!["src".into(), "*.toml".into()]);
/// assert!(filter.matches("src/main.rs"));
/// assert!(filter.matches("Cargo.toml"));
/// assert!(!filter.matches("docs/README.md"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathFilter {
    cwd: Option<String>,
    paths: Vec<String>,
}

impl PathFilter {
    pub fn new(cwd: Option<String>, paths: Vec<String>) -> Self {
        let cwd = cwd.map(|c| c.trim_end_matches('/').to_owned());
        Self { cwd, paths }
    }

    pub fn cwd(&self) -> Option<&str> {
        self.cwd.as_deref()
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn validate(&self) -> crate::Result<()> {
        if let Some(cwd) = &self.cwd {
            check_relative(cwd)?;
            if cwd.contains(['*', '?', '[', ']']) {
                return Err(invalid(cwd, "cwd must be a literal directory"));
            }
        }
        for pattern in &self.paths {
            check_relative(pattern)?;
            Pattern::new(pattern).map_err(|e| invalid(pattern, &e.to_string()))?;
        }
        Ok(())
    }

    /// Whether `path` (relative to `cwd`) is selected.
    pub fn matches(&self, path: &str) -> bool {
        let path = path.trim_start_matches("./").trim_end_matches('/');
        if self.paths.is_empty() {
            return true;
        }

        let patterns: Vec<Pattern> = self
            .paths
            .iter()
            .filter_map(|p| Pattern::new(p.trim_end_matches('/')).ok())
            .collect();

        ancestors_and_self(path).any(|candidate| {
            patterns
                .iter()
                .any(|p| p.matches_with(candidate, MATCH_OPTIONS))
        })
    }

    /// Git pathspecs selecting the same files, relative to the repository root.
    ///
    /// A glob pathspec that matches a directory does not cover its contents,
    /// so every pattern is paired with `<pattern>/**` to mirror the ancestor
    /// rule of [`PathFilter::matches`].
    pub fn pathspecs(&self) -> Vec<String> {
        match (&self.cwd, self.paths.is_empty()) {
            (None, true) => Vec::new(),
            (Some(cwd), true) => vec![format!(":(literal){cwd}")],
            (cwd, false) => self
                .paths
                .iter()
                .flat_map(|p| {
                    let p = p.trim_end_matches('/');
                    let p = match cwd {
                        Some(cwd) => format!("{cwd}/{p}"),
                        None => p.to_owned(),
                    };
                    [format!(":(glob){p}"), format!(":(glob){p}/**")]
                })
                .collect(),
        }
    }
}

fn ancestors_and_self(path: &str) -> impl Iterator<Item = &str> {
    let mut ends: Vec<usize> = path.match_indices('/').map(|(i, _)| i).collect();
    ends.push(path.len());
    ends.into_iter().map(move |end| &path[..end])
}

fn check_relative(value: &str) -> crate::Result<()> {
    if value.is_empty() {
        return Err(invalid(value, "must not be empty"));
    }
    if value.starts_with('/') {
        return Err(invalid(value, "must be relative"));
    }
    if value.split('/').any(|c| c == "..") {
        return Err(invalid(value, "must not contain '..'"));
    }
    if value.contains('\0') {
        return Err(invalid(value, "must not contain NUL"));
    }
    Ok(())
}

fn invalid(pattern: &str, reason: &str) -> crate::Error {
    crate::Error::InvalidFilter {
        pattern: pattern.to_owned(),
        reason: reason.to_owned(),
    }
}
