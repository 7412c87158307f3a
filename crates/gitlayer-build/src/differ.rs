//! Differ: what changed in the shipped part of the tree between two commits.

use std::collections::BTreeSet;
use std::io;

use gitlayer_core::{PathFilter, SourceError, SourceRepo};

use crate::packager::{is_metadata, rewrite_tar};

/// Raw, uncompressed change content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Tar of the whole filtered tree
    Tree(Vec<u8>),
    /// Binary-safe patch with paths relative to the filter's `cwd`
    Patch(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    Empty,
    NonEmpty(Payload),
}

pub struct Differ<'a, S: ?Sized> {
    source: &'a S,
    filter: &'a PathFilter,
}

impl<'a, S: SourceRepo + ?Sized> Differ<'a, S> {
    pub fn new(source: &'a S, filter: &'a PathFilter) -> Self {
        Self { source, filter }
    }

    /// Delta from `from` to `to`. Without `from`, a full snapshot of `to`.
    pub fn diff(&self, from: Option<&str>, to: &str) -> Result<Delta, DiffError> {
        let Some(from) = from else {
            return self.snapshot(to).map(Delta::NonEmpty);
        };
        if from == to {
            return Ok(Delta::Empty);
        }

        let patch = self
            .source
            .diff(from, to, self.filter)
            .map_err(|e| DiffError::Source {
                reference: format!("{from}..{to}"),
                source: e,
            })?;
        tracing::debug!(from, to, bytes = patch.len(), "computed patch");

        if patch.is_empty() {
            Ok(Delta::Empty)
        } else {
            Ok(Delta::NonEmpty(Payload::Patch(patch)))
        }
    }

    /// The filtered tree at `reference`.
    pub fn snapshot(&self, reference: &str) -> Result<Payload, DiffError> {
        let tar = self
            .source
            .archive(reference, self.filter)
            .map_err(|e| DiffError::Source {
                reference: reference.to_owned(),
                source: e,
            })?;
        let tree = filter_tree(&tar, self.filter).map_err(|e| DiffError::Archive {
            reference: reference.to_owned(),
            source: e,
        })?;
        tracing::debug!(reference, bytes = tree.len(), "captured snapshot");
        Ok(Payload::Tree(tree))
    }
}

/// Keep entries the filter selects plus the directories leading to them.
fn filter_tree(tar: &[u8], filter: &PathFilter) -> io::Result<Vec<u8>> {
    if filter.paths().is_empty() {
        return rewrite_tar(tar, |_, _| Ok(true));
    }

    let mut parents = BTreeSet::new();
    let mut archive = tar::Archive::new(tar);
    for entry in archive.entries()? {
        let entry = entry?;
        let kind = entry.header().entry_type();
        if kind.is_dir() || is_metadata(kind) {
            continue;
        }
        let path = entry.path()?.to_string_lossy().into_owned();
        if filter.matches(&path) {
            let mut current = path.as_str();
            while let Some((parent, _)) = current.rsplit_once('/') {
                parents.insert(parent.to_owned());
                current = parent;
            }
        }
    }

    rewrite_tar(tar, |path, header| {
        let path = path.trim_end_matches('/');
        Ok(filter.matches(path) || (header.entry_type().is_dir() && parents.contains(path)))
    })
}

#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("failed to read source history at {reference}")]
    Source {
        reference: String,
        source: SourceError,
    },

    #[error("failed to read tree archive of {reference}")]
    Archive { reference: String, source: io::Error },
}
