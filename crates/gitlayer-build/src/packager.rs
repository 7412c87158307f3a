//! Serializes snapshots and patches into the gzip payloads kept in the cache.

use std::io::{self, Write};

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{EntryType, Header};

use crate::differ::Payload;

/// Who shipped files belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Account {
    Id(u64),
    Name(String),
}

impl Account {
    fn parse(value: &str) -> Self {
        match value.parse() {
            Ok(id) if value.bytes().all(|b| b.is_ascii_digit()) => Account::Id(id),
            _ => Account::Name(value.to_owned()),
        }
    }
}

/// Turns a [`Payload`] into cache bytes, applying ownership to snapshots.
#[derive(Debug, Clone, Default)]
pub struct Packager {
    owner: Option<Account>,
    group: Option<Account>,
}

impl Packager {
    pub fn new(owner: Option<&str>, group: Option<&str>) -> Self {
        Self {
            owner: owner.map(Account::parse),
            group: group.map(Account::parse),
        }
    }

    /// Snapshots become a gzipped tar with every entry re-owned; patches are
    /// gzipped as they are, ownership is applied by the apply command.
    ///
    /// Output depends only on the input, so identical payloads always
    /// produce identical files.
    pub fn package(&self, payload: &Payload) -> Result<Vec<u8>, PackageError> {
        match payload {
            Payload::Tree(tar) => {
                let owned = rewrite_tar(tar, |_, header| {
                    self.apply_ownership(header)?;
                    Ok(true)
                })
                .map_err(|e| PackageError::Archive { source: e })?;
                gzip(&owned)
            }
            Payload::Patch(patch) => gzip(patch),
        }
    }

    fn apply_ownership(&self, header: &mut Header) -> io::Result<()> {
        match &self.owner {
            Some(Account::Id(uid)) => {
                header.set_uid(*uid);
                header.set_username("")?;
            }
            Some(Account::Name(name)) => header.set_username(name)?,
            None => {}
        }
        match &self.group {
            Some(Account::Id(gid)) => {
                header.set_gid(*gid);
                header.set_groupname("")?;
            }
            Some(Account::Name(name)) => header.set_groupname(name)?,
            None => {}
        }
        Ok(())
    }
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>, PackageError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| PackageError::Compress { source: e })?;
    encoder
        .finish()
        .map_err(|e| PackageError::Compress { source: e })
}

/// Copy a tar archive entry by entry.
///
/// `edit` sees each entry's path and a mutable copy of its header and
/// returns whether to keep it. Archive metadata headers are dropped.
pub(crate) fn rewrite_tar<F>(input: &[u8], mut edit: F) -> io::Result<Vec<u8>>
where
    F: FnMut(&str, &mut Header) -> io::Result<bool>,
{
    let mut archive = tar::Archive::new(input);
    let mut builder = tar::Builder::new(Vec::new());

    for entry in archive.entries()? {
        let mut entry = entry?;
        let kind = entry.header().entry_type();
        if is_metadata(kind) {
            continue;
        }
        let path = entry.path()?.to_string_lossy().into_owned();
        let mut header = entry.header().clone();
        if !edit(&path, &mut header)? {
            continue;
        }

        if kind.is_symlink() || kind.is_hard_link() {
            let target = entry
                .link_name()?
                .map(|t| t.into_owned())
                .unwrap_or_default();
            builder.append_link(&mut header, &path, target)?;
        } else {
            builder.append_data(&mut header, &path, &mut entry)?;
        }
    }

    builder.into_inner()
}

pub(crate) fn is_metadata(kind: EntryType) -> bool {
    matches!(kind, EntryType::XGlobalHeader | EntryType::XHeader)
}

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("failed to write snapshot archive")]
    Archive { source: io::Error },

    #[error("failed to compress payload")]
    Compress { source: io::Error },
}
